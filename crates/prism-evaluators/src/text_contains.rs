use async_trait::async_trait;
use prism_core::errors::EvalError;
use prism_core::evaluate::Evaluator;
use prism_core::model::{AssertionResult, AssertionSnapshot, AssertionSpec, TrialOutput};

pub struct TextContainsEvaluator;

#[async_trait]
impl Evaluator for TextContainsEvaluator {
    fn kind(&self) -> &'static str {
        "text_contains"
    }

    async fn evaluate(
        &self,
        assertion: &AssertionSnapshot,
        output: &TrialOutput,
    ) -> Result<AssertionResult, EvalError> {
        let AssertionSpec::TextContains {
            text,
            case_insensitive,
            regex,
        } = &assertion.spec
        else {
            return Ok(wrong_kind(assertion));
        };

        let matched = if *regex {
            match regex::RegexBuilder::new(text)
                .case_insensitive(*case_insensitive)
                .build()
            {
                Ok(re) => re.is_match(&output.text),
                // snapshot validation rejects these; belt for pre-existing rows
                Err(e) => {
                    return Ok(AssertionResult {
                        assertion_id: assertion.id,
                        passed: false,
                        score: 0.0,
                        message: format!("invalid pattern: {}", e),
                    })
                }
            }
        } else if *case_insensitive {
            output.text.to_lowercase().contains(&text.to_lowercase())
        } else {
            output.text.contains(text.as_str())
        };

        Ok(AssertionResult {
            assertion_id: assertion.id,
            passed: matched,
            score: if matched { 1.0 } else { 0.0 },
            message: if matched {
                "match found".into()
            } else {
                format!("missing expected text: {}", text)
            },
        })
    }
}

fn wrong_kind(assertion: &AssertionSnapshot) -> AssertionResult {
    AssertionResult {
        assertion_id: assertion.id,
        passed: false,
        score: 0.0,
        message: format!(
            "evaluator dispatched with mismatched spec kind '{}'",
            assertion.spec.kind()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(text: &str, case_insensitive: bool, regex: bool) -> AssertionSnapshot {
        AssertionSnapshot {
            id: 1,
            weight: 1.0,
            spec: AssertionSpec::TextContains {
                text: text.into(),
                case_insensitive,
                regex,
            },
        }
    }

    fn out(text: &str) -> TrialOutput {
        TrialOutput {
            text: text.into(),
            elapsed_ms: 5,
        }
    }

    #[tokio::test]
    async fn substring_match_is_case_sensitive_by_default() {
        let ev = TextContainsEvaluator;
        let r = ev.evaluate(&snap("Hello", false, false), &out("Hello world")).await.unwrap();
        assert!(r.passed);
        let r = ev.evaluate(&snap("hello", false, false), &out("Hello world")).await.unwrap();
        assert!(!r.passed);
        let r = ev.evaluate(&snap("hello", true, false), &out("Hello world")).await.unwrap();
        assert!(r.passed);
    }

    #[tokio::test]
    async fn pattern_mode_matches_regex() {
        let ev = TextContainsEvaluator;
        let r = ev
            .evaluate(&snap(r"orders?\s+table", false, true), &out("the order table"))
            .await
            .unwrap();
        assert!(r.passed);
        assert!((r.score - 1.0).abs() < 1e-9);
    }
}
