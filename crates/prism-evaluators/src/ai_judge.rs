use std::sync::Arc;

use async_trait::async_trait;
use prism_core::errors::EvalError;
use prism_core::evaluate::Evaluator;
use prism_core::model::{AssertionResult, AssertionSnapshot, AssertionSpec, TrialOutput};
use prism_core::providers::JudgeClient;

/// Float tolerance so a verdict of exactly `threshold` passes even when the
/// score went through serialization.
const EPSILON: f64 = 1e-9;

pub struct AiJudgeEvaluator {
    judge: Arc<dyn JudgeClient>,
}

impl AiJudgeEvaluator {
    pub fn new(judge: Arc<dyn JudgeClient>) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Evaluator for AiJudgeEvaluator {
    fn kind(&self) -> &'static str {
        "ai_judge"
    }

    async fn evaluate(
        &self,
        assertion: &AssertionSnapshot,
        output: &TrialOutput,
    ) -> Result<AssertionResult, EvalError> {
        let AssertionSpec::AiJudge { rubric, threshold } = &assertion.spec else {
            return Ok(AssertionResult {
                assertion_id: assertion.id,
                passed: false,
                score: 0.0,
                message: format!(
                    "evaluator dispatched with mismatched spec kind '{}'",
                    assertion.spec.kind()
                ),
            });
        };

        // Judge failures are transient infrastructure errors. Propagating
        // here hands the trial back to the executor for a retry instead of
        // recording a verdict we never obtained.
        let verdict = self.judge.judge(rubric, &output.text).await?;
        let score = verdict.score.clamp(0.0, 1.0);
        let passed = score + EPSILON >= *threshold;

        Ok(AssertionResult {
            assertion_id: assertion.id,
            passed,
            score,
            message: verdict.rationale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::providers::fake::FakeJudge;

    fn snap(threshold: f64) -> AssertionSnapshot {
        AssertionSnapshot {
            id: 3,
            weight: 1.0,
            spec: AssertionSpec::AiJudge {
                rubric: "is the answer grounded in the data?".into(),
                threshold,
            },
        }
    }

    fn out() -> TrialOutput {
        TrialOutput {
            text: "revenue grew 4% quarter over quarter".into(),
            elapsed_ms: 20,
        }
    }

    #[tokio::test]
    async fn score_at_threshold_passes() {
        let ev = AiJudgeEvaluator::new(Arc::new(FakeJudge::scoring(0.7)));
        let r = ev.evaluate(&snap(0.7), &out()).await.unwrap();
        assert!(r.passed);
        assert!((r.score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn score_below_threshold_fails() {
        let ev = AiJudgeEvaluator::new(Arc::new(FakeJudge::scoring(0.69)));
        let r = ev.evaluate(&snap(0.7), &out()).await.unwrap();
        assert!(!r.passed);
    }

    #[tokio::test]
    async fn judge_outage_propagates_as_error() {
        let ev = AiJudgeEvaluator::new(Arc::new(FakeJudge::failing_first(1, 0.9)));
        assert!(ev.evaluate(&snap(0.7), &out()).await.is_err());
        // second call recovers
        assert!(ev.evaluate(&snap(0.7), &out()).await.unwrap().passed);
    }
}
