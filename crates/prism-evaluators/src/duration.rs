use async_trait::async_trait;
use prism_core::errors::EvalError;
use prism_core::evaluate::Evaluator;
use prism_core::model::{AssertionResult, AssertionSnapshot, AssertionSpec, TrialOutput};

/// Judges the wall-clock time the trial executor measured around the agent
/// invocation, not evaluator-side timing.
pub struct DurationMaxMsEvaluator;

#[async_trait]
impl Evaluator for DurationMaxMsEvaluator {
    fn kind(&self) -> &'static str {
        "duration_max_ms"
    }

    async fn evaluate(
        &self,
        assertion: &AssertionSnapshot,
        output: &TrialOutput,
    ) -> Result<AssertionResult, EvalError> {
        let AssertionSpec::DurationMaxMs { max_ms } = &assertion.spec else {
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

        let passed = output.elapsed_ms <= *max_ms;
        Ok(AssertionResult {
            assertion_id: assertion.id,
            passed,
            score: if passed { 1.0 } else { 0.0 },
            message: format!("elapsed {}ms (limit {}ms)", output.elapsed_ms, max_ms),
        })
    }
}
