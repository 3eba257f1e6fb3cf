use crate::errors::EvalError;
use crate::model::{AssertionResult, AssertionSnapshot, ExampleSnapshot, TrialOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One assertion variant's scorer. Pure given its two inputs, except the
/// `ai_judge` variant which is the sole one permitted an external call.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Variant type tag this evaluator handles, e.g. "text_contains".
    fn kind(&self) -> &'static str;

    async fn evaluate(
        &self,
        assertion: &AssertionSnapshot,
        output: &TrialOutput,
    ) -> Result<AssertionResult, EvalError>;
}

/// Kind-dispatched registry of evaluators.
#[derive(Clone, Default)]
pub struct EvaluatorSet {
    by_kind: HashMap<&'static str, Arc<dyn Evaluator>>,
}

impl EvaluatorSet {
    pub fn new(evaluators: Vec<Arc<dyn Evaluator>>) -> Self {
        let mut by_kind = HashMap::new();
        for ev in evaluators {
            by_kind.insert(ev.kind(), ev);
        }
        Self { by_kind }
    }

    /// Scores every assertion on the example against the trial's output.
    /// Assertion failures come back as `passed=false` results; only judge
    /// outages surface as an error, which the executor retries at trial
    /// level.
    pub async fn evaluate_example(
        &self,
        example: &ExampleSnapshot,
        output: &TrialOutput,
    ) -> Result<Vec<AssertionResult>, EvalError> {
        let mut out = Vec::with_capacity(example.assertions.len());
        for assertion in &example.assertions {
            let kind = assertion.spec.kind();
            match self.by_kind.get(kind) {
                Some(ev) => out.push(ev.evaluate(assertion, output).await?),
                None => out.push(AssertionResult {
                    assertion_id: assertion.id,
                    passed: false,
                    score: 0.0,
                    message: format!("no evaluator registered for '{}'", kind),
                }),
            }
        }
        Ok(out)
    }
}
