use std::sync::Arc;

use prism_core::evaluate::{Evaluator, EvaluatorSet};
use prism_core::providers::JudgeClient;

mod ai_judge;
mod duration;
mod looker_query;
mod text_contains;

pub use ai_judge::AiJudgeEvaluator;
pub use duration::DurationMaxMsEvaluator;
pub use looker_query::LookerQueryMatchEvaluator;
pub use text_contains::TextContainsEvaluator;

pub fn default_evaluators(judge: Arc<dyn JudgeClient>) -> Vec<Arc<dyn Evaluator>> {
    vec![
        Arc::new(TextContainsEvaluator),
        Arc::new(LookerQueryMatchEvaluator),
        Arc::new(AiJudgeEvaluator::new(judge)),
        Arc::new(DurationMaxMsEvaluator),
    ]
}

pub fn default_evaluator_set(judge: Arc<dyn JudgeClient>) -> EvaluatorSet {
    EvaluatorSet::new(default_evaluators(judge))
}
