pub mod fake;

use crate::errors::{InvocationError, JudgeError};
use crate::model::{AgentDescriptor, ExampleSnapshot, Run, SuggestedAssertion};
use async_trait::async_trait;
use std::time::Duration;

/// Opaque identifier for one in-flight invocation attempt. Minted by the
/// trial executor at attempt start; the invoker registers whatever process
/// or request it spawns under this token so cancel can reach it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecHandle(String);

impl ExecHandle {
    pub fn new(trial_id: i64, attempt: u32) -> Self {
        Self(format!("trial-{}-attempt-{}", trial_id, attempt))
    }

    pub fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    /// Invoker-reported elapsed time, informational only. The executor's own
    /// wall-clock measurement is what gets persisted and scored.
    pub elapsed_ms: u64,
}

/// The agent under test. Must be safe to call concurrently for independent
/// trials.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: &AgentDescriptor,
        question: &str,
        handle: &ExecHandle,
        timeout: Duration,
    ) -> Result<AgentReply, InvocationError>;

    /// Request termination of an in-flight invocation: graceful first, the
    /// invoker may force-kill once `grace` elapses. Default is a no-op for
    /// invokers with nothing to kill.
    async fn terminate(&self, _handle: &ExecHandle, _grace: Duration) {}
}

#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    pub score: f64,
    pub rationale: String,
}

/// External judge, used only by the `ai_judge` assertion variant.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(&self, rubric: &str, output: &str) -> Result<JudgeVerdict, JudgeError>;
}

/// Post-completion assertion proposer. Invoked fire-and-forget with the
/// examples that ended the run without a single passing assertion; failures
/// never affect the run's terminal status.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn suggest(
        &self,
        run: &Run,
        uncovered: &[ExampleSnapshot],
    ) -> anyhow::Result<Vec<SuggestedAssertion>>;
}
