use crate::engine::RunGate;
use crate::errors::InvocationError;
use crate::evaluate::EvaluatorSet;
use crate::model::{AgentDescriptor, BackoffPolicy, ExampleSnapshot, RunOptions, Trial, TrialOutput};
use crate::providers::{AgentInvoker, ExecHandle};
use crate::storage::Store;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl From<&RunOptions> for RetryPolicy {
    fn from(opts: &RunOptions) -> Self {
        Self {
            max_retries: opts.max_retries,
            attempt_timeout: Duration::from_millis(opts.attempt_timeout_ms),
            backoff: opts.backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Succeeded,
    Failed,
    /// Pause or cancel stopped the trial before it reached a terminal
    /// state; it stays dispatchable for a later resume.
    Suspended,
}

/// Supervises one trial: sequential attempts against the agent, a fresh
/// timeout per attempt, retry with backoff on transient failures, and
/// assertion evaluation on success.
pub struct TrialExecutor {
    store: Store,
    invoker: Arc<dyn AgentInvoker>,
    evaluators: EvaluatorSet,
    policy: RetryPolicy,
}

impl TrialExecutor {
    pub fn new(
        store: Store,
        invoker: Arc<dyn AgentInvoker>,
        evaluators: EvaluatorSet,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            invoker,
            evaluators,
            policy,
        }
    }

    pub async fn execute(
        &self,
        trial: &Trial,
        agent: &AgentDescriptor,
        example: &ExampleSnapshot,
        gate: &RunGate,
    ) -> anyhow::Result<TrialOutcome> {
        let mut retry_count = trial.retry_count;

        loop {
            if gate.should_stop() {
                self.store.mark_trial_suspended(trial.id)?;
                return Ok(TrialOutcome::Suspended);
            }

            let attempt = retry_count + 1;
            let handle = ExecHandle::new(trial.id, attempt);
            self.store.mark_trial_running(trial.id, handle.as_str())?;

            let diagnostic = match self.attempt(trial, agent, example, &handle).await? {
                None => return Ok(TrialOutcome::Succeeded),
                Some(diag) => diag,
            };

            if gate.should_stop() {
                // attempt aborted by pause/cancel; don't burn retry budget
                self.store.mark_trial_suspended(trial.id)?;
                return Ok(TrialOutcome::Suspended);
            }

            if retry_count >= self.policy.max_retries {
                self.store.mark_trial_failed(trial.id, &diagnostic)?;
                tracing::warn!(
                    event = "prism.trial.failed",
                    trial_id = trial.id,
                    retries = retry_count,
                    error = %diagnostic,
                    "trial exhausted retries"
                );
                return Ok(TrialOutcome::Failed);
            }

            retry_count += 1;
            self.store
                .mark_trial_retry(trial.id, retry_count, &diagnostic)?;
            tracing::warn!(
                event = "prism.trial.retry",
                trial_id = trial.id,
                retry = retry_count,
                error = %diagnostic,
            );
            sleep(self.policy.backoff.delay(retry_count)).await;
        }
    }

    /// One attempt. Returns Ok(None) on success (trial persisted as
    /// succeeded), Ok(Some(diagnostic)) on a transient failure. Wall-clock
    /// time is measured around the agent invocation only; evaluation time
    /// never counts against duration assertions.
    async fn attempt(
        &self,
        trial: &Trial,
        agent: &AgentDescriptor,
        example: &ExampleSnapshot,
        handle: &ExecHandle,
    ) -> anyhow::Result<Option<String>> {
        let start = Instant::now();
        let invocation = self
            .invoker
            .invoke(agent, &example.question, handle, self.policy.attempt_timeout);

        let reply = match timeout(self.policy.attempt_timeout, invocation).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Ok(Some(e.to_string())),
            Err(_) => {
                return Ok(Some(
                    InvocationError::Timeout {
                        timeout_ms: self.policy.attempt_timeout.as_millis() as u64,
                    }
                    .to_string(),
                ))
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let output = TrialOutput {
            text: reply.text,
            elapsed_ms,
        };

        // Judge outages come back as Err here and retry the whole trial;
        // failed assertions are plain results and still count as success.
        match self.evaluators.evaluate_example(example, &output).await {
            Ok(results) => {
                self.store.mark_trial_succeeded(trial.id, &output, &results)?;
                Ok(None)
            }
            Err(e) => Ok(Some(e.to_string())),
        }
    }
}
