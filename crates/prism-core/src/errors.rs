use thiserror::Error;

/// Malformed assertion parameters, detected at snapshot creation. Fails the
/// whole snapshot; no partial snapshot tree is persisted.
#[derive(Debug, Error)]
#[error("invalid {kind} assertion: {reason}")]
pub struct ValidationError {
    pub kind: &'static str,
    pub reason: String,
}

/// Transient agent failure. Retried up to max_retries, then becomes a
/// terminal trial failure with no AssertionResults.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("agent invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("agent connection failed: {0}")]
    Connection(String),
    #[error("agent process exited with status {0}")]
    NonZeroExit(i32),
    #[error("agent invocation was terminated")]
    Terminated,
}

/// External judge unavailable. Treated like an invocation failure: the whole
/// trial is retried, not just the one assertion.
#[derive(Debug, Error)]
#[error("judge call failed: {0}")]
pub struct JudgeError(pub String);

/// Infrastructure errors an evaluator may surface. Assertion failures are
/// not errors; they come back as `AssertionResult { passed: false }`.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Judge(#[from] JudgeError),
}
