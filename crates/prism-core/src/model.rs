use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Shared record fields embedded by composition in every persisted live
/// entity. Repositories populate and read these explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub archived: bool,
}

impl RecordMeta {
    pub fn now() -> Self {
        let ts = chrono::Utc::now().to_rfc3339();
        Self {
            created_at: ts.clone(),
            updated_at: ts,
            archived: false,
        }
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::now()
    }
}

// --- Live suite tree (mutable, edited independently of runs) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub meta: RecordMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    #[serde(default)]
    pub id: i64,
    /// Stable identifier across edits; the join key for longitudinal
    /// comparison even if the question text changes.
    pub logical_id: String,
    pub question: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default)]
    pub meta: RecordMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(default)]
    pub id: i64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub spec: AssertionSpec,
    #[serde(default)]
    pub meta: RecordMeta,
}

fn default_weight() -> f64 {
    1.0
}

/// Closed set of assertion variants. Extensible by adding a variant, never by
/// reshaping existing ones: external callers persist the literal type tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssertionSpec {
    TextContains {
        text: String,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        regex: bool,
    },
    LookerQueryMatch {
        model: String,
        explore: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        filters: Vec<QueryFilter>,
        #[serde(default)]
        sorts: Vec<String>,
        #[serde(default)]
        limit: Option<u64>,
    },
    AiJudge {
        rubric: String,
        #[serde(default = "default_judge_threshold")]
        threshold: f64,
    },
    DurationMaxMs {
        max_ms: u64,
    },
}

fn default_judge_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryFilter {
    pub field: String,
    pub value: String,
}

impl AssertionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            AssertionSpec::TextContains { .. } => "text_contains",
            AssertionSpec::LookerQueryMatch { .. } => "looker_query_match",
            AssertionSpec::AiJudge { .. } => "ai_judge",
            AssertionSpec::DurationMaxMs { .. } => "duration_max_ms",
        }
    }

    /// Structural validation of the parameter payload. Runs at snapshot
    /// creation so malformed suites are rejected before any trial executes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fail = |reason: String| {
            Err(ValidationError {
                kind: self.kind(),
                reason,
            })
        };
        match self {
            AssertionSpec::TextContains { text, regex, .. } => {
                if text.is_empty() {
                    return fail("empty match text".into());
                }
                if *regex {
                    if let Err(e) = regex::Regex::new(text) {
                        return fail(format!("invalid pattern: {}", e));
                    }
                }
            }
            AssertionSpec::LookerQueryMatch {
                model,
                explore,
                fields,
                ..
            } => {
                if model.is_empty() || explore.is_empty() {
                    return fail("model and explore are required".into());
                }
                if fields.is_empty() {
                    return fail("at least one field is required".into());
                }
            }
            AssertionSpec::AiJudge { rubric, threshold } => {
                if rubric.trim().is_empty() {
                    return fail("empty rubric".into());
                }
                if !(0.0..=1.0).contains(threshold) {
                    return fail(format!("threshold {} outside [0, 1]", threshold));
                }
            }
            AssertionSpec::DurationMaxMs { max_ms } => {
                if *max_ms == 0 {
                    return fail("max_ms must be positive".into());
                }
            }
        }
        Ok(())
    }
}

// --- Snapshot tree (immutable, write-once) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteSnapshot {
    pub id: i64,
    pub suite_id: i64,
    pub name: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
    pub created_at: String,
    pub examples: Vec<ExampleSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleSnapshot {
    pub id: i64,
    pub logical_id: String,
    pub question: String,
    pub assertions: Vec<AssertionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionSnapshot {
    pub id: i64,
    pub weight: f64,
    pub spec: AssertionSpec,
}

// --- Run / Trial ---

/// Append-only status set. External callers persist and compare against the
/// literal strings, so existing values are never renamed or removed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Executing,
    Evaluating,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Executing => "executing",
            RunStatus::Evaluating => "evaluating",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "executing" => Some(RunStatus::Executing),
            "evaluating" => Some(RunStatus::Evaluating),
            "paused" => Some(RunStatus::Paused),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Pending,
    Running,
    Retry,
    Succeeded,
    Failed,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Pending => "pending",
            TrialStatus::Running => "running",
            TrialStatus::Retry => "retry",
            TrialStatus::Succeeded => "succeeded",
            TrialStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TrialStatus::Pending),
            "running" => Some(TrialStatus::Running),
            "retry" => Some(TrialStatus::Retry),
            "succeeded" => Some(TrialStatus::Succeeded),
            "failed" => Some(TrialStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialStatus::Succeeded | TrialStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub snapshot_id: i64,
    pub agent_id: String,
    pub status: RunStatus,
    pub generate_suggestions: bool,
    pub started_at: String,
    pub completed_at: Option<String>,
    /// Always recomputed from the trials' AssertionResults at aggregation,
    /// never updated independently of them.
    pub aggregate_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub id: i64,
    pub run_id: i64,
    pub example_snapshot_id: i64,
    pub status: TrialStatus,
    pub retry_count: u32,
    /// Non-null only while status is `Running`. Owned by the executor for
    /// the duration of one attempt; read elsewhere only to request
    /// termination.
    pub exec_handle: Option<String>,
    pub output: Option<TrialOutput>,
    pub diagnostic: Option<String>,
    pub results: Vec<AssertionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOutput {
    pub text: String,
    /// Wall-clock time around the agent invocation, measured by the trial
    /// executor. This is the figure `duration_max_ms` judges.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion_id: i64,
    pub passed: bool,
    pub score: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAssertion {
    pub example_logical_id: String,
    pub spec: AssertionSpec,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub endpoint: String,
}

// --- Run options ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausePolicy {
    /// In-flight attempts finish their current attempt; only new dispatch
    /// stops. The safer default.
    WaitForInFlight,
    /// Pause also force-terminates in-flight attempts, like cancel.
    KillInFlight,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before the attempt that follows retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffPolicy::Exponential { base_ms } => {
                let shift = retry.saturating_sub(1).min(16);
                Duration::from_millis(base_ms.saturating_mul(1u64 << shift))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    pub parallel: usize,
    pub max_retries: u32,
    pub attempt_timeout_ms: u64,
    pub backoff: BackoffPolicy,
    /// Run is FAILED when failed_trials / total_trials exceeds this.
    pub failure_threshold: f64,
    pub pause_policy: PausePolicy,
    pub generate_suggestions: bool,
    /// Grace period between graceful terminate and forced kill on cancel.
    pub terminate_grace_ms: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: 4,
            max_retries: 3,
            attempt_timeout_ms: 60_000,
            backoff: BackoffPolicy::Exponential { base_ms: 250 },
            failure_threshold: 0.5,
            pause_policy: PausePolicy::WaitForInFlight,
            generate_suggestions: false,
            terminate_grace_ms: 5_000,
        }
    }
}
