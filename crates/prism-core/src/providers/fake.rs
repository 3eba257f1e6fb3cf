//! Scripted in-memory providers for tests and local dry runs.

use super::{AgentInvoker, AgentReply, ExecHandle, JudgeClient, JudgeVerdict, SuggestionGenerator};
use crate::errors::{InvocationError, JudgeError};
use crate::model::{
    AgentDescriptor, AssertionSpec, ExampleSnapshot, Run, SuggestedAssertion,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type InvokeHook = Box<dyn Fn(u32) + Send + Sync>;

pub enum FakeBehavior {
    Reply { text: String, elapsed_ms: u64 },
    /// Fail the first `failures` invocations with a transient error, then
    /// reply with `then_text`.
    FailTimes { failures: u32, then_text: String },
    AlwaysFail,
}

#[derive(Default)]
pub struct FakeAgent {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    calls: Mutex<HashMap<String, u32>>,
    total_calls: AtomicU32,
    terminated: Mutex<Vec<String>>,
    hook: Mutex<Option<InvokeHook>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, question: &str, behavior: FakeBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(question.to_string(), behavior);
    }

    /// Called with the cumulative invocation count after each invocation
    /// completes. Lets tests pause or cancel a run at a precise point.
    pub fn set_hook(&self, f: impl Fn(u32) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(f));
    }

    pub fn call_count(&self, question: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(question)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_call_count(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn terminated_handles(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentInvoker for FakeAgent {
    async fn invoke(
        &self,
        _agent: &AgentDescriptor,
        question: &str,
        _handle: &ExecHandle,
        _timeout: Duration,
    ) -> Result<AgentReply, InvocationError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(question.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let total = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let result = match self.behaviors.lock().unwrap().get(question) {
            None => Ok(AgentReply {
                text: format!("echo: {}", question),
                elapsed_ms: 1,
            }),
            Some(FakeBehavior::Reply { text, elapsed_ms }) => Ok(AgentReply {
                text: text.clone(),
                elapsed_ms: *elapsed_ms,
            }),
            Some(FakeBehavior::FailTimes {
                failures,
                then_text,
            }) => {
                if n <= *failures {
                    Err(InvocationError::Connection(
                        "scripted transient failure".into(),
                    ))
                } else {
                    Ok(AgentReply {
                        text: then_text.clone(),
                        elapsed_ms: 1,
                    })
                }
            }
            Some(FakeBehavior::AlwaysFail) => Err(InvocationError::Connection(
                "scripted transient failure".into(),
            )),
        };

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(total);
        }
        result
    }

    async fn terminate(&self, handle: &ExecHandle, _grace: Duration) {
        self.terminated
            .lock()
            .unwrap()
            .push(handle.as_str().to_string());
    }
}

pub struct FakeJudge {
    score: f64,
    fail_first: AtomicU32,
    calls: AtomicU32,
}

impl FakeJudge {
    pub fn passing() -> Self {
        Self::scoring(1.0)
    }

    pub fn scoring(score: f64) -> Self {
        Self {
            score,
            fail_first: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` judge calls with a JudgeError, then score normally.
    pub fn failing_first(n: u32, score: f64) -> Self {
        Self {
            score,
            fail_first: AtomicU32::new(n),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeClient for FakeJudge {
    async fn judge(&self, _rubric: &str, _output: &str) -> Result<JudgeVerdict, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(JudgeError("scripted judge outage".into()));
        }
        Ok(JudgeVerdict {
            score: self.score,
            rationale: "scripted rationale".into(),
        })
    }
}

/// Records what it was asked and proposes one text_contains assertion per
/// uncovered example.
#[derive(Default)]
pub struct FakeSuggestions {
    asked: Mutex<Vec<(i64, Vec<String>)>>,
}

impl FakeSuggestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> Vec<(i64, Vec<String>)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl SuggestionGenerator for FakeSuggestions {
    async fn suggest(
        &self,
        run: &Run,
        uncovered: &[ExampleSnapshot],
    ) -> anyhow::Result<Vec<SuggestedAssertion>> {
        self.asked.lock().unwrap().push((
            run.id,
            uncovered.iter().map(|e| e.logical_id.clone()).collect(),
        ));
        Ok(uncovered
            .iter()
            .map(|e| SuggestedAssertion {
                example_logical_id: e.logical_id.clone(),
                spec: AssertionSpec::TextContains {
                    text: e.question.clone(),
                    case_insensitive: true,
                    regex: false,
                },
                rationale: "no passing assertion covered this example".into(),
            })
            .collect())
    }
}
