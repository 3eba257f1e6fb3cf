use crate::engine::executor::{RetryPolicy, TrialExecutor, TrialOutcome};
use crate::engine::RunGate;
use crate::evaluate::EvaluatorSet;
use crate::model::{
    AgentDescriptor, ExampleSnapshot, PausePolicy, Run, RunOptions, RunStatus, TestSuiteSnapshot,
    Trial, TrialStatus,
};
use crate::providers::{AgentInvoker, ExecHandle, SuggestionGenerator};
use crate::storage::Store;
use anyhow::Context;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Owns the run state machine: creates trials from a snapshot, feeds them to
/// a bounded worker pool, collects outcomes at a join barrier, aggregates
/// the run score, and handles pause/resume/cancel.
///
/// All collaborators arrive by constructor injection; nothing is looked up
/// from ambient state. Run/trial status mutations are serialized through the
/// store's single connection, one transaction per transition.
pub struct RunScheduler {
    store: Store,
    invoker: Arc<dyn AgentInvoker>,
    evaluators: EvaluatorSet,
    suggestions: Option<Arc<dyn SuggestionGenerator>>,
    options: RunOptions,
    gates: Mutex<HashMap<i64, Arc<RunGate>>>,
}

impl RunScheduler {
    pub fn new(
        store: Store,
        invoker: Arc<dyn AgentInvoker>,
        evaluators: EvaluatorSet,
        suggestions: Option<Arc<dyn SuggestionGenerator>>,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            invoker,
            evaluators,
            suggestions,
            options,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Control handle for a run, created on first use. Exposed so callers
    /// (and tests) can coordinate pause/cancel with precision.
    pub fn gate(&self, run_id: i64) -> Arc<RunGate> {
        self.gates
            .lock()
            .unwrap()
            .entry(run_id)
            .or_default()
            .clone()
    }

    /// Builds the run with one pending trial per snapshotted example.
    pub fn create_run(
        &self,
        snapshot: &TestSuiteSnapshot,
        agent: &AgentDescriptor,
    ) -> anyhow::Result<Run> {
        let run = self
            .store
            .create_run(snapshot, &agent.id, self.options.generate_suggestions)?;
        tracing::info!(
            event = "prism.run.created",
            run_id = run.id,
            snapshot_id = snapshot.id,
            trials = snapshot.examples.len(),
        );
        Ok(run)
    }

    /// Executes every dispatchable trial through the worker pool, then
    /// advances the run past the join barrier: EVALUATING, aggregation, and
    /// a terminal COMPLETED/FAILED. Returns early with PAUSED or FAILED if
    /// the gate was tripped.
    pub async fn dispatch(&self, run_id: i64, agent: &AgentDescriptor) -> anyhow::Result<Run> {
        let run = self.store.load_run(run_id)?;
        if run.status.is_terminal() {
            self.release_gate(run_id);
            return Ok(run);
        }

        let snapshot = self.store.load_snapshot(run.snapshot_id)?;
        let gate = self.gate(run_id);
        let pending = self.store.dispatchable_trials(run_id)?;

        let examples: HashMap<i64, ExampleSnapshot> = snapshot
            .examples
            .iter()
            .map(|e| (e.id, e.clone()))
            .collect();

        // Resolve every trial's example up front. A broken mapping must
        // abort here, before any status transition or spawned worker.
        let mut work = Vec::with_capacity(pending.len());
        for trial in pending {
            let example = examples
                .get(&trial.example_snapshot_id)
                .cloned()
                .with_context(|| {
                    format!(
                        "trial {} references unknown example snapshot {}",
                        trial.id, trial.example_snapshot_id
                    )
                })?;
            work.push((trial, example));
        }

        if !work.is_empty() {
            self.transition(run_id, RunStatus::Executing)?;
        }

        let executor = Arc::new(TrialExecutor::new(
            self.store.clone(),
            self.invoker.clone(),
            self.evaluators.clone(),
            RetryPolicy::from(&self.options),
        ));

        let sem = Arc::new(Semaphore::new(self.options.parallel.max(1)));
        let mut handles = Vec::new();

        for (trial, example) in work {
            let permit = sem.clone().acquire_owned().await?;
            let executor = executor.clone();
            let gate = gate.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if gate.should_stop() {
                    return Ok(TrialOutcome::Suspended);
                }
                executor.execute(&trial, &agent, &example, &gate).await
            }));
        }

        let mut suspended = false;
        let mut first_err: Option<anyhow::Error> = None;
        for h in handles {
            match h.await {
                Ok(Ok(TrialOutcome::Suspended)) => suspended = true,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(anyhow::Error::from(e));
                }
            }
        }
        if let Some(e) = first_err {
            // Leave the run where it is: every trial row is in a
            // well-defined state, so a later dispatch can resume.
            return Err(e.context("trial worker failed"));
        }

        if gate.is_cancelled() {
            self.store.complete_run(run_id, RunStatus::Failed, None)?;
            tracing::info!(event = "prism.run.transition", run_id, status = "failed", reason = "cancelled");
            self.release_gate(run_id);
            return self.store.load_run(run_id);
        }
        if suspended || gate.is_paused() {
            self.transition(run_id, RunStatus::Paused)?;
            return self.store.load_run(run_id);
        }

        // Join barrier passed: every trial is terminal. Aggregate.
        self.transition(run_id, RunStatus::Evaluating)?;
        let trials = self.store.trials_for_run(run_id)?;
        let aggregate = aggregate_score(&snapshot, &trials);

        let failed = trials
            .iter()
            .filter(|t| t.status == TrialStatus::Failed)
            .count();
        let failed_fraction = failed as f64 / trials.len().max(1) as f64;
        let status = if failed_fraction > self.options.failure_threshold {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        self.store.complete_run(run_id, status, aggregate)?;
        tracing::info!(
            event = "prism.run.transition",
            run_id,
            status = status.as_str(),
            aggregate = aggregate.unwrap_or(0.0),
            failed_trials = failed,
        );
        self.release_gate(run_id);

        let run = self.store.load_run(run_id)?;
        if run.status == RunStatus::Completed && run.generate_suggestions {
            self.spawn_suggestions(&run, &snapshot, &trials);
        }
        Ok(run)
    }

    /// Stops dispatching new trials. Under the default policy in-flight
    /// attempts finish on their own; `KillInFlight` additionally terminates
    /// them the way cancel does. Under `KillInFlight` the termination
    /// requests are spawned onto the current Tokio runtime, so the call must
    /// come from within one.
    pub fn pause(&self, run_id: i64) {
        self.gate(run_id).pause();
        tracing::info!(event = "prism.run.pause_requested", run_id);
        if self.options.pause_policy == PausePolicy::KillInFlight {
            self.spawn_terminations(run_id);
        }
    }

    /// Clears the pause flag and re-enters dispatch. Idempotent: succeeded
    /// trials are never dispatched again.
    pub async fn resume(&self, run_id: i64, agent: &AgentDescriptor) -> anyhow::Result<Run> {
        self.gate(run_id).resume();
        tracing::info!(event = "prism.run.resume_requested", run_id);
        self.dispatch(run_id, agent).await
    }

    /// Stops dispatch and force-terminates in-flight attempts via their
    /// recorded execution handles. The run lands in FAILED.
    pub async fn cancel(&self, run_id: i64) -> anyhow::Result<Run> {
        let gate = self.gate(run_id);
        gate.cancel();
        let grace = Duration::from_millis(self.options.terminate_grace_ms);
        for (trial_id, raw) in self.store.active_handles(run_id)? {
            tracing::info!(event = "prism.trial.terminate", run_id, trial_id, handle = %raw);
            self.invoker
                .terminate(&ExecHandle::from_raw(raw), grace)
                .await;
        }
        // A live dispatch finalizes at its barrier; when nothing is in
        // flight this settles the run directly. No-op if already terminal.
        self.store.complete_run(run_id, RunStatus::Failed, None)?;
        self.release_gate(run_id);
        self.store.load_run(run_id)
    }

    /// Drops the control handle of a finished run. Workers holding clones of
    /// the gate keep seeing its flags; only the map entry goes away.
    fn release_gate(&self, run_id: i64) {
        self.gates.lock().unwrap().remove(&run_id);
    }

    fn transition(&self, run_id: i64, status: RunStatus) -> anyhow::Result<()> {
        self.store.update_run_status(run_id, status)?;
        tracing::info!(event = "prism.run.transition", run_id, status = status.as_str());
        Ok(())
    }

    fn spawn_terminations(&self, run_id: i64) {
        let store = self.store.clone();
        let invoker = self.invoker.clone();
        let grace = Duration::from_millis(self.options.terminate_grace_ms);
        tokio::spawn(async move {
            match store.active_handles(run_id) {
                Ok(handles) => {
                    for (trial_id, raw) in handles {
                        tracing::info!(event = "prism.trial.terminate", run_id, trial_id, handle = %raw);
                        invoker.terminate(&ExecHandle::from_raw(raw), grace).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(event = "prism.run.terminate_failed", run_id, error = %e)
                }
            }
        });
    }

    /// Fire-and-forget relative to the run's terminal state: suggestion
    /// failures are logged and never touch the run.
    fn spawn_suggestions(&self, run: &Run, snapshot: &TestSuiteSnapshot, trials: &[Trial]) {
        let Some(generator) = self.suggestions.clone() else {
            return;
        };

        let by_example: HashMap<i64, &Trial> = trials
            .iter()
            .map(|t| (t.example_snapshot_id, t))
            .collect();
        let uncovered: Vec<ExampleSnapshot> = snapshot
            .examples
            .iter()
            .filter(|ex| {
                by_example
                    .get(&ex.id)
                    .map_or(true, |t| !t.results.iter().any(|r| r.passed))
            })
            .cloned()
            .collect();
        if uncovered.is_empty() {
            return;
        }

        let store = self.store.clone();
        let run = run.clone();
        tokio::spawn(async move {
            match generator.suggest(&run, &uncovered).await {
                Ok(items) => {
                    if let Err(e) = store.insert_suggestions(run.id, &items) {
                        tracing::warn!(event = "prism.suggest.failed", run_id = run.id, error = %e);
                    }
                }
                Err(e) => {
                    tracing::warn!(event = "prism.suggest.failed", run_id = run.id, error = %e)
                }
            }
        });
    }
}

/// Weighted pass fraction over every assertion of every trial. Assertions
/// whose trial failed before producing results count toward the denominator
/// only, so infra failures drag the score down without special-casing.
pub fn aggregate_score(snapshot: &TestSuiteSnapshot, trials: &[Trial]) -> Option<f64> {
    let mut weights: HashMap<i64, f64> = HashMap::new();
    let mut examples: HashMap<i64, &ExampleSnapshot> = HashMap::new();
    for ex in &snapshot.examples {
        examples.insert(ex.id, ex);
        for a in &ex.assertions {
            weights.insert(a.id, a.weight);
        }
    }

    let mut num = 0.0;
    let mut denom = 0.0;
    for trial in trials {
        let Some(ex) = examples.get(&trial.example_snapshot_id) else {
            continue;
        };
        for a in &ex.assertions {
            denom += a.weight;
        }
        for r in &trial.results {
            if r.passed {
                num += weights.get(&r.assertion_id).copied().unwrap_or(0.0);
            }
        }
    }

    if denom > 0.0 {
        Some(num / denom)
    } else {
        None
    }
}
