use crate::model::{Run, TrialStatus};
use crate::storage::Store;
use serde::Serialize;
use std::collections::BTreeMap;

/// Structural diff of two finished runs. Examples are aligned across
/// snapshots by logical_id, so longitudinal comparison survives edits to
/// question text.
pub struct ComparisonEngine {
    store: Store,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunComparison {
    pub base_run_id: i64,
    pub challenger_run_id: i64,
    /// Passed in base, failed in challenger.
    pub regressed: Vec<String>,
    /// Failed in base, passed in challenger.
    pub fixed: Vec<String>,
    pub unchanged: u32,
    /// Present only in the challenger's snapshot.
    pub added: Vec<String>,
    /// Present only in the base's snapshot.
    pub removed: Vec<String>,
    pub base_accuracy: f64,
    pub challenger_accuracy: f64,
    pub accuracy_delta: f64,
}

impl ComparisonEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn compare_runs(
        &self,
        base_run_id: i64,
        challenger_run_id: i64,
    ) -> anyhow::Result<RunComparison> {
        let base = self.load_outcomes(base_run_id)?;
        let challenger = self.load_outcomes(challenger_run_id)?;

        let mut regressed = Vec::new();
        let mut fixed = Vec::new();
        let mut unchanged = 0u32;
        let mut added = Vec::new();
        let mut removed = Vec::new();

        for (logical_id, challenger_passed) in &challenger.passed_by_example {
            match base.passed_by_example.get(logical_id) {
                None => added.push(logical_id.clone()),
                Some(base_passed) => match (base_passed, challenger_passed) {
                    (true, false) => regressed.push(logical_id.clone()),
                    (false, true) => fixed.push(logical_id.clone()),
                    _ => unchanged += 1,
                },
            }
        }
        for logical_id in base.passed_by_example.keys() {
            if !challenger.passed_by_example.contains_key(logical_id) {
                removed.push(logical_id.clone());
            }
        }

        // BTreeMap iteration already sorts the transition lists; sort the
        // rest for deterministic output regardless of insertion order.
        added.sort();
        removed.sort();

        let accuracy_delta = challenger.accuracy - base.accuracy;
        Ok(RunComparison {
            base_run_id,
            challenger_run_id,
            regressed,
            fixed,
            unchanged,
            added,
            removed,
            base_accuracy: base.accuracy,
            challenger_accuracy: challenger.accuracy,
            accuracy_delta,
        })
    }

    fn load_outcomes(&self, run_id: i64) -> anyhow::Result<RunOutcomes> {
        let run: Run = self.store.load_run(run_id)?;
        anyhow::ensure!(
            run.status.is_terminal(),
            "run {} is '{}', comparison requires a finished run",
            run_id,
            run.status.as_str()
        );

        let snapshot = self.store.load_snapshot(run.snapshot_id)?;
        let trials = self.store.trials_for_run(run_id)?;

        let mut passed_by_example = BTreeMap::new();
        for trial in &trials {
            let Some(ex) = snapshot
                .examples
                .iter()
                .find(|e| e.id == trial.example_snapshot_id)
            else {
                continue;
            };
            // An example passes when its trial succeeded and every
            // assertion passed.
            let passed = trial.status == TrialStatus::Succeeded
                && trial.results.iter().all(|r| r.passed);
            passed_by_example.insert(ex.logical_id.clone(), passed);
        }

        let total = passed_by_example.len();
        let passing = passed_by_example.values().filter(|p| **p).count();
        let accuracy = if total > 0 {
            passing as f64 / total as f64
        } else {
            0.0
        };

        Ok(RunOutcomes {
            passed_by_example,
            accuracy,
        })
    }
}

struct RunOutcomes {
    passed_by_example: BTreeMap<String, bool>,
    accuracy: f64,
}
