use prism_core::compare::ComparisonEngine;
use prism_core::model::{
    Assertion, AssertionResult, AssertionSpec, Example, RecordMeta, RunStatus, Suite, TrialOutput,
};
use prism_core::snapshot::SnapshotManager;
use prism_core::storage::Store;

fn store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
}

fn suite_with(logical_ids: &[&str]) -> Suite {
    Suite {
        id: 0,
        name: "compare".into(),
        description: String::new(),
        tags: Default::default(),
        examples: logical_ids
            .iter()
            .map(|lid| Example {
                id: 0,
                logical_id: (*lid).into(),
                question: format!("question for {}", lid),
                assertions: vec![Assertion {
                    id: 0,
                    weight: 1.0,
                    spec: AssertionSpec::TextContains {
                        text: "ok".into(),
                        case_insensitive: false,
                        regex: false,
                    },
                    meta: RecordMeta::now(),
                }],
                meta: RecordMeta::now(),
            })
            .collect(),
        meta: RecordMeta::now(),
    }
}

/// Creates a terminal run where each (logical_id, passed) pair drives one
/// trial's single assertion verdict.
fn finished_run(store: &Store, outcomes: &[(&str, bool)]) -> i64 {
    let suite = store
        .create_suite(&suite_with(
            &outcomes.iter().map(|(lid, _)| *lid).collect::<Vec<_>>(),
        ))
        .unwrap();
    let snapshot = SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .unwrap();
    let run = store.create_run(&snapshot, "agent", false).unwrap();

    for trial in store.trials_for_run(run.id).unwrap() {
        let ex = snapshot
            .examples
            .iter()
            .find(|e| e.id == trial.example_snapshot_id)
            .unwrap();
        let passed = outcomes
            .iter()
            .find(|(lid, _)| *lid == ex.logical_id)
            .unwrap()
            .1;
        store
            .mark_trial_running(trial.id, "h")
            .unwrap();
        store
            .mark_trial_succeeded(
                trial.id,
                &TrialOutput {
                    text: "answer".into(),
                    elapsed_ms: 1,
                },
                &[AssertionResult {
                    assertion_id: ex.assertions[0].id,
                    passed,
                    score: if passed { 1.0 } else { 0.0 },
                    message: String::new(),
                }],
            )
            .unwrap();
    }
    store
        .complete_run(run.id, RunStatus::Completed, None)
        .unwrap();
    run.id
}

#[test]
fn classifies_transitions_by_logical_id() {
    let store = store();
    let base = finished_run(
        &store,
        &[("a", true), ("b", false), ("c", true), ("e", true)],
    );
    let challenger = finished_run(
        &store,
        &[("a", false), ("b", true), ("d", true), ("e", true)],
    );

    let cmp = ComparisonEngine::new(store.clone())
        .compare_runs(base, challenger)
        .unwrap();

    assert_eq!(cmp.regressed, vec!["a".to_string()]);
    assert_eq!(cmp.fixed, vec!["b".to_string()]);
    assert_eq!(cmp.added, vec!["d".to_string()]);
    assert_eq!(cmp.removed, vec!["c".to_string()]);
    assert_eq!(cmp.unchanged, 1); // "e" passed in both

    // 3/4 both sides
    assert!((cmp.base_accuracy - 0.75).abs() < 1e-9);
    assert!((cmp.challenger_accuracy - 0.75).abs() < 1e-9);
    assert!(cmp.accuracy_delta.abs() < 1e-9);
}

#[test]
fn swapping_runs_swaps_regressed_and_fixed() {
    let store = store();
    let base = finished_run(&store, &[("a", true), ("b", false)]);
    let challenger = finished_run(&store, &[("a", false), ("b", true)]);
    let engine = ComparisonEngine::new(store.clone());

    let forward = engine.compare_runs(base, challenger).unwrap();
    let backward = engine.compare_runs(challenger, base).unwrap();

    assert_eq!(forward.regressed, backward.fixed);
    assert_eq!(forward.fixed, backward.regressed);
    assert!((forward.accuracy_delta + backward.accuracy_delta).abs() < 1e-9);
}

#[test]
fn unfinished_runs_cannot_be_compared() {
    let store = store();
    let base = finished_run(&store, &[("a", true)]);

    let suite = store.create_suite(&suite_with(&["a"])).unwrap();
    let snapshot = SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .unwrap();
    let in_flight = store.create_run(&snapshot, "agent", false).unwrap();

    let err = ComparisonEngine::new(store.clone())
        .compare_runs(base, in_flight.id)
        .unwrap_err();
    assert!(err.to_string().contains("requires a finished run"));
}
