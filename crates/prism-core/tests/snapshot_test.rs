use prism_core::errors::ValidationError;
use prism_core::model::{
    Assertion, AssertionSpec, Example, RecordMeta, Suite, TrialStatus,
};
use prism_core::snapshot::SnapshotManager;
use prism_core::storage::Store;

fn store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
}

fn contains(text: &str) -> AssertionSpec {
    AssertionSpec::TextContains {
        text: text.into(),
        case_insensitive: false,
        regex: false,
    }
}

fn assertion(spec: AssertionSpec) -> Assertion {
    Assertion {
        id: 0,
        weight: 1.0,
        spec,
        meta: RecordMeta::now(),
    }
}

fn example(logical_id: &str, question: &str, assertions: Vec<Assertion>) -> Example {
    Example {
        id: 0,
        logical_id: logical_id.into(),
        question: question.into(),
        assertions,
        meta: RecordMeta::now(),
    }
}

fn suite(examples: Vec<Example>) -> Suite {
    Suite {
        id: 0,
        name: "orders-suite".into(),
        description: "order analytics regression suite".into(),
        tags: Default::default(),
        examples,
        meta: RecordMeta::now(),
    }
}

#[test]
fn snapshot_is_isolated_from_later_suite_edits() {
    let store = store();
    let suite = store
        .create_suite(&suite(vec![
            example("ex-revenue", "what was revenue last month?", vec![assertion(contains("revenue"))]),
            example("ex-orders", "how many orders completed?", vec![assertion(contains("orders"))]),
        ]))
        .unwrap();

    let snapshots = SnapshotManager::new(store.clone());
    let frozen = snapshots.create_snapshot(suite.id).unwrap();
    assert_eq!(frozen.examples.len(), 2);

    // Edit the live suite in every way the API allows.
    let ex = &suite.examples[0];
    store
        .update_example_question(ex.id, "completely different question")
        .unwrap();
    store
        .update_assertion_spec(ex.assertions[0].id, &contains("margin"))
        .unwrap();
    store.archive_example(suite.examples[1].id).unwrap();

    // The frozen copy still reads back exactly as captured.
    let reloaded = store.load_snapshot(frozen.id).unwrap();
    assert_eq!(reloaded.examples.len(), 2);
    assert_eq!(reloaded.examples[0].question, "what was revenue last month?");
    assert_eq!(reloaded.examples[0].assertions[0].spec, contains("revenue"));

    // A fresh snapshot sees the edits and drops the archived example.
    let second = snapshots.create_snapshot(suite.id).unwrap();
    assert_eq!(second.examples.len(), 1);
    assert_eq!(second.examples[0].question, "completely different question");
    assert_eq!(second.examples[0].assertions[0].spec, contains("margin"));
}

#[test]
fn snapshot_assigns_fresh_ids_distinct_from_live_rows() {
    let store = store();
    let suite = store
        .create_suite(&suite(vec![example(
            "ex-1",
            "q1",
            vec![assertion(contains("a"))],
        )]))
        .unwrap();

    let frozen = SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .unwrap();
    assert!(frozen.id > 0);
    // Snapshot rows live in their own tables; editing live rows by these
    // ids cannot touch them.
    assert_eq!(store.count_rows("example_snapshots").unwrap(), 1);
    assert_eq!(store.count_rows("assertion_snapshots").unwrap(), 1);
    assert_eq!(frozen.examples[0].logical_id, "ex-1");
}

#[test]
fn invalid_assertion_aborts_the_whole_snapshot() {
    let store = store();
    let suite = store
        .create_suite(&suite(vec![
            example("ex-good", "q1", vec![assertion(contains("fine"))]),
            example(
                "ex-bad",
                "q2",
                vec![assertion(AssertionSpec::TextContains {
                    text: "([unclosed".into(),
                    case_insensitive: false,
                    regex: true,
                })],
            ),
        ]))
        .unwrap();

    let err = SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .unwrap_err();
    assert!(
        err.downcast_ref::<ValidationError>().is_some(),
        "expected a validation error, got: {:#}",
        err
    );

    // All or nothing: the valid example was not persisted either.
    assert_eq!(store.count_rows("suite_snapshots").unwrap(), 0);
    assert_eq!(store.count_rows("example_snapshots").unwrap(), 0);
    assert_eq!(store.count_rows("assertion_snapshots").unwrap(), 0);
}

#[test]
fn nonpositive_weight_is_rejected() {
    let store = store();
    let mut bad = assertion(contains("x"));
    bad.weight = 0.0;
    let suite = store
        .create_suite(&suite(vec![example("ex-1", "q1", vec![bad])]))
        .unwrap();

    assert!(SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .is_err());
    assert_eq!(store.count_rows("suite_snapshots").unwrap(), 0);
}

#[test]
fn run_creation_seeds_one_pending_trial_per_example() {
    let store = store();
    let suite = store
        .create_suite(&suite(vec![
            example("ex-1", "q1", vec![assertion(contains("a"))]),
            example("ex-2", "q2", vec![assertion(contains("b"))]),
        ]))
        .unwrap();
    let frozen = SnapshotManager::new(store.clone())
        .create_snapshot(suite.id)
        .unwrap();

    let run = store.create_run(&frozen, "agent-under-test", false).unwrap();
    let trials = store.trials_for_run(run.id).unwrap();
    assert_eq!(trials.len(), 2);
    assert!(trials.iter().all(|t| t.status == TrialStatus::Pending));
    assert!(trials.iter().all(|t| t.retry_count == 0));
}
