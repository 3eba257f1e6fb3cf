//! End-to-end runs through the real scheduler, executor, store and the
//! default evaluator set, with scripted agent and judge providers.

use prism_core::engine::scheduler::RunScheduler;
use prism_core::model::{
    AgentDescriptor, Assertion, AssertionSpec, BackoffPolicy, Example, RecordMeta, RunOptions,
    RunStatus, Suite, TestSuiteSnapshot, TrialStatus,
};
use prism_core::providers::fake::{FakeAgent, FakeBehavior, FakeJudge, FakeSuggestions};
use prism_core::providers::{AgentInvoker, SuggestionGenerator};
use prism_core::snapshot::SnapshotManager;
use prism_core::storage::Store;
use prism_evaluators::default_evaluator_set;
use std::sync::Arc;
use std::time::Duration;

fn store() -> anyhow::Result<Store> {
    let store = Store::memory()?;
    store.init_schema()?;
    Ok(store)
}

fn agent() -> AgentDescriptor {
    AgentDescriptor {
        id: "agent-under-test".into(),
        endpoint: "local://fake".into(),
    }
}

fn fast_options() -> RunOptions {
    RunOptions {
        parallel: 2,
        max_retries: 0,
        backoff: BackoffPolicy::Fixed { delay_ms: 1 },
        attempt_timeout_ms: 5_000,
        ..Default::default()
    }
}

fn contains_example(logical_id: &str, question: &str, expect: &str) -> Example {
    Example {
        id: 0,
        logical_id: logical_id.into(),
        question: question.into(),
        assertions: vec![Assertion {
            id: 0,
            weight: 1.0,
            spec: AssertionSpec::TextContains {
                text: expect.into(),
                case_insensitive: false,
                regex: false,
            },
            meta: RecordMeta::now(),
        }],
        meta: RecordMeta::now(),
    }
}

fn freeze(store: &Store, examples: Vec<Example>) -> anyhow::Result<TestSuiteSnapshot> {
    let suite = store.create_suite(&Suite {
        id: 0,
        name: "pipeline".into(),
        description: String::new(),
        tags: Default::default(),
        examples,
        meta: RecordMeta::now(),
    })?;
    SnapshotManager::new(store.clone()).create_snapshot(suite.id)
}

#[tokio::test]
async fn infra_failed_trials_drag_the_aggregate_down() -> anyhow::Result<()> {
    let store = store()?;
    let snapshot = freeze(
        &store,
        vec![
            contains_example("ex-pass", "q-pass", "revenue"),
            contains_example("ex-dead", "q-dead", "revenue"),
        ],
    )?;

    let fake = Arc::new(FakeAgent::new());
    fake.script(
        "q-pass",
        FakeBehavior::Reply {
            text: "revenue was up".into(),
            elapsed_ms: 3,
        },
    );
    fake.script("q-dead", FakeBehavior::AlwaysFail);

    let scheduler = RunScheduler::new(
        store.clone(),
        fake.clone() as Arc<dyn AgentInvoker>,
        default_evaluator_set(Arc::new(FakeJudge::passing())),
        None,
        fast_options(),
    );

    let run = scheduler.create_run(&snapshot, &agent())?;
    let run = scheduler.dispatch(run.id, &agent()).await?;

    // 1 of 2 trials failed: exactly at the 0.5 threshold, so not over it.
    assert_eq!(run.status, RunStatus::Completed);
    // The dead trial's assertion weight stays in the denominator.
    assert!((run.aggregate_score.unwrap() - 0.5).abs() < 1e-9);

    let trials = store.trials_for_run(run.id)?;
    assert_eq!(
        trials
            .iter()
            .filter(|t| t.status == TrialStatus::Failed)
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn breaching_the_failure_threshold_fails_the_run() -> anyhow::Result<()> {
    let store = store()?;
    let snapshot = freeze(
        &store,
        vec![
            contains_example("ex-1", "q-1", "x"),
            contains_example("ex-2", "q-2", "x"),
        ],
    )?;

    let fake = Arc::new(FakeAgent::new());
    fake.script("q-1", FakeBehavior::AlwaysFail);
    fake.script("q-2", FakeBehavior::AlwaysFail);

    let scheduler = RunScheduler::new(
        store.clone(),
        fake as Arc<dyn AgentInvoker>,
        default_evaluator_set(Arc::new(FakeJudge::passing())),
        None,
        fast_options(),
    );

    let run = scheduler.create_run(&snapshot, &agent())?;
    let run = scheduler.dispatch(run.id, &agent()).await?;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.aggregate_score, Some(0.0));
    assert!(run.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn judge_outage_retries_the_whole_trial() -> anyhow::Result<()> {
    let store = store()?;
    let snapshot = freeze(
        &store,
        vec![Example {
            id: 0,
            logical_id: "ex-judged".into(),
            question: "q-judged".into(),
            assertions: vec![Assertion {
                id: 0,
                weight: 1.0,
                spec: AssertionSpec::AiJudge {
                    rubric: "is the answer grounded in the data?".into(),
                    threshold: 0.7,
                },
                meta: RecordMeta::now(),
            }],
            meta: RecordMeta::now(),
        }],
    )?;

    let fake = Arc::new(FakeAgent::new());
    let judge = Arc::new(FakeJudge::failing_first(1, 0.9));

    let scheduler = RunScheduler::new(
        store.clone(),
        fake.clone() as Arc<dyn AgentInvoker>,
        default_evaluator_set(judge.clone()),
        None,
        RunOptions {
            max_retries: 2,
            ..fast_options()
        },
    );

    let run = scheduler.create_run(&snapshot, &agent())?;
    let run = scheduler.dispatch(run.id, &agent()).await?;

    assert_eq!(run.status, RunStatus::Completed);
    assert!((run.aggregate_score.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(judge.call_count(), 2);
    // The outage re-ran the agent too, not just the judge call.
    assert_eq!(fake.call_count("q-judged"), 2);

    let trial = store.trials_for_run(run.id)?.remove(0);
    assert_eq!(trial.status, TrialStatus::Succeeded);
    assert_eq!(trial.retry_count, 1);
    assert!(trial.results[0].passed);
    Ok(())
}

#[tokio::test]
async fn uncovered_examples_get_suggestions_after_completion() -> anyhow::Result<()> {
    let store = store()?;
    let snapshot = freeze(
        &store,
        vec![
            contains_example("ex-covered", "q-covered", "revenue"),
            contains_example("ex-uncovered", "q-uncovered", "margin"),
        ],
    )?;

    let fake = Arc::new(FakeAgent::new());
    fake.script(
        "q-covered",
        FakeBehavior::Reply {
            text: "revenue was up".into(),
            elapsed_ms: 1,
        },
    );
    fake.script(
        "q-uncovered",
        FakeBehavior::Reply {
            text: "nothing relevant".into(),
            elapsed_ms: 1,
        },
    );

    let suggestions = Arc::new(FakeSuggestions::new());
    let scheduler = RunScheduler::new(
        store.clone(),
        fake as Arc<dyn AgentInvoker>,
        default_evaluator_set(Arc::new(FakeJudge::passing())),
        Some(suggestions.clone() as Arc<dyn SuggestionGenerator>),
        RunOptions {
            generate_suggestions: true,
            ..fast_options()
        },
    );

    let run = scheduler.create_run(&snapshot, &agent())?;
    let run = scheduler.dispatch(run.id, &agent()).await?;
    assert_eq!(run.status, RunStatus::Completed);

    // Generation runs detached from the terminal transition; poll for it.
    let mut stored = vec![];
    for _ in 0..100 {
        stored = store.suggestions_for_run(run.id)?;
        if !stored.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].example_logical_id, "ex-uncovered");

    let asked = suggestions.asked();
    assert_eq!(asked.len(), 1);
    assert_eq!(asked[0].0, run.id);
    assert_eq!(asked[0].1, vec!["ex-uncovered".to_string()]);
    Ok(())
}
