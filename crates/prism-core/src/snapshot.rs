use crate::model::{AssertionSnapshot, ExampleSnapshot, TestSuiteSnapshot};
use crate::storage::Store;
use anyhow::Context;

/// Freezes a live suite into an immutable snapshot at run-creation time, so
/// a run stays reproducible while the live suite keeps being edited.
pub struct SnapshotManager {
    store: Store,
}

impl SnapshotManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Deep-copies the suite's current name, description, tags and every
    /// non-archived example with its assertions, assigning fresh immutable
    /// ids. Validation happens here, not at evaluation time: any malformed
    /// assertion payload aborts the whole snapshot and nothing is persisted.
    pub fn create_snapshot(&self, suite_id: i64) -> anyhow::Result<TestSuiteSnapshot> {
        let suite = self.store.load_suite(suite_id)?;

        let mut examples = Vec::new();
        for ex in suite.examples.iter().filter(|e| !e.meta.archived) {
            let mut assertions = Vec::new();
            for a in ex.assertions.iter().filter(|a| !a.meta.archived) {
                a.spec.validate().map_err(anyhow::Error::from).with_context(|| {
                    format!("suite '{}', example '{}'", suite.name, ex.logical_id)
                })?;
                anyhow::ensure!(
                    a.weight > 0.0,
                    "suite '{}', example '{}': assertion weight must be positive",
                    suite.name,
                    ex.logical_id
                );
                assertions.push(AssertionSnapshot {
                    id: 0,
                    weight: a.weight,
                    spec: a.spec.clone(),
                });
            }
            examples.push(ExampleSnapshot {
                id: 0,
                logical_id: ex.logical_id.clone(),
                question: ex.question.clone(),
                assertions,
            });
        }

        let snapshot = TestSuiteSnapshot {
            id: 0,
            suite_id: suite.id,
            name: suite.name,
            description: suite.description,
            tags: suite.tags,
            created_at: chrono::Utc::now().to_rfc3339(),
            examples,
        };

        let persisted = self.store.insert_snapshot_tree(&snapshot)?;
        tracing::info!(
            event = "prism.snapshot.created",
            snapshot_id = persisted.id,
            suite_id = persisted.suite_id,
            examples = persisted.examples.len(),
            "suite frozen into snapshot"
        );
        Ok(persisted)
    }
}
