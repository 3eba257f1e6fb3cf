use crate::model::{
    Assertion, AssertionResult, AssertionSnapshot, AssertionSpec, Example, ExampleSnapshot,
    RecordMeta, Run, RunStatus, SuggestedAssertion, Suite, TestSuiteSnapshot, Trial, TrialOutput,
    TrialStatus,
};
use anyhow::Context;
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Sqlite-backed persistence. The single connection behind a mutex is the
/// coordination point that serializes all run/trial state transitions; each
/// transition is one transaction, so a crash mid-dispatch leaves every trial
/// in a well-defined, resumable state.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> anyhow::Result<i64> {
        // allowlist to keep this test helper injection-proof
        const TABLES: &[&str] = &[
            "suites",
            "examples",
            "assertions",
            "suite_snapshots",
            "example_snapshots",
            "assertion_snapshots",
            "runs",
            "trials",
            "assertion_results",
            "suggested_assertions",
        ];
        if !TABLES.contains(&table) {
            anyhow::bail!("invalid table name for count_rows: {}", table);
        }
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }

    // --- Live suite tree ---

    pub fn create_suite(&self, suite: &Suite) -> anyhow::Result<Suite> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO suites(name, description, tags_json, created_at, updated_at, archived)
             VALUES (?1, ?2, ?3, ?4, ?4, 0)",
            params![
                suite.name,
                suite.description,
                serde_json::to_string(&suite.tags)?,
                now
            ],
        )?;
        let suite_id = tx.last_insert_rowid();

        let mut out = suite.clone();
        out.id = suite_id;

        for (pos, ex) in out.examples.iter_mut().enumerate() {
            tx.execute(
                "INSERT INTO examples(suite_id, logical_id, question, position, created_at, updated_at, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
                params![suite_id, ex.logical_id, ex.question, pos as i64, now, ex.meta.archived],
            )?;
            ex.id = tx.last_insert_rowid();
            for (apos, a) in ex.assertions.iter_mut().enumerate() {
                tx.execute(
                    "INSERT INTO assertions(example_id, weight, spec_json, position, created_at, updated_at, archived)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
                    params![
                        ex.id,
                        a.weight,
                        serde_json::to_string(&a.spec)?,
                        apos as i64,
                        now,
                        a.meta.archived
                    ],
                )?;
                a.id = tx.last_insert_rowid();
            }
        }

        tx.commit()?;
        Ok(out)
    }

    pub fn load_suite(&self, suite_id: i64) -> anyhow::Result<Suite> {
        let conn = self.conn.lock().unwrap();
        let (name, description, tags_json, created_at, updated_at, archived): (
            String,
            String,
            String,
            String,
            String,
            bool,
        ) = conn
            .query_row(
                "SELECT name, description, tags_json, created_at, updated_at, archived
                 FROM suites WHERE id = ?1",
                params![suite_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                    ))
                },
            )
            .with_context(|| format!("suite {} not found", suite_id))?;

        let tags: BTreeMap<String, String> = serde_json::from_str(&tags_json)?;

        let mut stmt = conn.prepare(
            "SELECT id, logical_id, question, created_at, updated_at, archived
             FROM examples WHERE suite_id = ?1 ORDER BY position ASC",
        )?;
        let mut examples = stmt
            .query_map(params![suite_id], |r| {
                Ok(Example {
                    id: r.get(0)?,
                    logical_id: r.get(1)?,
                    question: r.get(2)?,
                    assertions: vec![],
                    meta: RecordMeta {
                        created_at: r.get(3)?,
                        updated_at: r.get(4)?,
                        archived: r.get(5)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut astmt = conn.prepare(
            "SELECT id, weight, spec_json, created_at, updated_at, archived
             FROM assertions WHERE example_id = ?1 ORDER BY position ASC",
        )?;
        for ex in examples.iter_mut() {
            let rows = astmt.query_map(params![ex.id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, bool>(5)?,
                ))
            })?;
            for row in rows {
                let (id, weight, spec_json, created_at, updated_at, archived) = row?;
                let spec: AssertionSpec = serde_json::from_str(&spec_json)
                    .with_context(|| format!("unknown assertion spec on row {}", id))?;
                ex.assertions.push(Assertion {
                    id,
                    weight,
                    spec,
                    meta: RecordMeta {
                        created_at,
                        updated_at,
                        archived,
                    },
                });
            }
        }

        Ok(Suite {
            id: suite_id,
            name,
            description,
            tags,
            examples,
            meta: RecordMeta {
                created_at,
                updated_at,
                archived,
            },
        })
    }

    pub fn update_example_question(&self, example_id: i64, question: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE examples SET question = ?1, updated_at = ?2 WHERE id = ?3",
            params![question, now, example_id],
        )?;
        Ok(())
    }

    pub fn update_assertion_spec(
        &self,
        assertion_id: i64,
        spec: &AssertionSpec,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE assertions SET spec_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(spec)?, now, assertion_id],
        )?;
        Ok(())
    }

    pub fn archive_example(&self, example_id: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE examples SET archived = 1, updated_at = ?1 WHERE id = ?2",
            params![now, example_id],
        )?;
        Ok(())
    }

    // --- Snapshot tree (write-once) ---

    /// Persists a snapshot tree in one transaction. Ids on the input are
    /// ignored; fresh immutable row ids are assigned, distinct from the live
    /// rows. There is deliberately no update path for snapshot rows.
    pub fn insert_snapshot_tree(
        &self,
        snapshot: &TestSuiteSnapshot,
    ) -> anyhow::Result<TestSuiteSnapshot> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO suite_snapshots(suite_id, name, description, tags_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.suite_id,
                snapshot.name,
                snapshot.description,
                serde_json::to_string(&snapshot.tags)?,
                snapshot.created_at
            ],
        )?;
        let snapshot_id = tx.last_insert_rowid();

        let mut out = snapshot.clone();
        out.id = snapshot_id;

        for (pos, ex) in out.examples.iter_mut().enumerate() {
            tx.execute(
                "INSERT INTO example_snapshots(snapshot_id, logical_id, question, position)
                 VALUES (?1, ?2, ?3, ?4)",
                params![snapshot_id, ex.logical_id, ex.question, pos as i64],
            )?;
            ex.id = tx.last_insert_rowid();
            for (apos, a) in ex.assertions.iter_mut().enumerate() {
                tx.execute(
                    "INSERT INTO assertion_snapshots(example_snapshot_id, weight, spec_json, position)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![ex.id, a.weight, serde_json::to_string(&a.spec)?, apos as i64],
                )?;
                a.id = tx.last_insert_rowid();
            }
        }

        tx.commit()?;
        Ok(out)
    }

    pub fn load_snapshot(&self, snapshot_id: i64) -> anyhow::Result<TestSuiteSnapshot> {
        let conn = self.conn.lock().unwrap();
        let (suite_id, name, description, tags_json, created_at): (
            i64,
            String,
            String,
            String,
            String,
        ) = conn
            .query_row(
                "SELECT suite_id, name, description, tags_json, created_at
                 FROM suite_snapshots WHERE id = ?1",
                params![snapshot_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .with_context(|| format!("snapshot {} not found", snapshot_id))?;

        let mut stmt = conn.prepare(
            "SELECT id, logical_id, question FROM example_snapshots
             WHERE snapshot_id = ?1 ORDER BY position ASC",
        )?;
        let mut examples = stmt
            .query_map(params![snapshot_id], |r| {
                Ok(ExampleSnapshot {
                    id: r.get(0)?,
                    logical_id: r.get(1)?,
                    question: r.get(2)?,
                    assertions: vec![],
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut astmt = conn.prepare(
            "SELECT id, weight, spec_json FROM assertion_snapshots
             WHERE example_snapshot_id = ?1 ORDER BY position ASC",
        )?;
        for ex in examples.iter_mut() {
            let rows = astmt.query_map(params![ex.id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, f64>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (id, weight, spec_json) = row?;
                let spec: AssertionSpec = serde_json::from_str(&spec_json)
                    .with_context(|| format!("unknown assertion spec on snapshot row {}", id))?;
                ex.assertions.push(AssertionSnapshot { id, weight, spec });
            }
        }

        Ok(TestSuiteSnapshot {
            id: snapshot_id,
            suite_id,
            name,
            description,
            tags: serde_json::from_str(&tags_json)?,
            created_at,
            examples,
        })
    }

    // --- Runs ---

    /// Creates the run plus one pending trial per example snapshot, in one
    /// transaction.
    pub fn create_run(
        &self,
        snapshot: &TestSuiteSnapshot,
        agent_id: &str,
        generate_suggestions: bool,
    ) -> anyhow::Result<Run> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let started_at = chrono::Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO runs(snapshot_id, agent_id, status, generate_suggestions, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.id,
                agent_id,
                RunStatus::Pending.as_str(),
                generate_suggestions,
                started_at
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        for ex in &snapshot.examples {
            tx.execute(
                "INSERT INTO trials(run_id, example_snapshot_id, status, retry_count)
                 VALUES (?1, ?2, ?3, 0)",
                params![run_id, ex.id, TrialStatus::Pending.as_str()],
            )?;
        }

        tx.commit()?;
        Ok(Run {
            id: run_id,
            snapshot_id: snapshot.id,
            agent_id: agent_id.to_string(),
            status: RunStatus::Pending,
            generate_suggestions,
            started_at,
            completed_at: None,
            aggregate_score: None,
        })
    }

    pub fn load_run(&self, run_id: i64) -> anyhow::Result<Run> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT snapshot_id, agent_id, status, generate_suggestions, started_at,
                        completed_at, aggregate_score
                 FROM runs WHERE id = ?1",
                params![run_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, bool>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, Option<String>>(5)?,
                        r.get::<_, Option<f64>>(6)?,
                    ))
                },
            )
            .with_context(|| format!("run {} not found", run_id))?;

        let status = RunStatus::parse(&row.2)
            .with_context(|| format!("unknown run status '{}' on run {}", row.2, run_id))?;

        Ok(Run {
            id: run_id,
            snapshot_id: row.0,
            agent_id: row.1,
            status,
            generate_suggestions: row.3,
            started_at: row.4,
            completed_at: row.5,
            aggregate_score: row.6,
        })
    }

    /// Non-terminal run status transition. A no-op once the run is terminal,
    /// which keeps a racing cancel and a finishing dispatch from fighting.
    pub fn update_run_status(&self, run_id: i64, status: RunStatus) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE runs SET status = ?1
             WHERE id = ?2 AND status NOT IN ('completed', 'failed')",
            params![status.as_str(), run_id],
        )?;
        if changed == 0 {
            tracing::debug!(run_id, status = status.as_str(), "run transition skipped");
        }
        Ok(())
    }

    pub fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        aggregate_score: Option<f64>,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(status.is_terminal(), "complete_run requires a terminal status");
        let conn = self.conn.lock().unwrap();
        let completed_at = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE runs SET status = ?1, completed_at = ?2, aggregate_score = ?3
             WHERE id = ?4 AND status NOT IN ('completed', 'failed')",
            params![status.as_str(), completed_at, aggregate_score, run_id],
        )?;
        Ok(())
    }

    // --- Trials ---

    fn trial_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<(Trial, String)> {
        let status_str: String = r.get(3)?;
        let output_text: Option<String> = r.get(6)?;
        let elapsed_ms: Option<i64> = r.get(7)?;
        let output = match (output_text, elapsed_ms) {
            (Some(text), Some(ms)) => Some(TrialOutput {
                text,
                elapsed_ms: ms as u64,
            }),
            _ => None,
        };
        Ok((
            Trial {
                id: r.get(0)?,
                run_id: r.get(1)?,
                example_snapshot_id: r.get(2)?,
                status: TrialStatus::Pending, // fixed up by the caller
                retry_count: r.get::<_, i64>(4)? as u32,
                exec_handle: r.get(5)?,
                output,
                diagnostic: r.get(8)?,
                results: vec![],
            },
            status_str,
        ))
    }

    const TRIAL_COLS: &'static str =
        "id, run_id, example_snapshot_id, status, retry_count, exec_handle, output_text, elapsed_ms, diagnostic";

    pub fn load_trial(&self, trial_id: i64) -> anyhow::Result<Trial> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM trials WHERE id = ?1", Self::TRIAL_COLS);
        let (mut trial, status_str) = conn
            .query_row(&sql, params![trial_id], Self::trial_from_row)
            .with_context(|| format!("trial {} not found", trial_id))?;
        trial.status = TrialStatus::parse(&status_str)
            .with_context(|| format!("unknown trial status '{}' on trial {}", status_str, trial_id))?;
        trial.results = Self::results_for_trial_locked(&conn, trial_id)?;
        Ok(trial)
    }

    pub fn trials_for_run(&self, run_id: i64) -> anyhow::Result<Vec<Trial>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM trials WHERE run_id = ?1 ORDER BY id ASC",
            Self::TRIAL_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![run_id], Self::trial_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut trials = Vec::with_capacity(rows.len());
        for (mut trial, status_str) in rows {
            trial.status = TrialStatus::parse(&status_str).with_context(|| {
                format!("unknown trial status '{}' on trial {}", status_str, trial.id)
            })?;
            trial.results = Self::results_for_trial_locked(&conn, trial.id)?;
            trials.push(trial);
        }
        Ok(trials)
    }

    /// Trials eligible for dispatch: pending or waiting on a retry. Never
    /// returns succeeded trials, which is what makes resume idempotent.
    pub fn dispatchable_trials(&self, run_id: i64) -> anyhow::Result<Vec<Trial>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM trials WHERE run_id = ?1 AND status IN ('pending', 'retry') ORDER BY id ASC",
            Self::TRIAL_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![run_id], Self::trial_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut trials = Vec::with_capacity(rows.len());
        for (mut trial, status_str) in rows {
            trial.status = TrialStatus::parse(&status_str).with_context(|| {
                format!("unknown trial status '{}' on trial {}", status_str, trial.id)
            })?;
            trials.push(trial);
        }
        Ok(trials)
    }

    fn guarded_trial_transition(
        tx: &Transaction,
        trial_id: i64,
        allowed_from: &[TrialStatus],
    ) -> anyhow::Result<TrialStatus> {
        let status_str: String = tx
            .query_row(
                "SELECT status FROM trials WHERE id = ?1",
                params![trial_id],
                |r| r.get(0),
            )
            .with_context(|| format!("trial {} not found", trial_id))?;
        let status = TrialStatus::parse(&status_str)
            .with_context(|| format!("unknown trial status '{}' on trial {}", status_str, trial_id))?;
        if !allowed_from.contains(&status) {
            anyhow::bail!(
                "illegal trial transition: trial {} is '{}'",
                trial_id,
                status.as_str()
            );
        }
        Ok(status)
    }

    pub fn mark_trial_running(&self, trial_id: i64, exec_handle: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::guarded_trial_transition(&tx, trial_id, &[TrialStatus::Pending, TrialStatus::Retry])?;
        tx.execute(
            "UPDATE trials SET status = 'running', exec_handle = ?1 WHERE id = ?2",
            params![exec_handle, trial_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn mark_trial_retry(
        &self,
        trial_id: i64,
        retry_count: u32,
        diagnostic: &str,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::guarded_trial_transition(&tx, trial_id, &[TrialStatus::Running])?;
        tx.execute(
            "UPDATE trials SET status = 'retry', exec_handle = NULL, retry_count = ?1, diagnostic = ?2
             WHERE id = ?3",
            params![retry_count as i64, diagnostic, trial_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn mark_trial_succeeded(
        &self,
        trial_id: i64,
        output: &TrialOutput,
        results: &[AssertionResult],
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::guarded_trial_transition(&tx, trial_id, &[TrialStatus::Running])?;
        tx.execute(
            "UPDATE trials SET status = 'succeeded', exec_handle = NULL, output_text = ?1,
                    elapsed_ms = ?2, diagnostic = NULL
             WHERE id = ?3",
            params![output.text, output.elapsed_ms as i64, trial_id],
        )?;
        let mut stmt = tx.prepare(
            "INSERT INTO assertion_results(trial_id, assertion_snapshot_id, passed, score, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for res in results {
            stmt.execute(params![
                trial_id,
                res.assertion_id,
                res.passed,
                res.score,
                res.message
            ])?;
        }
        drop(stmt);
        tx.commit()?;
        Ok(())
    }

    pub fn mark_trial_failed(&self, trial_id: i64, diagnostic: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::guarded_trial_transition(&tx, trial_id, &[TrialStatus::Running])?;
        tx.execute(
            "UPDATE trials SET status = 'failed', exec_handle = NULL, diagnostic = ?1 WHERE id = ?2",
            params![diagnostic, trial_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Pause/cancel interrupted an attempt: hand the trial back to the
    /// dispatchable pool without burning retry budget.
    pub fn mark_trial_suspended(&self, trial_id: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let status = Self::guarded_trial_transition(
            &tx,
            trial_id,
            &[TrialStatus::Running, TrialStatus::Pending, TrialStatus::Retry],
        )?;
        if status == TrialStatus::Running {
            tx.execute(
                "UPDATE trials SET status = 'pending', exec_handle = NULL WHERE id = ?1",
                params![trial_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn results_for_trial_locked(
        conn: &Connection,
        trial_id: i64,
    ) -> anyhow::Result<Vec<AssertionResult>> {
        let mut stmt = conn.prepare(
            "SELECT assertion_snapshot_id, passed, score, message
             FROM assertion_results WHERE trial_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![trial_id], |r| {
                Ok(AssertionResult {
                    assertion_id: r.get(0)?,
                    passed: r.get(1)?,
                    score: r.get(2)?,
                    message: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn results_for_trial(&self, trial_id: i64) -> anyhow::Result<Vec<AssertionResult>> {
        let conn = self.conn.lock().unwrap();
        Self::results_for_trial_locked(&conn, trial_id)
    }

    /// Trials of this run with a recorded execution handle, i.e. attempts
    /// currently in flight. Used only to request termination on cancel.
    pub fn active_handles(&self, run_id: i64) -> anyhow::Result<Vec<(i64, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, exec_handle FROM trials
             WHERE run_id = ?1 AND exec_handle IS NOT NULL",
        )?;
        let rows = stmt
            .query_map(params![run_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Suggestions ---

    pub fn insert_suggestions(
        &self,
        run_id: i64,
        suggestions: &[SuggestedAssertion],
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut stmt = tx.prepare(
            "INSERT INTO suggested_assertions(run_id, example_logical_id, spec_json, rationale, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for s in suggestions {
            stmt.execute(params![
                run_id,
                s.example_logical_id,
                serde_json::to_string(&s.spec)?,
                s.rationale,
                created_at
            ])?;
        }
        drop(stmt);
        tx.commit()?;
        Ok(())
    }

    pub fn suggestions_for_run(&self, run_id: i64) -> anyhow::Result<Vec<SuggestedAssertion>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT example_logical_id, spec_json, rationale
             FROM suggested_assertions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (example_logical_id, spec_json, rationale) in rows {
            out.push(SuggestedAssertion {
                example_logical_id,
                spec: serde_json::from_str(&spec_json)?,
                rationale,
            });
        }
        Ok(out)
    }
}
