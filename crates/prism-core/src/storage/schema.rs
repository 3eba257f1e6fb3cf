pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS suites (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  tags_json TEXT NOT NULL DEFAULT '{}',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  archived INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS examples (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  suite_id INTEGER NOT NULL REFERENCES suites(id),
  logical_id TEXT NOT NULL,
  question TEXT NOT NULL,
  position INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  archived INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS assertions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  example_id INTEGER NOT NULL REFERENCES examples(id),
  weight REAL NOT NULL DEFAULT 1.0,
  spec_json TEXT NOT NULL,
  position INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  archived INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS suite_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  suite_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  tags_json TEXT NOT NULL DEFAULT '{}',
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS example_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  snapshot_id INTEGER NOT NULL REFERENCES suite_snapshots(id),
  logical_id TEXT NOT NULL,
  question TEXT NOT NULL,
  position INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS assertion_snapshots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  example_snapshot_id INTEGER NOT NULL REFERENCES example_snapshots(id),
  weight REAL NOT NULL,
  spec_json TEXT NOT NULL,
  position INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  snapshot_id INTEGER NOT NULL REFERENCES suite_snapshots(id),
  agent_id TEXT NOT NULL,
  status TEXT NOT NULL,
  generate_suggestions INTEGER NOT NULL DEFAULT 0,
  started_at TEXT NOT NULL,
  completed_at TEXT,
  aggregate_score REAL
);

CREATE TABLE IF NOT EXISTS trials (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id INTEGER NOT NULL REFERENCES runs(id),
  example_snapshot_id INTEGER NOT NULL REFERENCES example_snapshots(id),
  status TEXT NOT NULL,
  retry_count INTEGER NOT NULL DEFAULT 0,
  exec_handle TEXT,
  output_text TEXT,
  elapsed_ms INTEGER,
  diagnostic TEXT
);

CREATE TABLE IF NOT EXISTS assertion_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  trial_id INTEGER NOT NULL REFERENCES trials(id),
  assertion_snapshot_id INTEGER NOT NULL REFERENCES assertion_snapshots(id),
  passed INTEGER NOT NULL,
  score REAL NOT NULL,
  message TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS suggested_assertions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id INTEGER NOT NULL REFERENCES runs(id),
  example_logical_id TEXT NOT NULL,
  spec_json TEXT NOT NULL,
  rationale TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_examples_suite ON examples(suite_id);
CREATE INDEX IF NOT EXISTS idx_example_snapshots_snapshot ON example_snapshots(snapshot_id);
CREATE INDEX IF NOT EXISTS idx_trials_run ON trials(run_id);
CREATE INDEX IF NOT EXISTS idx_results_trial ON assertion_results(trial_id);
"#;
