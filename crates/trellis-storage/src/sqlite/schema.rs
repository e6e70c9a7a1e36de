//! DDL statements and migrations for the SQLite schema.
//!
//! Timestamps are stored as TEXT in ISO 8601 format (SQLite has no native
//! datetime type). Booleans are stored as INTEGER (0/1). List-valued fields
//! (depends_on, files_changed, idea lists) are JSON arrays in TEXT. Key
//! formats are enforced with GLOB check constraints; status values are
//! workflow-defined and validated in code.

/// Current schema version. Bumped whenever DDL or migrations change.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL statements executed during `init_schema`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Epics table ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS epics (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        key            TEXT NOT NULL UNIQUE
                       CHECK (key GLOB 'E[0-9][0-9]'),
        title          TEXT NOT NULL,
        description    TEXT,
        status         TEXT NOT NULL DEFAULT 'planning',
        priority       TEXT NOT NULL DEFAULT 'medium',
        business_value TEXT,
        slug           TEXT,
        file_path      TEXT,
        created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_epics_file_path
     ON epics(file_path) WHERE file_path IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_epics_status ON epics(status)",
    // -- Features table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS features (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        epic_id         INTEGER NOT NULL,
        key             TEXT NOT NULL UNIQUE
                        CHECK (key GLOB 'E[0-9][0-9]-F[0-9][0-9]'),
        title           TEXT NOT NULL,
        description     TEXT,
        status          TEXT NOT NULL DEFAULT 'planning',
        status_override INTEGER NOT NULL DEFAULT 0,
        progress_pct    REAL NOT NULL DEFAULT 0.0,
        execution_order INTEGER,
        slug            TEXT,
        file_path       TEXT,
        created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        FOREIGN KEY (epic_id) REFERENCES epics(id) ON DELETE CASCADE
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_features_file_path
     ON features(file_path) WHERE file_path IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_features_epic ON features(epic_id)",
    "CREATE INDEX IF NOT EXISTS idx_features_status ON features(status)",
    // -- Tasks table ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        feature_id          INTEGER NOT NULL,
        key                 TEXT NOT NULL UNIQUE
                            CHECK (key GLOB 'T-E[0-9][0-9]-F[0-9][0-9]-[0-9][0-9][0-9]'),
        title               TEXT NOT NULL,
        description         TEXT,
        status              TEXT NOT NULL DEFAULT 'todo',
        agent_type          TEXT NOT NULL DEFAULT 'generalist',
        priority            INTEGER NOT NULL DEFAULT 2,
        depends_on          TEXT NOT NULL DEFAULT '[]',
        assigned_agent      TEXT,
        file_path           TEXT,
        blocked_reason      TEXT,
        execution_order     INTEGER,
        completed_by        TEXT,
        completion_notes    TEXT,
        files_changed       TEXT NOT NULL DEFAULT '[]',
        tests_passed        INTEGER,
        verification_status TEXT NOT NULL DEFAULT 'unverified',
        time_spent_minutes  INTEGER,
        created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        started_at          TEXT,
        completed_at        TEXT,
        blocked_at          TEXT,
        updated_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        FOREIGN KEY (feature_id) REFERENCES features(id) ON DELETE CASCADE
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_file_path
     ON tasks(file_path) WHERE file_path IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_tasks_feature ON tasks(feature_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    // -- Task history table (append-only) ------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS task_history (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id          INTEGER NOT NULL,
        old_status       TEXT,
        new_status       TEXT NOT NULL,
        timestamp        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        agent            TEXT,
        notes            TEXT,
        rejection_reason TEXT,
        forced           INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_history_task
     ON task_history(task_id, timestamp)",
    // -- Task notes table ----------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS task_notes (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id    INTEGER NOT NULL,
        note_type  TEXT NOT NULL,
        content    TEXT NOT NULL,
        created_by TEXT,
        metadata   TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_notes_task
     ON task_notes(task_id, note_type)",
    // -- Task relationships table --------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS task_relationships (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        from_task_id      INTEGER NOT NULL,
        to_task_id        INTEGER NOT NULL,
        relationship_type TEXT NOT NULL,
        created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (from_task_id, to_task_id, relationship_type),
        FOREIGN KEY (from_task_id) REFERENCES tasks(id) ON DELETE CASCADE,
        FOREIGN KEY (to_task_id) REFERENCES tasks(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_relationships_from
     ON task_relationships(from_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_relationships_to
     ON task_relationships(to_task_id)",
    // -- Task criteria table -------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS task_criteria (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id    INTEGER NOT NULL,
        criterion  TEXT NOT NULL,
        is_met     INTEGER NOT NULL DEFAULT 0,
        position   INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_criteria_task ON task_criteria(task_id)",
    // -- Ideas table ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS ideas (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        key               TEXT NOT NULL UNIQUE,
        title             TEXT NOT NULL,
        description       TEXT,
        created_date      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        priority          TEXT NOT NULL DEFAULT 'medium',
        position          INTEGER NOT NULL DEFAULT 0,
        notes             TEXT,
        related_docs      TEXT NOT NULL DEFAULT '[]',
        dependencies      TEXT NOT NULL DEFAULT '[]',
        status            TEXT NOT NULL DEFAULT 'new',
        converted_to_type TEXT,
        converted_to_key  TEXT,
        converted_at      TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ideas_status ON ideas(status)",
    // -- Documents table -----------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        title      TEXT NOT NULL,
        file_path  TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        UNIQUE (title, file_path)
    )
    "#,
    // -- Document join tables ------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS epic_documents (
        epic_id     INTEGER NOT NULL,
        document_id INTEGER NOT NULL,
        PRIMARY KEY (epic_id, document_id),
        FOREIGN KEY (epic_id) REFERENCES epics(id) ON DELETE CASCADE,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feature_documents (
        feature_id  INTEGER NOT NULL,
        document_id INTEGER NOT NULL,
        PRIMARY KEY (feature_id, document_id),
        FOREIGN KEY (feature_id) REFERENCES features(id) ON DELETE CASCADE,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_documents (
        task_id     INTEGER NOT NULL,
        document_id INTEGER NOT NULL,
        PRIMARY KEY (task_id, document_id),
        FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    // -- Config table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    // -- Metadata table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Schema migrations applied after initial DDL.
///
/// Each migration is a `(name, sql)` pair. Migrations are tracked in the
/// `metadata` table under the key `migration:<name>` so they run at most once.
pub const MIGRATIONS: &[(&str, &str)] = &[
    // Future migrations go here, e.g.:
    // ("001_add_foo_column", "ALTER TABLE tasks ADD COLUMN foo TEXT DEFAULT ''"),
];
