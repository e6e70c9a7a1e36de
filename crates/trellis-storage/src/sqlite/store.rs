//! [`SqliteStore`] -- SQLite-backed storage implementation.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::sqlite::schema;

/// SQLite-backed implementation of the [`Store`](crate::traits::Store) trait.
///
/// One connection, guarded by a mutex, serves all callers: operations take
/// the guard, run their SQL, and release it.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and brings its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Connection(format!("cannot open {}: {e}", path.display()))
        })?;
        info!(?path, "opening task database");
        Self::bootstrap(conn)
    }

    /// Opens a fresh in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("cannot open in-memory db: {e}")))?;
        debug!("opening in-memory task database");
        Self::bootstrap(conn)
    }

    /// Pragma and schema setup on the raw connection, before the mutex
    /// exists, so none of it needs locking.
    fn bootstrap(conn: Connection) -> Result<Self> {
        apply_pragmas(&conn)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Takes the shared connection guard. Used by every operation module.
    pub(crate) fn acquire(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Connection(format!("connection lock poisoned: {e}")))
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SqliteStore")
    }
}

/// WAL keeps readers unblocked during writes, foreign keys drive the delete
/// cascades, and the busy timeout lets a second opener back off instead of
/// erroring.
fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .and_then(|_| conn.pragma_update(None, "foreign_keys", true))
        .and_then(|_| conn.pragma_update(None, "busy_timeout", 5000))
        .map_err(|e| StoreError::Connection(format!("pragma setup failed: {e}")))
}

/// Creates missing tables and indexes and applies pending migrations. The
/// version marker in the `config` table makes repeat opens cheap.
fn ensure_schema(conn: &Connection) -> Result<()> {
    if let Some(version) = stored_schema_version(conn) {
        if version >= schema::CURRENT_SCHEMA_VERSION {
            debug!(version, "schema is current");
            return Ok(());
        }
    }

    for (index, ddl) in schema::SCHEMA_STATEMENTS.iter().enumerate() {
        conn.execute_batch(ddl).map_err(|e| StoreError::Migration {
            name: format!("ddl statement {index}"),
            reason: e.to_string(),
        })?;
    }

    apply_migrations(conn)?;

    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES ('schema_version', ?1)",
        [schema::CURRENT_SCHEMA_VERSION.to_string()],
    )
    .map_err(|e| StoreError::Migration {
        name: "schema_version".into(),
        reason: e.to_string(),
    })?;

    info!(
        version = schema::CURRENT_SCHEMA_VERSION,
        "initialized database schema"
    );
    Ok(())
}

/// Reads the version marker; `None` before first initialization (the config
/// table may not exist yet).
fn stored_schema_version(conn: &Connection) -> Option<i32> {
    conn.query_row(
        "SELECT value FROM config WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
}

/// Runs each named migration at most once, recording completion under
/// `migration:<name>` in the `metadata` table.
fn apply_migrations(conn: &Connection) -> Result<()> {
    for &(name, sql) in schema::MIGRATIONS {
        let marker = format!("migration:{name}");
        let done = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [&marker],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        if done.is_some() {
            continue;
        }

        conn.execute_batch(sql).map_err(|e| StoreError::Migration {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, 'applied')",
            [&marker],
        )
        .map_err(|e| StoreError::Migration {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!(name, "applied migration");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared row helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try full RFC 3339 first, then common SQLite formats.
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

/// Serialises a string list as a JSON array for a TEXT column.
pub(crate) fn encode_string_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

/// Parses a JSON array TEXT column into a string list.
pub(crate) fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Maps a constraint violation on insert/update to [`StoreError::Conflict`];
/// everything else passes through as a query error.
pub(crate) fn map_constraint_err(
    err: rusqlite::Error,
    entity: &str,
    value: &str,
) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::conflict(entity, value)
        }
        _ => StoreError::Query(err),
    }
}
