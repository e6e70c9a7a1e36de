//! Task history operations for [`SqliteStore`] -- append-only.
//!
//! History rows are never updated or deleted individually; they go away only
//! when their task is deleted. All listing queries are pure reads over the
//! log.

use rusqlite::{Connection, Row, params};

use trellis_core::enums::TaskStatus;
use trellis_core::history::{HistoryFilter, TaskHistory};

use crate::error::Result;
use crate::sqlite::store::{SqliteStore, parse_datetime};
use crate::traits::NewTaskHistory;

/// All history columns in a deterministic order for SELECT queries.
pub(crate) const HISTORY_COLUMNS: &str =
    "id, task_id, old_status, new_status, timestamp, agent, notes, rejection_reason, forced";

/// Same as [`HISTORY_COLUMNS`] but prefixed with `h.` for JOIN queries.
const HISTORY_COLUMNS_PREFIXED: &str = "h.id, h.task_id, h.old_status, h.new_status, h.timestamp, h.agent, h.notes, \
     h.rejection_reason, h.forced";

/// Deserialises a row into a [`TaskHistory`]. Column order MUST match
/// [`HISTORY_COLUMNS`].
pub(crate) fn scan_history(row: &Row<'_>) -> rusqlite::Result<TaskHistory> {
    let timestamp_str: String = row.get("timestamp")?;
    Ok(TaskHistory {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        old_status: row
            .get::<_, Option<String>>("old_status")?
            .map(TaskStatus::from),
        new_status: TaskStatus::from(row.get::<_, String>("new_status")?),
        timestamp: parse_datetime(&timestamp_str),
        agent: row.get("agent")?,
        notes: row.get("notes")?,
        rejection_reason: row.get("rejection_reason")?,
        forced: row.get::<_, i32>("forced")? != 0,
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Appends one history row and returns it with its id and timestamp.
pub(crate) fn append_history_on_conn(
    conn: &Connection,
    row: &NewTaskHistory,
) -> Result<TaskHistory> {
    let now = chrono::Utc::now();
    conn.execute(
        "INSERT INTO task_history
         (task_id, old_status, new_status, timestamp, agent, notes, rejection_reason, forced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.task_id,
            row.old_status.as_ref().map(|s| s.as_str().to_string()),
            row.new_status.as_str(),
            crate::sqlite::store::format_datetime(&now),
            row.agent,
            row.notes,
            row.rejection_reason,
            row.forced as i32,
        ],
    )?;

    Ok(TaskHistory {
        id: conn.last_insert_rowid(),
        task_id: row.task_id,
        old_status: row.old_status.clone(),
        new_status: row.new_status.clone(),
        timestamp: now,
        agent: row.agent.clone(),
        notes: row.notes.clone(),
        rejection_reason: row.rejection_reason.clone(),
        forced: row.forced,
    })
}

/// History of one task, most recent first.
pub(crate) fn history_for_task_on_conn(
    conn: &Connection,
    task_id: i64,
) -> Result<Vec<TaskHistory>> {
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM task_history WHERE task_id = ?1
         ORDER BY timestamp DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![task_id], scan_history)?;
    let mut history = Vec::new();
    for row in rows {
        history.push(row?);
    }
    Ok(history)
}

// ---------------------------------------------------------------------------
// SqliteStore history methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn history_for_task_impl(&self, task_id: i64) -> Result<Vec<TaskHistory>> {
        let conn = self.acquire()?;
        history_for_task_on_conn(&conn, task_id)
    }

    pub(crate) fn recent_history_impl(&self, limit: i64) -> Result<Vec<TaskHistory>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history
             ORDER BY timestamp DESC, id DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], scan_history)?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    pub(crate) fn history_with_filters_impl(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<TaskHistory>> {
        let conn = self.acquire()?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref agent) = filter.agent {
            where_clauses.push(format!("h.agent = ?{}", param_values.len() + 1));
            param_values.push(Box::new(agent.clone()));
        }
        if let Some(ref since) = filter.since {
            where_clauses.push(format!("h.timestamp >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(crate::sqlite::store::format_datetime(since)));
        }
        if let Some(ref epic_key) = filter.epic_key {
            where_clauses.push(format!("e.key LIKE ?{}", param_values.len() + 1));
            param_values.push(Box::new(format!("%{epic_key}%")));
        }
        if let Some(ref feature_key) = filter.feature_key {
            where_clauses.push(format!("f.key = ?{}", param_values.len() + 1));
            param_values.push(Box::new(feature_key.clone()));
        }
        if let Some(ref old_status) = filter.old_status {
            where_clauses.push(format!("h.old_status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(old_status.as_str().to_string()));
        }
        if let Some(ref new_status) = filter.new_status {
            where_clauses.push(format!("h.new_status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(new_status.as_str().to_string()));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);

        let sql = format!(
            "SELECT {HISTORY_COLUMNS_PREFIXED} FROM task_history h
             JOIN tasks t ON h.task_id = t.id
             JOIN features f ON t.feature_id = f.id
             JOIN epics e ON f.epic_id = e.id
             {where_sql}
             ORDER BY h.timestamp DESC, h.id DESC
             LIMIT {limit} OFFSET {offset}"
        );

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), scan_history)?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    /// Chronological ascending, for timeline display.
    pub(crate) fn history_by_task_key_impl(&self, key: &str) -> Result<Vec<TaskHistory>> {
        let conn = self.acquire()?;
        let task = crate::sqlite::resolver::resolve_task_on_conn(&conn, key)?;
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history WHERE task_id = ?1
             ORDER BY timestamp ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![task.id], scan_history)?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    pub(crate) fn rejection_history_rows_impl(&self, task_id: i64) -> Result<Vec<TaskHistory>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history
             WHERE task_id = ?1 AND rejection_reason IS NOT NULL
             ORDER BY timestamp DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![task_id], scan_history)?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;
    use trellis_core::task::TaskBuilder;

    use crate::traits::Store;

    fn store_with_task() -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let epic = store
            .create_epic(&EpicBuilder::new("Epic").key("E01").build(), &cancel)
            .unwrap();
        let feature = store
            .create_feature(
                &FeatureBuilder::new(epic.id, "Feature").key("E01-F01").build(),
                &cancel,
            )
            .unwrap();
        let task = store
            .create_task(
                &TaskBuilder::new(feature.id, "Task").key("T-E01-F01-001").build(),
                &cancel,
            )
            .unwrap();
        (store, task.id)
    }

    fn append(store: &SqliteStore, row: &NewTaskHistory) -> TaskHistory {
        let conn = store.acquire().unwrap();
        append_history_on_conn(&conn, row).unwrap()
    }

    #[test]
    fn chain_is_chronological() {
        let (store, task_id) = store_with_task();
        append(
            &store,
            &NewTaskHistory {
                task_id,
                old_status: Some(TaskStatus::Todo),
                new_status: TaskStatus::InProgress,
                agent: Some("dev".into()),
                notes: None,
                rejection_reason: None,
                forced: false,
            },
        );
        append(
            &store,
            &NewTaskHistory {
                task_id,
                old_status: Some(TaskStatus::InProgress),
                new_status: TaskStatus::Completed,
                agent: Some("dev".into()),
                notes: None,
                rejection_reason: None,
                forced: false,
            },
        );

        // Ascending timeline: each row's old_status is the previous new_status.
        let timeline = store.history_by_task_key("T-E01-F01-001").unwrap();
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].old_status, None);
        for pair in timeline.windows(2) {
            assert_eq!(pair[1].old_status.as_ref(), Some(&pair[0].new_status));
        }

        // Descending listing for display.
        let recent = store.history_for_task(task_id).unwrap();
        assert_eq!(recent[0].new_status, TaskStatus::Completed);
    }

    #[test]
    fn filters_narrow_results() {
        let (store, task_id) = store_with_task();
        append(
            &store,
            &NewTaskHistory {
                task_id,
                old_status: Some(TaskStatus::Todo),
                new_status: TaskStatus::InProgress,
                agent: Some("alice".into()),
                notes: None,
                rejection_reason: None,
                forced: false,
            },
        );
        append(
            &store,
            &NewTaskHistory {
                task_id,
                old_status: Some(TaskStatus::InProgress),
                new_status: TaskStatus::Blocked,
                agent: Some("bob".into()),
                notes: None,
                rejection_reason: None,
                forced: false,
            },
        );

        let filter = HistoryFilter {
            agent: Some("alice".into()),
            ..Default::default()
        };
        let rows = store.history_with_filters(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].new_status, TaskStatus::InProgress);

        let filter = HistoryFilter {
            epic_key: Some("E01".into()),
            new_status: Some(TaskStatus::Blocked),
            ..Default::default()
        };
        let rows = store.history_with_filters(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agent.as_deref(), Some("bob"));
    }

    #[test]
    fn rejection_rows_only() {
        let (store, task_id) = store_with_task();
        append(
            &store,
            &NewTaskHistory {
                task_id,
                old_status: Some(TaskStatus::ReadyForReview),
                new_status: TaskStatus::InProgress,
                agent: Some("reviewer".into()),
                notes: None,
                rejection_reason: Some("missing tests".into()),
                forced: false,
            },
        );

        let rows = store.rejection_history_rows(task_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rejection_reason.as_deref(), Some("missing tests"));

        let counts = store.rejection_counts(&[task_id]).unwrap();
        assert_eq!(counts.counts.get(&task_id), Some(&1));
        assert!(counts.last_rejected_at.contains_key(&task_id));
    }

    #[test]
    fn recent_history_limit() {
        let (store, task_id) = store_with_task();
        for _ in 0..5 {
            append(
                &store,
                &NewTaskHistory {
                    task_id,
                    old_status: Some(TaskStatus::Todo),
                    new_status: TaskStatus::Todo,
                    agent: None,
                    notes: None,
                    rejection_reason: None,
                    forced: true,
                },
            );
        }
        let rows = store.recent_history(3).unwrap();
        assert_eq!(rows.len(), 3);
    }
}
