//! Acceptance-criteria operations for [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::task::TaskCriterion;

use crate::error::{Result, StoreError};
use crate::sqlite::store::{SqliteStore, format_datetime, parse_datetime};
use crate::sqlite::tasks::get_task_on_conn;

/// All criterion columns in a deterministic order for SELECT queries.
pub(crate) const CRITERION_COLUMNS: &str = "id, task_id, criterion, is_met, position, created_at";

/// Deserialises a row into a [`TaskCriterion`]. Column order MUST match
/// [`CRITERION_COLUMNS`].
pub(crate) fn scan_criterion(row: &Row<'_>) -> rusqlite::Result<TaskCriterion> {
    let created_at_str: String = row.get("created_at")?;
    Ok(TaskCriterion {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        criterion: row.get("criterion")?,
        is_met: row.get::<_, i32>("is_met")? != 0,
        position: row.get("position")?,
        created_at: parse_datetime(&created_at_str),
    })
}

/// Retrieves a single criterion by row id.
fn get_criterion_on_conn(conn: &Connection, id: i64) -> Result<TaskCriterion> {
    let sql = format!("SELECT {CRITERION_COLUMNS} FROM task_criteria WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_criterion)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::not_found("criterion", id.to_string())
            }
            other => StoreError::Query(other),
        })
}

// ---------------------------------------------------------------------------
// SqliteStore criterion methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Appends a criterion at the next position for the task.
    pub(crate) fn add_criterion_impl(&self, task_id: i64, criterion: &str) -> Result<TaskCriterion> {
        if criterion.trim().is_empty() {
            return Err(StoreError::Internal("criterion text is required".into()));
        }
        let conn = self.acquire()?;
        get_task_on_conn(&conn, task_id)?;

        let next_position: i32 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM task_criteria WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO task_criteria (task_id, criterion, is_met, position, created_at)
             VALUES (?1, ?2, 0, ?3, ?4)",
            params![task_id, criterion, next_position, format_datetime(&now)],
        )?;

        Ok(TaskCriterion {
            id: conn.last_insert_rowid(),
            task_id,
            criterion: criterion.to_string(),
            is_met: false,
            position: next_position,
            created_at: now,
        })
    }

    pub(crate) fn criteria_for_task_impl(&self, task_id: i64) -> Result<Vec<TaskCriterion>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {CRITERION_COLUMNS} FROM task_criteria WHERE task_id = ?1
             ORDER BY position, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![task_id], scan_criterion)?;
        let mut criteria = Vec::new();
        for row in rows {
            criteria.push(row?);
        }
        Ok(criteria)
    }

    pub(crate) fn set_criterion_met_impl(&self, id: i64, is_met: bool) -> Result<TaskCriterion> {
        let conn = self.acquire()?;
        let affected = conn.execute(
            "UPDATE task_criteria SET is_met = ?1 WHERE id = ?2",
            params![is_met as i32, id],
        )?;
        if affected == 0 {
            return Err(StoreError::not_found("criterion", id.to_string()));
        }
        get_criterion_on_conn(&conn, id)
    }

    pub(crate) fn delete_criterion_impl(&self, id: i64) -> Result<()> {
        let conn = self.acquire()?;
        let affected = conn.execute("DELETE FROM task_criteria WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::not_found("criterion", id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;
    use trellis_core::task::TaskBuilder;

    use crate::sqlite::store::SqliteStore;
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

    #[test]
    fn criteria_are_positioned_in_order() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        let first = store
            .add_criterion(task_id, "Form validates input", &cancel)
            .unwrap();
        let second = store
            .add_criterion(task_id, "Errors are surfaced", &cancel)
            .unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);

        let listed = store.criteria_for_task(task_id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].criterion, "Form validates input");
    }

    #[test]
    fn toggle_met_flag() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        let criterion = store
            .add_criterion(task_id, "Covered by tests", &cancel)
            .unwrap();
        assert!(!criterion.is_met);

        let updated = store.set_criterion_met(criterion.id, true, &cancel).unwrap();
        assert!(updated.is_met);
    }

    #[test]
    fn criteria_cascade_with_task() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        store.add_criterion(task_id, "Anything", &cancel).unwrap();
        store.delete_task(task_id, &cancel).unwrap();
        assert!(store.criteria_for_task(task_id).unwrap().is_empty());
    }
}
