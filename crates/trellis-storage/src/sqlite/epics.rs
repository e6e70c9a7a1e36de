//! Epic CRUD operations for [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::{BusinessValue, EpicStatus, FeatureStatus, Priority, TaskStatus};
use trellis_core::epic::Epic;
use trellis_core::keys::is_valid_epic_key;
use trellis_core::progress::{EpicProgressMode, FeatureRollup, epic_progress};
use trellis_core::slug::slugify;
use trellis_core::validation::{ValidationError, validate_epic};

use crate::error::{Result, StoreError};
use crate::sqlite::store::{SqliteStore, format_datetime, map_constraint_err, parse_datetime};
use crate::traits::{EpicUpdates, StatusBreakdown};

/// All epic columns in a deterministic order for SELECT queries.
pub(crate) const EPIC_COLUMNS: &str = "id, key, title, description, status, priority, \
     business_value, slug, file_path, created_at, updated_at";

/// Deserialises a row into an [`Epic`]. Column order MUST match
/// [`EPIC_COLUMNS`].
pub(crate) fn scan_epic(row: &Row<'_>) -> rusqlite::Result<Epic> {
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    Ok(Epic {
        id: row.get("id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: EpicStatus::from(row.get::<_, String>("status")?),
        priority: Priority::from(row.get::<_, String>("priority")?.as_str()),
        business_value: row
            .get::<_, Option<String>>("business_value")?
            .map(|v| BusinessValue::from(v.as_str())),
        slug: row.get("slug")?,
        file_path: row.get("file_path")?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers (used by both SqliteStore and StoreTx)
// ---------------------------------------------------------------------------

/// Validates and inserts an epic, returning it populated with its row id.
pub(crate) fn insert_epic_on_conn(conn: &Connection, epic: &Epic) -> Result<Epic> {
    let mut epic = epic.clone();
    if epic.slug.is_none() {
        let slug = slugify(&epic.title);
        if !slug.is_empty() {
            epic.slug = Some(slug);
        }
    }
    validate_epic(&epic)?;

    let now = Utc::now();
    conn.execute(
        "INSERT INTO epics (key, title, description, status, priority, business_value,
                            slug, file_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            epic.key,
            epic.title,
            epic.description,
            epic.status.as_str(),
            epic.priority.as_str(),
            epic.business_value.map(|v| v.as_str().to_string()),
            epic.slug,
            epic.file_path,
            format_datetime(&now),
        ],
    )
    .map_err(|e| map_constraint_err(e, "epic", &epic.key))?;

    epic.id = conn.last_insert_rowid();
    epic.created_at = now;
    epic.updated_at = now;
    Ok(epic)
}

/// Retrieves a single epic by row id.
pub(crate) fn get_epic_on_conn(conn: &Connection, id: i64) -> Result<Epic> {
    let sql = format!("SELECT {EPIC_COLUMNS} FROM epics WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_epic)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::not_found("epic", id.to_string())
            }
            other => StoreError::Query(other),
        })
}

/// Retrieves an epic by its exact key.
pub(crate) fn get_epic_by_key_on_conn(conn: &Connection, key: &str) -> Result<Epic> {
    let sql = format!("SELECT {EPIC_COLUMNS} FROM epics WHERE key = ?1");
    conn.query_row(&sql, params![key], scan_epic)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("epic", key),
            other => StoreError::Query(other),
        })
}

/// Applies partial updates and returns the updated row.
pub(crate) fn update_epic_on_conn(
    conn: &Connection,
    id: i64,
    updates: &EpicUpdates,
) -> Result<Epic> {
    let mut set_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref title) = updates.title {
        if title.trim().is_empty() {
            return Err(ValidationError::TitleRequired.into());
        }
        set_clauses.push("title = ?".into());
        param_values.push(Box::new(title.clone()));
    }
    if let Some(ref description) = updates.description {
        set_clauses.push("description = ?".into());
        param_values.push(Box::new(description.clone()));
    }
    if let Some(ref status) = updates.status {
        set_clauses.push("status = ?".into());
        param_values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(priority) = updates.priority {
        set_clauses.push("priority = ?".into());
        param_values.push(Box::new(priority.as_str().to_string()));
    }
    if let Some(ref value) = updates.business_value {
        set_clauses.push("business_value = ?".into());
        param_values.push(Box::new(value.map(|v| v.as_str().to_string())));
    }
    if let Some(ref slug) = updates.slug {
        set_clauses.push("slug = ?".into());
        param_values.push(Box::new(slug.clone()));
    }

    if !set_clauses.is_empty() {
        set_clauses.push("updated_at = ?".into());
        param_values.push(Box::new(format_datetime(&Utc::now())));

        let sql = format!("UPDATE epics SET {} WHERE id = ?", set_clauses.join(", "));
        param_values.push(Box::new(id));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let affected = conn.execute(&sql, param_refs.as_slice())?;
        if affected == 0 {
            return Err(StoreError::not_found("epic", id.to_string()));
        }
    }

    get_epic_on_conn(conn, id)
}

/// Changes the public key; fails when the new key is taken or malformed.
pub(crate) fn update_epic_key_on_conn(conn: &Connection, id: i64, new_key: &str) -> Result<Epic> {
    if !is_valid_epic_key(new_key) {
        return Err(ValidationError::InvalidKey {
            entity: "epic",
            key: new_key.to_string(),
        }
        .into());
    }
    let affected = conn
        .execute(
            "UPDATE epics SET key = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_key, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "epic", new_key))?;
    if affected == 0 {
        return Err(StoreError::not_found("epic", id.to_string()));
    }
    get_epic_on_conn(conn, id)
}

/// Sets or clears the file path; duplicates are a conflict.
pub(crate) fn update_epic_file_path_on_conn(
    conn: &Connection,
    id: i64,
    path: Option<&str>,
) -> Result<Epic> {
    let affected = conn
        .execute(
            "UPDATE epics SET file_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![path, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "epic", path.unwrap_or("")))?;
    if affected == 0 {
        return Err(StoreError::not_found("epic", id.to_string()));
    }
    get_epic_on_conn(conn, id)
}

/// `feature status -> count` for the epic.
pub(crate) fn feature_breakdown_on_conn(
    conn: &Connection,
    epic_id: i64,
) -> Result<StatusBreakdown> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM features WHERE epic_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![epic_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut breakdown = StatusBreakdown::new();
    for row in rows {
        let (status, count) = row?;
        breakdown.insert(status, count);
    }
    Ok(breakdown)
}

/// Computes epic progress from the features' cached rollups.
pub(crate) fn calculate_epic_progress_on_conn(
    conn: &Connection,
    epic_id: i64,
    mode: EpicProgressMode,
) -> Result<f64> {
    // Verify the epic exists so a bad id is not silently 0.0.
    get_epic_on_conn(conn, epic_id)?;

    let mut stmt = conn.prepare(
        "SELECT f.status, f.progress_pct,
                (SELECT COUNT(*) FROM tasks t WHERE t.feature_id = f.id) AS task_count
         FROM features f WHERE f.epic_id = ?1",
    )?;
    let rows = stmt.query_map(params![epic_id], |row| {
        Ok(FeatureRollup {
            status: FeatureStatus::from(row.get::<_, String>(0)?),
            progress_pct: row.get(1)?,
            task_count: row.get(2)?,
        })
    })?;
    let mut rollups = Vec::new();
    for row in rows {
        rollups.push(row?);
    }
    Ok(epic_progress(&rollups, mode))
}

/// Force-cascade: features of the epic to one status.
pub(crate) fn cascade_epic_features_on_conn(
    conn: &Connection,
    epic_id: i64,
    status: &FeatureStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE features SET status = ?1, updated_at = ?2 WHERE epic_id = ?3",
        params![status.as_str(), format_datetime(&Utc::now()), epic_id],
    )?;
    Ok(())
}

/// Force-cascade: all tasks under the epic's features to one status.
pub(crate) fn cascade_epic_tasks_on_conn(
    conn: &Connection,
    epic_id: i64,
    status: &TaskStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2
         WHERE feature_id IN (SELECT id FROM features WHERE epic_id = ?3)",
        params![status.as_str(), format_datetime(&Utc::now()), epic_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore epic methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn get_epic_impl(&self, id: i64) -> Result<Epic> {
        let conn = self.acquire()?;
        get_epic_on_conn(&conn, id)
    }

    pub(crate) fn get_epic_by_file_path_impl(&self, path: &str) -> Result<Option<Epic>> {
        let conn = self.acquire()?;
        let sql = format!("SELECT {EPIC_COLUMNS} FROM epics WHERE file_path = ?1");
        match conn.query_row(&sql, params![path], scan_epic) {
            Ok(epic) => Ok(Some(epic)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Query(other)),
        }
    }

    pub(crate) fn list_epics_impl(&self, status: Option<&EpicStatus>) -> Result<Vec<Epic>> {
        let conn = self.acquire()?;
        let mut epics = Vec::new();
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {EPIC_COLUMNS} FROM epics WHERE status = ?1
                     ORDER BY created_at, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status.as_str()], scan_epic)?;
                for row in rows {
                    epics.push(row?);
                }
            }
            None => {
                let sql = format!("SELECT {EPIC_COLUMNS} FROM epics ORDER BY created_at, id");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], scan_epic)?;
                for row in rows {
                    epics.push(row?);
                }
            }
        }
        Ok(epics)
    }

    pub(crate) fn epic_feature_breakdown_impl(&self, id: i64) -> Result<StatusBreakdown> {
        let conn = self.acquire()?;
        feature_breakdown_on_conn(&conn, id)
    }

    pub(crate) fn calculate_epic_progress_impl(
        &self,
        id: i64,
        mode: EpicProgressMode,
    ) -> Result<f64> {
        let conn = self.acquire()?;
        calculate_epic_progress_on_conn(&conn, id, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;

    use crate::traits::Store;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_get_epic() {
        let store = test_store();
        let cancel = CancelToken::new();
        let epic = store
            .create_epic(
                &EpicBuilder::new("User Authentication").key("E01").build(),
                &cancel,
            )
            .unwrap();
        assert!(epic.id > 0);
        assert_eq!(epic.slug.as_deref(), Some("user-authentication"));

        let got = store.get_epic(epic.id).unwrap();
        assert_eq!(got.key, "E01");
        assert_eq!(got.title, "User Authentication");
    }

    #[test]
    fn duplicate_key_is_conflict() {
        let store = test_store();
        let cancel = CancelToken::new();
        store
            .create_epic(&EpicBuilder::new("One").key("E01").build(), &cancel)
            .unwrap();
        let err = store
            .create_epic(&EpicBuilder::new("Two").key("E01").build(), &cancel)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn invalid_key_is_validation_error() {
        let store = test_store();
        let cancel = CancelToken::new();
        let err = store
            .create_epic(&EpicBuilder::new("Bad").key("EPIC-1").build(), &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn get_missing_epic_is_not_found() {
        let store = test_store();
        let err = store.get_epic(999).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn file_path_lookup_returns_none_when_absent() {
        let store = test_store();
        let cancel = CancelToken::new();
        assert!(store.get_epic_by_file_path("docs/e01.md").unwrap().is_none());

        let epic = store
            .create_epic(
                &EpicBuilder::new("Auth").key("E01").file_path("docs/e01.md").build(),
                &cancel,
            )
            .unwrap();
        let found = store.get_epic_by_file_path("docs/e01.md").unwrap().unwrap();
        assert_eq!(found.id, epic.id);
    }

    #[test]
    fn duplicate_file_path_is_conflict() {
        let store = test_store();
        let cancel = CancelToken::new();
        store
            .create_epic(
                &EpicBuilder::new("A").key("E01").file_path("docs/a.md").build(),
                &cancel,
            )
            .unwrap();
        let err = store
            .create_epic(
                &EpicBuilder::new("B").key("E02").file_path("docs/a.md").build(),
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn update_key_and_conflict() {
        let store = test_store();
        let cancel = CancelToken::new();
        let a = store
            .create_epic(&EpicBuilder::new("A").key("E01").build(), &cancel)
            .unwrap();
        store
            .create_epic(&EpicBuilder::new("B").key("E02").build(), &cancel)
            .unwrap();

        let updated = store.update_epic_key(a.id, "E03", &cancel).unwrap();
        assert_eq!(updated.key, "E03");

        let err = store.update_epic_key(a.id, "E02", &cancel).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn clearing_file_path_frees_it() {
        let store = test_store();
        let cancel = CancelToken::new();
        let a = store
            .create_epic(
                &EpicBuilder::new("A").key("E01").file_path("docs/a.md").build(),
                &cancel,
            )
            .unwrap();
        store.update_epic_file_path(a.id, None, &cancel).unwrap();
        assert!(store.get_epic_by_file_path("docs/a.md").unwrap().is_none());

        // Path is reusable now.
        let b = store
            .create_epic(&EpicBuilder::new("B").key("E02").build(), &cancel)
            .unwrap();
        store
            .update_epic_file_path(b.id, Some("docs/a.md"), &cancel)
            .unwrap();
    }
}
