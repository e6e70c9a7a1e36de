//! Feature CRUD, progress, and resequencing operations for [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::{FeatureStatus, TaskStatus};
use trellis_core::feature::Feature;
use trellis_core::keys::is_valid_feature_key;
use trellis_core::order::{OrderedItem, resequence};
use trellis_core::progress::feature_progress;
use trellis_core::slug::slugify;
use trellis_core::validation::{ValidationError, validate_feature};
use trellis_core::workflow::WorkflowConfig;

use crate::error::{Result, StoreError};
use crate::sqlite::epics::get_epic_on_conn;
use crate::sqlite::store::{SqliteStore, format_datetime, map_constraint_err, parse_datetime};
use crate::traits::{FeatureUpdates, StatusBreakdown};

/// All feature columns in a deterministic order for SELECT queries.
pub(crate) const FEATURE_COLUMNS: &str = "id, epic_id, key, title, description, status, status_override, progress_pct, \
     execution_order, slug, file_path, created_at, updated_at";

/// Deserialises a row into a [`Feature`]. Column order MUST match
/// [`FEATURE_COLUMNS`].
pub(crate) fn scan_feature(row: &Row<'_>) -> rusqlite::Result<Feature> {
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    Ok(Feature {
        id: row.get("id")?,
        epic_id: row.get("epic_id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: FeatureStatus::from(row.get::<_, String>("status")?),
        status_override: row.get::<_, i32>("status_override")? != 0,
        progress_pct: row.get("progress_pct")?,
        execution_order: row.get("execution_order")?,
        slug: row.get("slug")?,
        file_path: row.get("file_path")?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Validates and inserts a feature, returning it populated with its row id.
pub(crate) fn insert_feature_on_conn(conn: &Connection, feature: &Feature) -> Result<Feature> {
    let mut feature = feature.clone();
    if feature.slug.is_none() {
        let slug = slugify(&feature.title);
        if !slug.is_empty() {
            feature.slug = Some(slug);
        }
    }
    validate_feature(&feature)?;

    // Surface a missing parent as not-found rather than an FK failure.
    get_epic_on_conn(conn, feature.epic_id)?;

    let now = Utc::now();
    conn.execute(
        "INSERT INTO features (epic_id, key, title, description, status, status_override,
                               progress_pct, execution_order, slug, file_path,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            feature.epic_id,
            feature.key,
            feature.title,
            feature.description,
            feature.status.as_str(),
            feature.status_override as i32,
            feature.progress_pct,
            feature.execution_order,
            feature.slug,
            feature.file_path,
            format_datetime(&now),
        ],
    )
    .map_err(|e| map_constraint_err(e, "feature", &feature.key))?;

    feature.id = conn.last_insert_rowid();
    feature.created_at = now;
    feature.updated_at = now;
    Ok(feature)
}

/// Retrieves a single feature by row id.
pub(crate) fn get_feature_on_conn(conn: &Connection, id: i64) -> Result<Feature> {
    let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_feature)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::not_found("feature", id.to_string())
            }
            other => StoreError::Query(other),
        })
}

/// Retrieves a feature by its exact key.
pub(crate) fn get_feature_by_key_on_conn(conn: &Connection, key: &str) -> Result<Feature> {
    let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE key = ?1");
    conn.query_row(&sql, params![key], scan_feature)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("feature", key),
            other => StoreError::Query(other),
        })
}

/// Features of an epic, execution order first (nulls last), then created_at.
pub(crate) fn features_in_epic_on_conn(conn: &Connection, epic_id: i64) -> Result<Vec<Feature>> {
    let sql = format!(
        "SELECT {FEATURE_COLUMNS} FROM features WHERE epic_id = ?1
         ORDER BY execution_order IS NULL, execution_order, created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![epic_id], scan_feature)?;
    let mut features = Vec::new();
    for row in rows {
        features.push(row?);
    }
    Ok(features)
}

/// Applies partial updates; an execution_order change resequences all
/// siblings on this connection (the caller supplies the transaction).
pub(crate) fn update_feature_on_conn(
    conn: &Connection,
    id: i64,
    updates: &FeatureUpdates,
) -> Result<Feature> {
    let existing = get_feature_on_conn(conn, id)?;

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
    if let Some(flag) = updates.status_override {
        set_clauses.push("status_override = ?".into());
        param_values.push(Box::new(flag as i32));
    }
    if let Some(pct) = updates.progress_pct {
        if !(0.0..=100.0).contains(&pct) {
            return Err(ValidationError::ProgressOutOfRange(pct).into());
        }
        set_clauses.push("progress_pct = ?".into());
        param_values.push(Box::new(pct));
    }
    if let Some(ref slug) = updates.slug {
        set_clauses.push("slug = ?".into());
        param_values.push(Box::new(slug.clone()));
    }

    if !set_clauses.is_empty() {
        set_clauses.push("updated_at = ?".into());
        param_values.push(Box::new(format_datetime(&Utc::now())));

        let sql = format!("UPDATE features SET {} WHERE id = ?", set_clauses.join(", "));
        param_values.push(Box::new(id));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, param_refs.as_slice())?;
    }

    if let Some(target) = updates.execution_order {
        if let Some(order) = target {
            if order < 1 {
                return Err(ValidationError::InvalidExecutionOrder(order).into());
            }
        }
        resequence_features_on_conn(conn, existing.epic_id, id, target)?;
    }

    get_feature_on_conn(conn, id)
}

/// Resequences sibling features after one item's order changed.
pub(crate) fn resequence_features_on_conn(
    conn: &Connection,
    epic_id: i64,
    changed_id: i64,
    target: Option<i32>,
) -> Result<()> {
    let siblings: Vec<OrderedItem> = features_in_epic_on_conn(conn, epic_id)?
        .into_iter()
        .map(|f| OrderedItem {
            id: f.id,
            execution_order: f.execution_order,
        })
        .collect();

    let now = format_datetime(&Utc::now());
    for item in resequence(siblings, changed_id, target) {
        conn.execute(
            "UPDATE features SET execution_order = ?1, updated_at = ?2 WHERE id = ?3",
            params![item.execution_order, now, item.id],
        )?;
    }
    Ok(())
}

/// Changes the public key; fails when the new key is taken or malformed.
pub(crate) fn update_feature_key_on_conn(
    conn: &Connection,
    id: i64,
    new_key: &str,
) -> Result<Feature> {
    if !is_valid_feature_key(new_key) {
        return Err(ValidationError::InvalidKey {
            entity: "feature",
            key: new_key.to_string(),
        }
        .into());
    }
    let affected = conn
        .execute(
            "UPDATE features SET key = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_key, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "feature", new_key))?;
    if affected == 0 {
        return Err(StoreError::not_found("feature", id.to_string()));
    }
    get_feature_on_conn(conn, id)
}

/// Sets or clears the file path; duplicates are a conflict.
pub(crate) fn update_feature_file_path_on_conn(
    conn: &Connection,
    id: i64,
    path: Option<&str>,
) -> Result<Feature> {
    let affected = conn
        .execute(
            "UPDATE features SET file_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![path, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "feature", path.unwrap_or("")))?;
    if affected == 0 {
        return Err(StoreError::not_found("feature", id.to_string()));
    }
    get_feature_on_conn(conn, id)
}

/// `task status -> count` for the feature.
pub(crate) fn task_breakdown_on_conn(
    conn: &Connection,
    feature_id: i64,
) -> Result<StatusBreakdown> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM tasks WHERE feature_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![feature_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut breakdown = StatusBreakdown::new();
    for row in rows {
        let (status, count) = row?;
        breakdown.insert(status, count);
    }
    Ok(breakdown)
}

/// Computes feature progress from the current task breakdown without writing.
pub(crate) fn calculate_feature_progress_on_conn(
    conn: &Connection,
    feature_id: i64,
    workflow: &WorkflowConfig,
) -> Result<f64> {
    get_feature_on_conn(conn, feature_id)?;
    let breakdown = task_breakdown_on_conn(conn, feature_id)?;
    Ok(feature_progress(&breakdown, workflow))
}

/// Writes the cached progress and applies the completion rule: at 100.0 the
/// status becomes completed unless status_override is set; below 100 the
/// status is never touched here.
pub(crate) fn update_feature_progress_on_conn(
    conn: &Connection,
    feature_id: i64,
    workflow: &WorkflowConfig,
) -> Result<Feature> {
    let feature = get_feature_on_conn(conn, feature_id)?;
    let breakdown = task_breakdown_on_conn(conn, feature_id)?;
    let pct = feature_progress(&breakdown, workflow);

    let now = format_datetime(&Utc::now());
    if pct >= 100.0 && !feature.status_override {
        conn.execute(
            "UPDATE features SET progress_pct = ?1, status = 'completed', updated_at = ?2
             WHERE id = ?3",
            params![pct, now, feature_id],
        )?;
    } else {
        conn.execute(
            "UPDATE features SET progress_pct = ?1, updated_at = ?2 WHERE id = ?3",
            params![pct, now, feature_id],
        )?;
    }

    get_feature_on_conn(conn, feature_id)
}

/// Applies the status only when status_override is unset.
pub(crate) fn update_status_if_not_overridden_on_conn(
    conn: &Connection,
    feature_id: i64,
    status: &FeatureStatus,
) -> Result<bool> {
    let feature = get_feature_on_conn(conn, feature_id)?;
    if feature.status_override {
        return Ok(false);
    }
    conn.execute(
        "UPDATE features SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), format_datetime(&Utc::now()), feature_id],
    )?;
    Ok(true)
}

/// Force-cascade: all tasks of the feature to one status.
pub(crate) fn cascade_feature_tasks_on_conn(
    conn: &Connection,
    feature_id: i64,
    status: &TaskStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE feature_id = ?3",
        params![status.as_str(), format_datetime(&Utc::now()), feature_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore feature methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn get_feature_impl(&self, id: i64) -> Result<Feature> {
        let conn = self.acquire()?;
        get_feature_on_conn(&conn, id)
    }

    pub(crate) fn get_feature_by_file_path_impl(&self, path: &str) -> Result<Option<Feature>> {
        let conn = self.acquire()?;
        let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE file_path = ?1");
        match conn.query_row(&sql, params![path], scan_feature) {
            Ok(feature) => Ok(Some(feature)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Query(other)),
        }
    }

    pub(crate) fn list_features_impl(
        &self,
        epic_id: Option<i64>,
        status: Option<&FeatureStatus>,
    ) -> Result<Vec<Feature>> {
        let conn = self.acquire()?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(epic_id) = epic_id {
            where_clauses.push(format!("epic_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(epic_id));
        }
        if let Some(status) = status {
            where_clauses.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str().to_string()));
        }
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {FEATURE_COLUMNS} FROM features {where_sql}
             ORDER BY execution_order IS NULL, execution_order, created_at, id"
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), scan_feature)?;
        let mut features = Vec::new();
        for row in rows {
            features.push(row?);
        }
        Ok(features)
    }

    pub(crate) fn feature_task_breakdown_impl(&self, id: i64) -> Result<StatusBreakdown> {
        let conn = self.acquire()?;
        task_breakdown_on_conn(&conn, id)
    }

    pub(crate) fn calculate_feature_progress_impl(
        &self,
        id: i64,
        workflow: &WorkflowConfig,
    ) -> Result<f64> {
        let conn = self.acquire()?;
        calculate_feature_progress_on_conn(&conn, id, workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;

    use crate::traits::Store;

    fn store_with_epic() -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let epic = store
            .create_epic(&EpicBuilder::new("Epic").key("E01").build(), &cancel)
            .unwrap();
        (store, epic.id)
    }

    fn feature(epic_id: i64, key: &str, title: &str) -> Feature {
        FeatureBuilder::new(epic_id, title).key(key).build()
    }

    #[test]
    fn create_and_get_feature() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let created = store
            .create_feature(&feature(epic_id, "E01-F01", "Login"), &cancel)
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.slug.as_deref(), Some("login"));

        let got = store.get_feature(created.id).unwrap();
        assert_eq!(got.key, "E01-F01");
        assert_eq!(got.progress_pct, 0.0);
    }

    #[test]
    fn missing_epic_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let err = store
            .create_feature(&feature(42, "E01-F01", "Login"), &cancel)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_orders_by_execution_order_nulls_last() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let mut unordered = feature(epic_id, "E01-F01", "Unordered");
        unordered.execution_order = None;
        store.create_feature(&unordered, &cancel).unwrap();
        let mut second = feature(epic_id, "E01-F02", "Second");
        second.execution_order = Some(2);
        store.create_feature(&second, &cancel).unwrap();
        let mut first = feature(epic_id, "E01-F03", "First");
        first.execution_order = Some(1);
        store.create_feature(&first, &cancel).unwrap();

        let listed = store.list_features(Some(epic_id), None).unwrap();
        let keys: Vec<&str> = listed.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["E01-F03", "E01-F02", "E01-F01"]);
    }

    #[test]
    fn execution_order_change_resequences_siblings() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let mut ids = Vec::new();
        for (i, key) in ["E01-F01", "E01-F02", "E01-F03", "E01-F04"].iter().enumerate() {
            let mut f = feature(epic_id, key, key);
            f.execution_order = Some(i as i32 + 1);
            ids.push(store.create_feature(&f, &cancel).unwrap().id);
        }

        // Move D to position 2.
        let updates = FeatureUpdates {
            execution_order: Some(Some(2)),
            ..Default::default()
        };
        store.update_feature(ids[3], &updates, &cancel).unwrap();

        let listed = store.list_features(Some(epic_id), None).unwrap();
        let pairs: Vec<(&str, Option<i32>)> = listed
            .iter()
            .map(|f| (f.key.as_str(), f.execution_order))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("E01-F01", Some(1)),
                ("E01-F04", Some(2)),
                ("E01-F02", Some(3)),
                ("E01-F03", Some(4)),
            ]
        );

        // Re-running the same move is a no-op.
        store.update_feature(ids[3], &updates, &cancel).unwrap();
        let again = store.list_features(Some(epic_id), None).unwrap();
        let pairs_again: Vec<(&str, Option<i32>)> = again
            .iter()
            .map(|f| (f.key.as_str(), f.execution_order))
            .collect();
        assert_eq!(pairs, pairs_again);
    }

    #[test]
    fn status_override_blocks_automatic_updates() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let f = store
            .create_feature(&feature(epic_id, "E01-F01", "Login"), &cancel)
            .unwrap();

        store.set_status_override(f.id, true, &cancel).unwrap();
        let applied = store
            .update_status_if_not_overridden(f.id, &FeatureStatus::Completed, &cancel)
            .unwrap();
        assert!(!applied);
        assert_eq!(store.get_feature(f.id).unwrap().status, FeatureStatus::Planning);

        store.set_status_override(f.id, false, &cancel).unwrap();
        let applied = store
            .update_status_if_not_overridden(f.id, &FeatureStatus::Completed, &cancel)
            .unwrap();
        assert!(applied);
        assert_eq!(store.get_feature(f.id).unwrap().status, FeatureStatus::Completed);
    }
}
