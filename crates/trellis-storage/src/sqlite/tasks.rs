//! Task CRUD operations for [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::{AgentType, TaskStatus, VerificationStatus};
use trellis_core::graph::DependencyGraph;
use trellis_core::keys::is_valid_task_key;
use trellis_core::order::{OrderedItem, resequence};
use trellis_core::task::{CompletionMetadata, Task};
use trellis_core::validation::{ValidationError, validate_task_structure};

use crate::error::{Result, StoreError};
use crate::sqlite::features::get_feature_on_conn;
use crate::sqlite::history::append_history_on_conn;
use crate::sqlite::store::{
    SqliteStore, decode_string_list, encode_string_list, format_datetime, map_constraint_err,
    parse_datetime,
};
use crate::traits::{NewTaskHistory, RejectionCounts, TaskUpdates};

/// All task columns in a deterministic order for SELECT queries.
pub(crate) const TASK_COLUMNS: &str = "id, feature_id, key, title, description, status, agent_type, priority, \
     depends_on, assigned_agent, file_path, blocked_reason, execution_order, \
     completed_by, completion_notes, files_changed, tests_passed, verification_status, \
     time_spent_minutes, created_at, started_at, completed_at, blocked_at, updated_at";

/// Deserialises a row into a [`Task`]. Column order MUST match
/// [`TASK_COLUMNS`].
pub(crate) fn scan_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let depends_on_str: String = row.get("depends_on")?;
    let files_changed_str: String = row.get("files_changed")?;
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    let started_at_str: Option<String> = row.get("started_at")?;
    let completed_at_str: Option<String> = row.get("completed_at")?;
    let blocked_at_str: Option<String> = row.get("blocked_at")?;
    let tests_passed_int: Option<i32> = row.get("tests_passed")?;

    Ok(Task {
        id: row.get("id")?,
        feature_id: row.get("feature_id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::from(row.get::<_, String>("status")?),
        agent_type: AgentType::from(row.get::<_, String>("agent_type")?),
        priority: row.get("priority")?,
        depends_on: decode_string_list(&depends_on_str),
        assigned_agent: row.get("assigned_agent")?,
        file_path: row.get("file_path")?,
        blocked_reason: row.get("blocked_reason")?,
        execution_order: row.get("execution_order")?,
        completed_by: row.get("completed_by")?,
        completion_notes: row.get("completion_notes")?,
        files_changed: decode_string_list(&files_changed_str),
        tests_passed: tests_passed_int.map(|v| v != 0),
        verification_status: VerificationStatus::from(
            row.get::<_, String>("verification_status")?,
        ),
        time_spent_minutes: row.get("time_spent_minutes")?,
        created_at: parse_datetime(&created_at_str),
        started_at: started_at_str.as_deref().map(parse_datetime),
        completed_at: completed_at_str.as_deref().map(parse_datetime),
        blocked_at: blocked_at_str.as_deref().map(parse_datetime),
        updated_at: parse_datetime(&updated_at_str),
    })
}

// ---------------------------------------------------------------------------
// Dependency validation
// ---------------------------------------------------------------------------

/// Validates a task's depends_on list against the graph of the *other* tasks
/// in the feature. The task under validation is excluded from the base graph
/// so its stale edges do not mask problems.
pub(crate) fn validate_depends_on_on_conn(
    conn: &Connection,
    feature_id: i64,
    task_key: &str,
    depends_on: &[String],
    exclude_task_id: Option<i64>,
) -> Result<()> {
    if depends_on.is_empty() {
        return Ok(());
    }

    let others = tasks_in_feature_on_conn(conn, feature_id)?;
    let graph = DependencyGraph::from_edges(
        others
            .iter()
            .filter(|t| Some(t.id) != exclude_task_id)
            .map(|t| (t.key.clone(), t.depends_on.clone())),
    );

    for dep in depends_on {
        graph.validate_dependency(task_key, dep)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Validates and inserts a task, appending its creation history row
/// (old_status null) on the same connection.
pub(crate) fn insert_task_on_conn(conn: &Connection, task: &Task) -> Result<Task> {
    validate_task_structure(task)?;

    // Surface a missing parent as not-found rather than an FK failure.
    get_feature_on_conn(conn, task.feature_id)?;

    validate_depends_on_on_conn(conn, task.feature_id, &task.key, &task.depends_on, None)?;

    let mut task = task.clone();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO tasks (feature_id, key, title, description, status, agent_type,
                            priority, depends_on, assigned_agent, file_path, blocked_reason,
                            execution_order, completed_by, completion_notes, files_changed,
                            tests_passed, verification_status, time_spent_minutes,
                            created_at, started_at, completed_at, blocked_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                 ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?19)",
        params![
            task.feature_id,                             // 1
            task.key,                                    // 2
            task.title,                                  // 3
            task.description,                            // 4
            task.status.as_str(),                        // 5
            task.agent_type.as_str(),                    // 6
            task.priority,                               // 7
            encode_string_list(&task.depends_on),        // 8
            task.assigned_agent,                         // 9
            task.file_path,                              // 10
            task.blocked_reason,                         // 11
            task.execution_order,                        // 12
            task.completed_by,                           // 13
            task.completion_notes,                       // 14
            encode_string_list(&task.files_changed),     // 15
            task.tests_passed.map(|v| v as i32),         // 16
            task.verification_status.as_str(),           // 17
            task.time_spent_minutes,                     // 18
            format_datetime(&now),                       // 19
            task.started_at.as_ref().map(format_datetime),   // 20
            task.completed_at.as_ref().map(format_datetime), // 21
            task.blocked_at.as_ref().map(format_datetime),   // 22
        ],
    )
    .map_err(|e| map_constraint_err(e, "task", &task.key))?;

    task.id = conn.last_insert_rowid();
    task.created_at = now;
    task.updated_at = now;

    append_history_on_conn(
        conn,
        &NewTaskHistory {
            task_id: task.id,
            old_status: None,
            new_status: task.status.clone(),
            agent: task.assigned_agent.clone(),
            notes: None,
            rejection_reason: None,
            forced: false,
        },
    )?;

    Ok(task)
}

/// Retrieves a single task by row id.
pub(crate) fn get_task_on_conn(conn: &Connection, id: i64) -> Result<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_task)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::not_found("task", id.to_string())
            }
            other => StoreError::Query(other),
        })
}

/// Retrieves a task by its exact key.
pub(crate) fn get_task_by_key_on_conn(conn: &Connection, key: &str) -> Result<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE key = ?1");
    conn.query_row(&sql, params![key], scan_task)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("task", key),
            other => StoreError::Query(other),
        })
}

/// Tasks of a feature, execution order first (nulls last), then created_at.
pub(crate) fn tasks_in_feature_on_conn(conn: &Connection, feature_id: i64) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE feature_id = ?1
         ORDER BY execution_order IS NULL, execution_order, created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![feature_id], scan_task)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

/// Applies partial updates; depends_on changes are validated against the
/// sibling dependency graph and execution_order changes resequence siblings.
///
/// Status written through this helper appends no history; status transitions
/// belong to the orchestrator, which appends the history row itself in the
/// same transaction.
pub(crate) fn update_task_on_conn(
    conn: &Connection,
    id: i64,
    updates: &TaskUpdates,
) -> Result<Task> {
    let existing = get_task_on_conn(conn, id)?;

    if let Some(ref deps) = updates.depends_on {
        validate_depends_on_on_conn(conn, existing.feature_id, &existing.key, deps, Some(id))?;
    }

    let mut set_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    macro_rules! set_field {
        ($value:expr, $col:expr) => {
            set_clauses.push(concat!($col, " = ?").to_string());
            param_values.push(Box::new($value));
        };
    }

    if let Some(ref title) = updates.title {
        if title.trim().is_empty() {
            return Err(ValidationError::TitleRequired.into());
        }
        set_field!(title.clone(), "title");
    }
    if let Some(ref description) = updates.description {
        set_field!(description.clone(), "description");
    }
    if let Some(ref status) = updates.status {
        set_field!(status.as_str().to_string(), "status");
    }
    if let Some(ref agent_type) = updates.agent_type {
        set_field!(agent_type.as_str().to_string(), "agent_type");
    }
    if let Some(priority) = updates.priority {
        set_field!(priority, "priority");
    }
    if let Some(ref deps) = updates.depends_on {
        set_field!(encode_string_list(deps), "depends_on");
    }
    if let Some(ref agent) = updates.assigned_agent {
        set_field!(agent.clone(), "assigned_agent");
    }
    if let Some(ref reason) = updates.blocked_reason {
        set_field!(reason.clone(), "blocked_reason");
    }
    if let Some(ref by) = updates.completed_by {
        set_field!(by.clone(), "completed_by");
    }
    if let Some(ref notes) = updates.completion_notes {
        set_field!(notes.clone(), "completion_notes");
    }
    if let Some(ref files) = updates.files_changed {
        set_field!(encode_string_list(files), "files_changed");
    }
    if let Some(ref passed) = updates.tests_passed {
        set_field!(passed.map(|v| v as i32), "tests_passed");
    }
    if let Some(ref verification) = updates.verification_status {
        set_field!(verification.as_str().to_string(), "verification_status");
    }
    if let Some(ref minutes) = updates.time_spent_minutes {
        if let Some(m) = minutes {
            if *m < 0 {
                return Err(ValidationError::NegativeTimeSpent.into());
            }
        }
        set_field!(*minutes, "time_spent_minutes");
    }
    if let Some(ref started) = updates.started_at {
        set_field!(started.as_ref().map(format_datetime), "started_at");
    }
    if let Some(ref completed) = updates.completed_at {
        set_field!(completed.as_ref().map(format_datetime), "completed_at");
    }
    if let Some(ref blocked) = updates.blocked_at {
        set_field!(blocked.as_ref().map(format_datetime), "blocked_at");
    }

    if !set_clauses.is_empty() {
        set_clauses.push("updated_at = ?".into());
        param_values.push(Box::new(format_datetime(&Utc::now())));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", set_clauses.join(", "));
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
        resequence_tasks_on_conn(conn, existing.feature_id, id, target)?;
    }

    get_task_on_conn(conn, id)
}

/// Resequences sibling tasks after one item's order changed.
pub(crate) fn resequence_tasks_on_conn(
    conn: &Connection,
    feature_id: i64,
    changed_id: i64,
    target: Option<i32>,
) -> Result<()> {
    let siblings: Vec<OrderedItem> = tasks_in_feature_on_conn(conn, feature_id)?
        .into_iter()
        .map(|t| OrderedItem {
            id: t.id,
            execution_order: t.execution_order,
        })
        .collect();

    let now = format_datetime(&Utc::now());
    for item in resequence(siblings, changed_id, target) {
        conn.execute(
            "UPDATE tasks SET execution_order = ?1, updated_at = ?2 WHERE id = ?3",
            params![item.execution_order, now, item.id],
        )?;
    }
    Ok(())
}

/// Changes the public key; fails when the new key is taken or malformed.
pub(crate) fn update_task_key_on_conn(conn: &Connection, id: i64, new_key: &str) -> Result<Task> {
    if !is_valid_task_key(new_key) {
        return Err(ValidationError::InvalidKey {
            entity: "task",
            key: new_key.to_string(),
        }
        .into());
    }
    let affected = conn
        .execute(
            "UPDATE tasks SET key = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_key, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "task", new_key))?;
    if affected == 0 {
        return Err(StoreError::not_found("task", id.to_string()));
    }
    get_task_on_conn(conn, id)
}

/// Sets or clears the file path; duplicates are a conflict.
pub(crate) fn update_task_file_path_on_conn(
    conn: &Connection,
    id: i64,
    path: Option<&str>,
) -> Result<Task> {
    let affected = conn
        .execute(
            "UPDATE tasks SET file_path = ?1, updated_at = ?2 WHERE id = ?3",
            params![path, format_datetime(&Utc::now()), id],
        )
        .map_err(|e| map_constraint_err(e, "task", path.unwrap_or("")))?;
    if affected == 0 {
        return Err(StoreError::not_found("task", id.to_string()));
    }
    get_task_on_conn(conn, id)
}

// ---------------------------------------------------------------------------
// SqliteStore task methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn get_task_impl(&self, id: i64) -> Result<Task> {
        let conn = self.acquire()?;
        get_task_on_conn(&conn, id)
    }

    pub(crate) fn get_task_by_file_path_impl(&self, path: &str) -> Result<Option<Task>> {
        let conn = self.acquire()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE file_path = ?1");
        match conn.query_row(&sql, params![path], scan_task) {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Query(other)),
        }
    }

    pub(crate) fn list_tasks_impl(
        &self,
        feature_id: Option<i64>,
        status: Option<&TaskStatus>,
    ) -> Result<Vec<Task>> {
        let conn = self.acquire()?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(feature_id) = feature_id {
            where_clauses.push(format!("feature_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(feature_id));
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
            "SELECT {TASK_COLUMNS} FROM tasks {where_sql}
             ORDER BY execution_order IS NULL, execution_order, created_at, id"
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), scan_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub(crate) fn rejection_counts_impl(&self, task_ids: &[i64]) -> Result<RejectionCounts> {
        let mut result = RejectionCounts::default();
        if task_ids.is_empty() {
            return Ok(result);
        }
        let conn = self.acquire()?;
        let placeholders = task_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT task_id, COUNT(*), MAX(timestamp) FROM task_history
             WHERE rejection_reason IS NOT NULL AND task_id IN ({placeholders})
             GROUP BY task_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(task_ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (task_id, count, last) = row?;
            result.counts.insert(task_id, count);
            result.last_rejected_at.insert(task_id, parse_datetime(&last));
        }
        Ok(result)
    }

    pub(crate) fn find_tasks_by_file_changed_impl(&self, pattern: &str) -> Result<Vec<Task>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE files_changed LIKE ?1
             ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![format!("%{pattern}%")], scan_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub(crate) fn unverified_tasks_impl(&self) -> Result<Vec<Task>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'completed' AND verification_status != 'verified'
             ORDER BY completed_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub(crate) fn update_completion_metadata_impl(
        &self,
        key: &str,
        meta: &CompletionMetadata,
    ) -> Result<Task> {
        let conn = self.acquire()?;
        let task = crate::sqlite::resolver::resolve_task_on_conn(&conn, key)?;
        conn.execute(
            "UPDATE tasks SET files_changed = ?1, tests_passed = ?2,
                    verification_status = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                encode_string_list(&meta.files_changed),
                meta.tests_passed.map(|v| v as i32),
                meta.verification_status.as_str(),
                format_datetime(&Utc::now()),
                task.id,
            ],
        )?;
        get_task_on_conn(&conn, task.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;
    use trellis_core::feature::FeatureBuilder;
    use trellis_core::task::TaskBuilder;

    use crate::traits::Store;

    fn store_with_feature() -> (SqliteStore, i64) {
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
        (store, feature.id)
    }

    fn task(feature_id: i64, key: &str, title: &str) -> Task {
        TaskBuilder::new(feature_id, title).key(key).build()
    }

    #[test]
    fn create_appends_creation_history() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let created = store
            .create_task(&task(feature_id, "T-E01-F01-001", "First"), &cancel)
            .unwrap();
        assert!(created.id > 0);

        let history = store.history_for_task(created.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, None);
        assert_eq!(history[0].new_status, TaskStatus::Todo);
        assert!(!history[0].forced);
    }

    #[test]
    fn self_dependency_rejected() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let mut t = task(feature_id, "T-E01-F01-001", "Selfish");
        t.depends_on = vec!["T-E01-F01-001".into()];
        let err = store.create_task(&t, &cancel).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let mut t = task(feature_id, "T-E01-F01-001", "Depends on ghost");
        t.depends_on = vec!["T-E01-F01-099".into()];
        let err = store.create_task(&t, &cancel).unwrap_err();
        assert!(matches!(err, StoreError::UnknownDependency(_)));
    }

    #[test]
    fn dependency_cycle_rejected_on_update() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let a = store
            .create_task(&task(feature_id, "T-E01-F01-001", "A"), &cancel)
            .unwrap();
        let mut b = task(feature_id, "T-E01-F01-002", "B");
        b.depends_on = vec![a.key.clone()];
        let b = store.create_task(&b, &cancel).unwrap();

        // A -> B would close the cycle A <- B.
        let updates = TaskUpdates {
            depends_on: Some(vec![b.key.clone()]),
            ..Default::default()
        };
        let err = store.update_task(a.id, &updates, &cancel).unwrap_err();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
    }

    #[test]
    fn update_depends_on_replaces_stale_edges() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let a = store
            .create_task(&task(feature_id, "T-E01-F01-001", "A"), &cancel)
            .unwrap();
        let mut b = task(feature_id, "T-E01-F01-002", "B");
        b.depends_on = vec![a.key.clone()];
        let b = store.create_task(&b, &cancel).unwrap();

        // Dropping B's dependency frees A to depend on B.
        store
            .update_task(
                b.id,
                &TaskUpdates {
                    depends_on: Some(Vec::new()),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();
        let updated = store
            .update_task(
                a.id,
                &TaskUpdates {
                    depends_on: Some(vec![b.key.clone()]),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();
        assert_eq!(updated.depends_on, vec![b.key]);
    }

    #[test]
    fn find_by_file_changed() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let t = store
            .create_task(&task(feature_id, "T-E01-F01-001", "Touch auth"), &cancel)
            .unwrap();
        store
            .update_task(
                t.id,
                &TaskUpdates {
                    files_changed: Some(vec!["src/auth/login.rs".into()]),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();

        let hits = store.find_tasks_by_file_changed("auth").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, t.id);
        assert!(store.find_tasks_by_file_changed("billing").unwrap().is_empty());
    }

    #[test]
    fn completion_metadata_roundtrip_through_store() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        store
            .create_task(&task(feature_id, "T-E01-F01-001", "Ship it"), &cancel)
            .unwrap();

        let meta = CompletionMetadata {
            files_changed: vec!["src/main.rs".into()],
            tests_passed: Some(true),
            verification_status: VerificationStatus::Verified,
        };
        let updated = store
            .update_completion_metadata("T-E01-F01-001", &meta, &cancel)
            .unwrap();
        assert_eq!(updated.files_changed, meta.files_changed);
        assert_eq!(updated.tests_passed, Some(true));
        assert_eq!(updated.verification_status, VerificationStatus::Verified);
    }

    #[test]
    fn task_resequencing_matches_feature_behavior() {
        let (store, feature_id) = store_with_feature();
        let cancel = CancelToken::new();
        let mut ids = Vec::new();
        for (i, serial) in ["001", "002", "003", "004"].iter().enumerate() {
            let mut t = task(feature_id, &format!("T-E01-F01-{serial}"), serial);
            t.execution_order = Some(i as i32 + 1);
            ids.push(store.create_task(&t, &cancel).unwrap().id);
        }

        store
            .update_task(
                ids[3],
                &TaskUpdates {
                    execution_order: Some(Some(2)),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();

        let listed = store.list_tasks(Some(feature_id), None).unwrap();
        let orders: Vec<(String, Option<i32>)> = listed
            .iter()
            .map(|t| (t.key.clone(), t.execution_order))
            .collect();
        assert_eq!(
            orders,
            vec![
                ("T-E01-F01-001".to_string(), Some(1)),
                ("T-E01-F01-004".to_string(), Some(2)),
                ("T-E01-F01-002".to_string(), Some(3)),
                ("T-E01-F01-003".to_string(), Some(4)),
            ]
        );
    }
}
