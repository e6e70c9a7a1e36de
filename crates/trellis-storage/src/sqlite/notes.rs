//! Task note operations for [`SqliteStore`], including rejection notes.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::NoteType;
use trellis_core::note::{NoteSearch, RejectionEntry, RejectionMeta, TaskNote};
use trellis_core::validation::validate_note;

use crate::error::{Result, StoreError};
use crate::sqlite::store::{SqliteStore, format_datetime, parse_datetime};
use crate::sqlite::tasks::get_task_on_conn;

/// All note columns in a deterministic order for SELECT queries.
pub(crate) const NOTE_COLUMNS: &str =
    "id, task_id, note_type, content, created_by, metadata, created_at";

/// Same as [`NOTE_COLUMNS`] but prefixed with `n.` for JOIN queries.
const NOTE_COLUMNS_PREFIXED: &str =
    "n.id, n.task_id, n.note_type, n.content, n.created_by, n.metadata, n.created_at";

/// Deserialises a row into a [`TaskNote`]. Column order MUST match
/// [`NOTE_COLUMNS`].
pub(crate) fn scan_note(row: &Row<'_>) -> rusqlite::Result<TaskNote> {
    let created_at_str: String = row.get("created_at")?;
    let metadata_str: Option<String> = row.get("metadata")?;
    Ok(TaskNote {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        note_type: NoteType::from(row.get::<_, String>("note_type")?),
        content: row.get("content")?,
        created_by: row.get("created_by")?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_datetime(&created_at_str),
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Validates and inserts a note, returning it with its id.
pub(crate) fn create_note_on_conn(
    conn: &Connection,
    task_id: i64,
    note_type: NoteType,
    content: &str,
    created_by: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<TaskNote> {
    validate_note(&note_type, content)?;
    get_task_on_conn(conn, task_id)?;

    let now = Utc::now();
    let metadata_str = match &metadata {
        Some(value) => Some(serde_json::to_string(value)?),
        None => None,
    };
    conn.execute(
        "INSERT INTO task_notes (task_id, note_type, content, created_by, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            task_id,
            note_type.as_str(),
            content,
            created_by,
            metadata_str,
            format_datetime(&now),
        ],
    )?;

    Ok(TaskNote {
        id: conn.last_insert_rowid(),
        task_id,
        note_type,
        content: content.to_string(),
        created_by: created_by.map(str::to_string),
        metadata,
        created_at: now,
    })
}

/// Builds the rejection metadata payload and inserts the note. This is the
/// transactional form; it participates in whatever transaction owns `conn`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_rejection_note_on_conn(
    conn: &Connection,
    task_id: i64,
    history_id: i64,
    from_status: &str,
    to_status: &str,
    reason: &str,
    rejected_by: Option<&str>,
    document_path: Option<&str>,
) -> Result<TaskNote> {
    let meta = RejectionMeta::new(
        history_id,
        from_status,
        to_status,
        document_path.map(str::to_string),
    );
    create_note_on_conn(
        conn,
        task_id,
        NoteType::Rejection,
        reason,
        rejected_by,
        Some(serde_json::to_value(&meta)?),
    )
}

// ---------------------------------------------------------------------------
// SqliteStore note methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Rejection notes newest-first with parsed metadata.
    pub(crate) fn rejection_history_impl(&self, task_id: i64) -> Result<Vec<RejectionEntry>> {
        let conn = self.acquire()?;
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM task_notes
             WHERE task_id = ?1 AND note_type = 'rejection'
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![task_id], scan_note)?;

        let mut entries = Vec::new();
        for row in rows {
            let note = row?;
            let meta: RejectionMeta = match note.metadata.clone() {
                Some(value) => serde_json::from_value(value)
                    .map_err(|e| StoreError::Internal(format!(
                        "rejection note {} has malformed metadata: {e}",
                        note.id
                    )))?,
                None => {
                    return Err(StoreError::Internal(format!(
                        "rejection note {} is missing metadata",
                        note.id
                    )));
                }
            };
            entries.push(RejectionEntry {
                note_id: note.id,
                task_id: note.task_id,
                reason: note.content,
                rejected_by: note.created_by,
                created_at: note.created_at,
                history_id: meta.history_id,
                from_status: meta.from_status,
                to_status: meta.to_status,
                document_path: meta.document_path,
            });
        }
        Ok(entries)
    }

    /// Substring search across note content with optional filters.
    pub(crate) fn search_notes_impl(&self, search: &NoteSearch) -> Result<Vec<TaskNote>> {
        let conn = self.acquire()?;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if !search.query.is_empty() {
            where_clauses.push(format!("n.content LIKE ?{}", param_values.len() + 1));
            param_values.push(Box::new(format!("%{}%", search.query)));
        }
        if !search.note_types.is_empty() {
            let start = param_values.len() + 1;
            let placeholders: Vec<String> = search
                .note_types
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", start + i))
                .collect();
            where_clauses.push(format!("n.note_type IN ({})", placeholders.join(",")));
            for note_type in &search.note_types {
                param_values.push(Box::new(note_type.as_str().to_string()));
            }
        }
        if let Some(ref epic_key) = search.epic_key {
            where_clauses.push(format!("e.key = ?{}", param_values.len() + 1));
            param_values.push(Box::new(epic_key.clone()));
        }
        if let Some(ref feature_key) = search.feature_key {
            where_clauses.push(format!("f.key = ?{}", param_values.len() + 1));
            param_values.push(Box::new(feature_key.clone()));
        }
        if let Some(ref since) = search.since {
            where_clauses.push(format!("n.created_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(format_datetime(since)));
        }
        if let Some(ref until) = search.until {
            where_clauses.push(format!("n.created_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(format_datetime(until)));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {NOTE_COLUMNS_PREFIXED} FROM task_notes n
             JOIN tasks t ON n.task_id = t.id
             JOIN features f ON t.feature_id = f.id
             JOIN epics e ON f.epic_id = e.id
             {where_sql}
             ORDER BY n.created_at DESC, n.id DESC"
        );

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), scan_note)?;
        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
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

    #[test]
    fn create_and_read_note() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        let note = store
            .create_note(
                task_id,
                NoteType::Decision,
                "Chose rusqlite over a server",
                Some("alice"),
                None,
                &cancel,
            )
            .unwrap();
        assert!(note.id > 0);
        assert_eq!(note.note_type, NoteType::Decision);

        let found = store
            .search_notes(&NoteSearch {
                query: "rusqlite".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, note.id);
    }

    #[test]
    fn blank_content_is_validation_error() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        let err = store
            .create_note(task_id, NoteType::Comment, "   ", None, None, &cancel)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn rejection_note_metadata_shape() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        let note = store
            .create_rejection_note(
                task_id,
                42,
                "ready_for_review",
                "in_progress",
                "missing edge case tests",
                Some("reviewer"),
                None,
                &cancel,
            )
            .unwrap();

        let meta = note.metadata.expect("rejection metadata");
        assert_eq!(meta["history_id"], 42);
        assert_eq!(meta["from_status"], "ready_for_review");
        assert_eq!(meta["to_status"], "in_progress");
        // document_path omitted when unset.
        assert!(meta.get("document_path").is_none());
    }

    #[test]
    fn rejection_history_is_typed_and_newest_first() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        store
            .create_rejection_note(
                task_id,
                1,
                "ready_for_review",
                "in_progress",
                "first rejection",
                Some("reviewer"),
                Some("docs/review-1.md"),
                &cancel,
            )
            .unwrap();
        store
            .create_rejection_note(
                task_id,
                2,
                "ready_for_review",
                "todo",
                "second rejection",
                Some("reviewer"),
                None,
                &cancel,
            )
            .unwrap();

        let entries = store.rejection_history(task_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reason, "second rejection");
        assert_eq!(entries[0].history_id, 2);
        assert_eq!(entries[0].document_path, None);
        assert_eq!(entries[1].history_id, 1);
        assert_eq!(entries[1].document_path.as_deref(), Some("docs/review-1.md"));
    }

    #[test]
    fn search_filters_by_type_and_parent() {
        let (store, task_id) = store_with_task();
        let cancel = CancelToken::new();
        store
            .create_note(task_id, NoteType::Testing, "covered by suite", None, None, &cancel)
            .unwrap();
        store
            .create_note(task_id, NoteType::Blocker, "waiting on infra", None, None, &cancel)
            .unwrap();

        let found = store
            .search_notes(&NoteSearch {
                note_types: vec![NoteType::Blocker],
                epic_key: Some("E01".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].note_type, NoteType::Blocker);

        let none = store
            .search_notes(&NoteSearch {
                feature_key: Some("E99-F99".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }
}
