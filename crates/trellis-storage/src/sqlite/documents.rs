//! Document operations for [`SqliteStore`]: create-or-get plus link tables.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::document::{Document, DocumentParent};

use crate::error::{Result, StoreError};
use crate::sqlite::store::{SqliteStore, format_datetime, parse_datetime};

/// All document columns in a deterministic order for SELECT queries.
pub(crate) const DOCUMENT_COLUMNS: &str = "id, title, file_path, created_at";

/// Deserialises a row into a [`Document`]. Column order MUST match
/// [`DOCUMENT_COLUMNS`].
pub(crate) fn scan_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let created_at_str: String = row.get("created_at")?;
    Ok(Document {
        id: row.get("id")?,
        title: row.get("title")?,
        file_path: row.get("file_path")?,
        created_at: parse_datetime(&created_at_str),
    })
}

/// Join table and parent column for a [`DocumentParent`].
fn parent_join(parent: DocumentParent) -> (&'static str, &'static str, i64) {
    match parent {
        DocumentParent::Epic(id) => ("epic_documents", "epic_id", id),
        DocumentParent::Feature(id) => ("feature_documents", "feature_id", id),
        DocumentParent::Task(id) => ("task_documents", "task_id", id),
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Returns the existing row for `(title, file_path)` or inserts a new one.
pub(crate) fn create_or_get_document_on_conn(
    conn: &Connection,
    title: &str,
    file_path: &str,
) -> Result<Document> {
    if title.trim().is_empty() || file_path.trim().is_empty() {
        return Err(StoreError::Internal(
            "document title and file_path are required".into(),
        ));
    }

    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE title = ?1 AND file_path = ?2"
    );
    match conn.query_row(&sql, params![title, file_path], scan_document) {
        Ok(existing) => return Ok(existing),
        Err(rusqlite::Error::QueryReturnedNoRows) => {}
        Err(other) => return Err(StoreError::Query(other)),
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO documents (title, file_path, created_at) VALUES (?1, ?2, ?3)",
        params![title, file_path, format_datetime(&now)],
    )?;
    Ok(Document {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        file_path: file_path.to_string(),
        created_at: now,
    })
}

// ---------------------------------------------------------------------------
// SqliteStore document methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn link_document_impl(
        &self,
        parent: DocumentParent,
        document_id: i64,
    ) -> Result<()> {
        let conn = self.acquire()?;
        let (table, column, parent_id) = parent_join(parent);
        let sql = format!(
            "INSERT OR IGNORE INTO {table} ({column}, document_id) VALUES (?1, ?2)"
        );
        conn.execute(&sql, params![parent_id, document_id])?;
        Ok(())
    }

    pub(crate) fn unlink_document_impl(
        &self,
        parent: DocumentParent,
        document_id: i64,
    ) -> Result<()> {
        let conn = self.acquire()?;
        let (table, column, parent_id) = parent_join(parent);
        let sql = format!("DELETE FROM {table} WHERE {column} = ?1 AND document_id = ?2");
        conn.execute(&sql, params![parent_id, document_id])?;
        Ok(())
    }

    pub(crate) fn documents_for_impl(&self, parent: DocumentParent) -> Result<Vec<Document>> {
        let conn = self.acquire()?;
        let (table, column, parent_id) = parent_join(parent);
        let sql = format!(
            "SELECT d.id, d.title, d.file_path, d.created_at
             FROM documents d JOIN {table} j ON d.id = j.document_id
             WHERE j.{column} = ?1
             ORDER BY d.title, d.id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![parent_id], scan_document)?;
        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;
    use trellis_core::epic::EpicBuilder;

    use crate::traits::Store;

    fn store_with_epic() -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        let epic = store
            .create_epic(&EpicBuilder::new("Epic").key("E01").build(), &cancel)
            .unwrap();
        (store, epic.id)
    }

    #[test]
    fn create_or_get_is_idempotent() {
        let (store, _) = store_with_epic();
        let cancel = CancelToken::new();
        let a = store
            .create_or_get_document("API design", "docs/api.md", &cancel)
            .unwrap();
        let b = store
            .create_or_get_document("API design", "docs/api.md", &cancel)
            .unwrap();
        assert_eq!(a.id, b.id);

        // Same title at a different path is a new document.
        let c = store
            .create_or_get_document("API design", "docs/api-v2.md", &cancel)
            .unwrap();
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn double_link_yields_one_row() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let doc = store
            .create_or_get_document("Notes", "docs/notes.md", &cancel)
            .unwrap();

        store
            .link_document(DocumentParent::Epic(epic_id), doc.id, &cancel)
            .unwrap();
        store
            .link_document(DocumentParent::Epic(epic_id), doc.id, &cancel)
            .unwrap();

        let linked = store.documents_for(DocumentParent::Epic(epic_id)).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, doc.id);
    }

    #[test]
    fn unlink_is_idempotent() {
        let (store, epic_id) = store_with_epic();
        let cancel = CancelToken::new();
        let doc = store
            .create_or_get_document("Notes", "docs/notes.md", &cancel)
            .unwrap();
        store
            .link_document(DocumentParent::Epic(epic_id), doc.id, &cancel)
            .unwrap();

        store
            .unlink_document(DocumentParent::Epic(epic_id), doc.id, &cancel)
            .unwrap();
        store
            .unlink_document(DocumentParent::Epic(epic_id), doc.id, &cancel)
            .unwrap();
        assert!(store.documents_for(DocumentParent::Epic(epic_id)).unwrap().is_empty());
    }
}
