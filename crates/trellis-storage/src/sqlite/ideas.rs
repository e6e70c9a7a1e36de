//! Idea backlog operations for [`SqliteStore`].

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use trellis_core::enums::{ConvertedType, IdeaStatus, Priority};
use trellis_core::idea::Idea;
use trellis_core::validation::validate_idea;

use crate::error::{Result, StoreError};
use crate::sqlite::store::{
    SqliteStore, decode_string_list, encode_string_list, format_datetime, map_constraint_err,
    parse_datetime,
};
use crate::traits::IdeaUpdates;

/// All idea columns in a deterministic order for SELECT queries.
pub(crate) const IDEA_COLUMNS: &str = "id, key, title, description, created_date, priority, position, notes, \
     related_docs, dependencies, status, converted_to_type, converted_to_key, converted_at";

/// Deserialises a row into an [`Idea`]. Column order MUST match
/// [`IDEA_COLUMNS`].
pub(crate) fn scan_idea(row: &Row<'_>) -> rusqlite::Result<Idea> {
    let created_date_str: String = row.get("created_date")?;
    let converted_at_str: Option<String> = row.get("converted_at")?;
    let related_docs_str: String = row.get("related_docs")?;
    let dependencies_str: String = row.get("dependencies")?;
    Ok(Idea {
        id: row.get("id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        created_date: parse_datetime(&created_date_str),
        priority: Priority::from(row.get::<_, String>("priority")?.as_str()),
        position: row.get("position")?,
        notes: row.get("notes")?,
        related_docs: decode_string_list(&related_docs_str),
        dependencies: decode_string_list(&dependencies_str),
        status: IdeaStatus::from(row.get::<_, String>("status")?),
        converted_to_type: row
            .get::<_, Option<String>>("converted_to_type")?
            .as_deref()
            .and_then(ConvertedType::parse),
        converted_to_key: row.get("converted_to_key")?,
        converted_at: converted_at_str.as_deref().map(parse_datetime),
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Validates and inserts an idea, returning it with its row id.
pub(crate) fn insert_idea_on_conn(conn: &Connection, idea: &Idea) -> Result<Idea> {
    validate_idea(idea)?;

    let mut idea = idea.clone();
    conn.execute(
        "INSERT INTO ideas (key, title, description, created_date, priority, position,
                            notes, related_docs, dependencies, status,
                            converted_to_type, converted_to_key, converted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            idea.key,
            idea.title,
            idea.description,
            format_datetime(&idea.created_date),
            idea.priority.as_str(),
            idea.position,
            idea.notes,
            encode_string_list(&idea.related_docs),
            encode_string_list(&idea.dependencies),
            idea.status.as_str(),
            idea.converted_to_type.map(|t| t.as_str().to_string()),
            idea.converted_to_key,
            idea.converted_at.as_ref().map(format_datetime),
        ],
    )
    .map_err(|e| map_constraint_err(e, "idea", &idea.key))?;

    idea.id = conn.last_insert_rowid();
    Ok(idea)
}

/// Retrieves a single idea by row id.
pub(crate) fn get_idea_on_conn(conn: &Connection, id: i64) -> Result<Idea> {
    let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_idea)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::not_found("idea", id.to_string())
            }
            other => StoreError::Query(other),
        })
}

// ---------------------------------------------------------------------------
// SqliteStore idea methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub(crate) fn get_idea_impl(&self, id: i64) -> Result<Idea> {
        let conn = self.acquire()?;
        get_idea_on_conn(&conn, id)
    }

    pub(crate) fn get_idea_by_key_impl(&self, key: &str) -> Result<Idea> {
        let conn = self.acquire()?;
        let sql = format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE key = ?1");
        conn.query_row(&sql, params![key], scan_idea)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("idea", key),
                other => StoreError::Query(other),
            })
    }

    pub(crate) fn list_ideas_impl(&self, status: Option<&IdeaStatus>) -> Result<Vec<Idea>> {
        let conn = self.acquire()?;
        let mut ideas = Vec::new();
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {IDEA_COLUMNS} FROM ideas WHERE status = ?1
                     ORDER BY position, created_date, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status.as_str()], scan_idea)?;
                for row in rows {
                    ideas.push(row?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {IDEA_COLUMNS} FROM ideas ORDER BY position, created_date, id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], scan_idea)?;
                for row in rows {
                    ideas.push(row?);
                }
            }
        }
        Ok(ideas)
    }

    pub(crate) fn update_idea_impl(&self, id: i64, updates: &IdeaUpdates) -> Result<Idea> {
        let conn = self.acquire()?;

        let mut set_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref title) = updates.title {
            set_clauses.push("title = ?".into());
            param_values.push(Box::new(title.clone()));
        }
        if let Some(ref description) = updates.description {
            set_clauses.push("description = ?".into());
            param_values.push(Box::new(description.clone()));
        }
        if let Some(priority) = updates.priority {
            set_clauses.push("priority = ?".into());
            param_values.push(Box::new(priority.as_str().to_string()));
        }
        if let Some(position) = updates.position {
            set_clauses.push("position = ?".into());
            param_values.push(Box::new(position));
        }
        if let Some(ref notes) = updates.notes {
            set_clauses.push("notes = ?".into());
            param_values.push(Box::new(notes.clone()));
        }
        if let Some(ref docs) = updates.related_docs {
            set_clauses.push("related_docs = ?".into());
            param_values.push(Box::new(encode_string_list(docs)));
        }
        if let Some(ref deps) = updates.dependencies {
            set_clauses.push("dependencies = ?".into());
            param_values.push(Box::new(encode_string_list(deps)));
        }
        if let Some(ref status) = updates.status {
            set_clauses.push("status = ?".into());
            param_values.push(Box::new(status.as_str().to_string()));
        }

        if !set_clauses.is_empty() {
            let sql = format!("UPDATE ideas SET {} WHERE id = ?", set_clauses.join(", "));
            param_values.push(Box::new(id));
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                param_values.iter().map(|p| p.as_ref()).collect();
            let affected = conn.execute(&sql, param_refs.as_slice())?;
            if affected == 0 {
                return Err(StoreError::not_found("idea", id.to_string()));
            }
        }

        get_idea_on_conn(&conn, id)
    }

    pub(crate) fn delete_idea_impl(&self, id: i64) -> Result<()> {
        let conn = self.acquire()?;
        let affected = conn.execute("DELETE FROM ideas WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StoreError::not_found("idea", id.to_string()));
        }
        Ok(())
    }

    /// Marks the idea converted. A second conversion is a conflict.
    pub(crate) fn convert_idea_impl(
        &self,
        id: i64,
        to_type: ConvertedType,
        to_key: &str,
    ) -> Result<Idea> {
        let conn = self.acquire()?;
        let idea = get_idea_on_conn(&conn, id)?;
        if idea.status == IdeaStatus::Converted {
            return Err(StoreError::conflict("idea", format!("{} already converted", idea.key)));
        }

        conn.execute(
            "UPDATE ideas SET status = 'converted', converted_to_type = ?1,
                    converted_to_key = ?2, converted_at = ?3
             WHERE id = ?4",
            params![
                to_type.as_str(),
                to_key,
                format_datetime(&Utc::now()),
                id,
            ],
        )?;
        get_idea_on_conn(&conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::cancel::CancelToken;

    use crate::traits::Store;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_list_and_get() {
        let store = test_store();
        let cancel = CancelToken::new();
        let idea = store
            .create_idea(&Idea::new("IDEA-1", "Dark mode"), &cancel)
            .unwrap();
        assert!(idea.id > 0);

        let got = store.get_idea_by_key("IDEA-1").unwrap();
        assert_eq!(got.title, "Dark mode");
        assert_eq!(got.status, IdeaStatus::New);

        let listed = store.list_ideas(Some(&IdeaStatus::New)).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn duplicate_key_is_conflict() {
        let store = test_store();
        let cancel = CancelToken::new();
        store
            .create_idea(&Idea::new("IDEA-1", "One"), &cancel)
            .unwrap();
        let err = store
            .create_idea(&Idea::new("IDEA-1", "Two"), &cancel)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn convert_records_target_and_is_terminal() {
        let store = test_store();
        let cancel = CancelToken::new();
        let idea = store
            .create_idea(&Idea::new("IDEA-1", "Split billing"), &cancel)
            .unwrap();

        let converted = store
            .convert_idea(idea.id, ConvertedType::Epic, "E09", &cancel)
            .unwrap();
        assert_eq!(converted.status, IdeaStatus::Converted);
        assert_eq!(converted.converted_to_type, Some(ConvertedType::Epic));
        assert_eq!(converted.converted_to_key.as_deref(), Some("E09"));
        assert!(converted.converted_at.is_some());

        let err = store
            .convert_idea(idea.id, ConvertedType::Task, "T-E01-F01-001", &cancel)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn update_applies_partial_fields() {
        let store = test_store();
        let cancel = CancelToken::new();
        let idea = store
            .create_idea(&Idea::new("IDEA-1", "Original"), &cancel)
            .unwrap();

        let updated = store
            .update_idea(
                idea.id,
                &IdeaUpdates {
                    title: Some("Refined".into()),
                    status: Some(IdeaStatus::Exploring),
                    dependencies: Some(vec!["IDEA-0".into()]),
                    ..Default::default()
                },
                &cancel,
            )
            .unwrap();
        assert_eq!(updated.title, "Refined");
        assert_eq!(updated.status, IdeaStatus::Exploring);
        assert_eq!(updated.dependencies, vec!["IDEA-0".to_string()]);
    }
}
