//! Task notes -- structured annotations, including rejection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::NoteType;

/// A structured note attached to a task. Append-only, deleted only with its
/// task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNote {
    pub id: i64,

    pub task_id: i64,

    pub note_type: NoteType,

    /// Non-empty after trimming.
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Structured payload; for rejection notes this is a [`RejectionMeta`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

/// Metadata payload of a rejection note, tying it to its history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionMeta {
    pub history_id: i64,
    pub from_status: String,
    pub to_status: String,
    /// Omitted when unset or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
}

impl RejectionMeta {
    /// Builds the metadata, dropping an empty document path.
    pub fn new(
        history_id: i64,
        from_status: impl Into<String>,
        to_status: impl Into<String>,
        document_path: Option<String>,
    ) -> Self {
        Self {
            history_id,
            from_status: from_status.into(),
            to_status: to_status.into(),
            document_path: document_path.filter(|p| !p.is_empty()),
        }
    }
}

/// A rejection note with its metadata parsed into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectionEntry {
    pub note_id: i64,
    pub task_id: i64,
    /// The rejection reason (the note content).
    pub reason: String,
    pub rejected_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub history_id: i64,
    pub from_status: String,
    pub to_status: String,
    pub document_path: Option<String>,
}

/// Filters for note search. Substring match on content, narrowed by the
/// optional fields; `since`/`until` are inclusive.
#[derive(Debug, Clone, Default)]
pub struct NoteSearch {
    pub query: String,
    pub note_types: Vec<NoteType>,
    pub epic_key: Option<String>,
    pub feature_key: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
