//! External documents linkable to epics, features, and tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external markdown document. Unique on `(title, file_path)`; links to
/// work items live in join tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,

    pub title: String,

    pub file_path: String,

    pub created_at: DateTime<Utc>,
}

/// Which entity a document link attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentParent {
    Epic(i64),
    Feature(i64),
    Task(i64),
}
