//! Task history -- the append-only transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::TaskStatus;

/// One status-transition audit row. Rows are only ever inserted; the chain of
/// `old_status == previous.new_status` is the tamper-evident log of what
/// happened to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: i64,

    pub task_id: i64,

    /// `None` only for the row recorded at task creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<TaskStatus>,

    pub new_status: TaskStatus,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    /// True when workflow validation was bypassed for this transition.
    #[serde(default)]
    pub forced: bool,
}

/// Filters for the history listing query. All fields are optional and
/// combine with AND.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub agent: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Matched against the owning epic key with LIKE semantics.
    pub epic_key: Option<String>,
    pub feature_key: Option<String>,
    pub old_status: Option<TaskStatus>,
    pub new_status: Option<TaskStatus>,
    /// Page size, defaults to 50.
    pub limit: Option<i64>,
    /// Page offset, defaults to 0.
    pub offset: Option<i64>,
}
