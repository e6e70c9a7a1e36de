//! Task -- the leaf work item, child of a feature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{AgentType, TaskStatus, VerificationStatus};

/// A leaf work item under a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: i64,

    /// Owning feature row id.
    pub feature_id: i64,

    /// Public key matching `T-E\d{2}-F\d{2}-\d{3}`.
    pub key: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub agent_type: AgentType,

    #[serde(default)]
    pub priority: i32,

    /// Ordered prerequisite task keys, all within the same feature. Never
    /// contains the task's own key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<i32>,

    // -- Completion metadata -------------------------------------------------
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<bool>,

    #[serde(default)]
    pub verification_status: VerificationStatus,

    /// Non-negative when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_minutes: Option<i64>,

    // -- Lifecycle timestamps ------------------------------------------------
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Builder for [`Task`].
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(feature_id: i64, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: 0,
                feature_id,
                key: String::new(),
                title: title.into(),
                description: None,
                status: TaskStatus::default(),
                agent_type: AgentType::default(),
                priority: 2,
                depends_on: Vec::new(),
                assigned_agent: None,
                file_path: None,
                blocked_reason: None,
                execution_order: None,
                completed_by: None,
                completion_notes: None,
                files_changed: Vec::new(),
                tests_passed: None,
                verification_status: VerificationStatus::default(),
                time_spent_minutes: None,
                created_at: now,
                started_at: None,
                completed_at: None,
                blocked_at: None,
                updated_at: now,
            },
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.task.key = key.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.task.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.task.agent_type = agent_type;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn depends_on(mut self, keys: Vec<String>) -> Self {
        self.task.depends_on = keys;
        self
    }

    pub fn assigned_agent(mut self, agent: impl Into<String>) -> Self {
        self.task.assigned_agent = Some(agent.into());
        self
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.task.file_path = Some(path.into());
        self
    }

    pub fn execution_order(mut self, order: i32) -> Self {
        self.task.execution_order = Some(order);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

// ---------------------------------------------------------------------------
// Completion metadata payload
// ---------------------------------------------------------------------------

/// The JSON payload recorded when a task is completed.
///
/// Encodes as `{"files_changed": [...], "tests_passed": bool,
/// "verification_status": "..."}`; null or empty payloads decode to an empty
/// `files_changed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    #[serde(default)]
    pub files_changed: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<bool>,

    #[serde(default)]
    pub verification_status: VerificationStatus,
}

impl CompletionMetadata {
    /// Encodes to the canonical JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes from a stored string; null, empty, or absent payloads decode
    /// to the default (empty `files_changed`).
    pub fn from_json(raw: Option<&str>) -> Self {
        match raw {
            None => Self::default(),
            Some(s) if s.trim().is_empty() || s.trim() == "null" => Self::default(),
            Some(s) => serde_json::from_str(s).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Acceptance criteria
// ---------------------------------------------------------------------------

/// A single acceptance criterion attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCriterion {
    pub id: i64,
    pub task_id: i64,
    pub criterion: String,
    #[serde(default)]
    pub is_met: bool,
    /// 1-based position within the task's criteria list.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}
