//! Configurable workflow state machine for task statuses.
//!
//! The workflow is a status graph: each status maps to the set of statuses it
//! may transition to, an empty set marking a terminal status. Special-status
//! lists identify the `start` statuses (initial on create) and the `complete`
//! statuses (counted as done for progress). Per-status metadata carries
//! display info and an optional orchestrator action emitted when a task
//! enters that status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::EpicProgressMode;

/// The state machine refused a transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition from '{from}' to '{to}' (allowed: {})", allowed.join(", "))]
pub struct InvalidTransition {
    /// Current status.
    pub from: String,
    /// Requested status.
    pub to: String,
    /// Legal successors of `from`.
    pub allowed: Vec<String>,
}

/// The `start` / `complete` status lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecialStatuses {
    /// Initial statuses for newly created tasks.
    pub start: Vec<String>,
    /// Statuses considered done for progress calculation.
    pub complete: Vec<String>,
}

impl Default for SpecialStatuses {
    fn default() -> Self {
        Self {
            start: vec!["todo".into()],
            complete: vec!["completed".into()],
        }
    }
}

/// Per-status display and behavior metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusMetadata {
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Workflow phase the status belongs to.
    #[serde(default)]
    pub phase: String,
    /// Action emitted when a task enters this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_action: Option<OrchestratorActionSpec>,
}

/// Declared side-channel action for a status, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrchestratorActionSpec {
    /// Spawn an agent against the task entering the status.
    SpawnAgent {
        agent_type: String,
        #[serde(default)]
        skills: Vec<String>,
        /// Instruction template; `{task_id}` is replaced with the task key.
        instruction: String,
    },
    /// Explicitly no action.
    Noop,
}

/// A rendered orchestrator action, returned alongside a status change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorAction {
    /// Action kind (e.g. `spawn_agent`).
    pub action: String,
    pub agent_type: String,
    pub skills: Vec<String>,
    /// Instruction with template variables substituted.
    pub instruction: String,
}

impl OrchestratorActionSpec {
    /// Renders the action for a concrete task key. `Noop` renders to `None`.
    pub fn render(&self, task_key: &str) -> Option<OrchestratorAction> {
        match self {
            Self::SpawnAgent {
                agent_type,
                skills,
                instruction,
            } => Some(OrchestratorAction {
                action: "spawn_agent".into(),
                agent_type: agent_type.clone(),
                skills: skills.clone(),
                instruction: instruction.replace("{task_id}", task_key),
            }),
            Self::Noop => None,
        }
    }
}

/// The full workflow configuration. Read-only after load and freely shared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Status -> legal successor statuses. Empty set marks a terminal status.
    #[serde(default = "default_status_flow")]
    pub status_flow: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub special_statuses: SpecialStatuses,

    #[serde(default)]
    pub status_metadata: BTreeMap<String, StatusMetadata>,

    /// Per-status progress weights. Statuses absent from this map weigh 1.0
    /// when complete (archived included) and 0.0 otherwise.
    #[serde(default)]
    pub progress_weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub epic_progress_mode: EpicProgressMode,
}

fn default_status_flow() -> BTreeMap<String, Vec<String>> {
    let mut flow = BTreeMap::new();
    flow.insert(
        "todo".into(),
        vec!["in_progress".into(), "blocked".into()],
    );
    flow.insert(
        "in_progress".into(),
        vec!["ready_for_review".into(), "blocked".into(), "completed".into()],
    );
    flow.insert(
        "ready_for_review".into(),
        vec!["completed".into(), "in_progress".into()],
    );
    flow.insert("blocked".into(), vec!["todo".into(), "in_progress".into()]);
    flow.insert("completed".into(), Vec::new());
    flow.insert("archived".into(), Vec::new());
    flow
}

fn default_status_metadata() -> BTreeMap<String, StatusMetadata> {
    let mut meta = BTreeMap::new();
    let entries = [
        ("todo", "To Do", "planning"),
        ("in_progress", "In Progress", "execution"),
        ("ready_for_review", "Ready for Review", "review"),
        ("blocked", "Blocked", "execution"),
        ("completed", "Completed", "done"),
        ("archived", "Archived", "done"),
    ];
    for (status, label, phase) in entries {
        meta.insert(
            status.into(),
            StatusMetadata {
                label: label.into(),
                phase: phase.into(),
                orchestrator_action: None,
            },
        );
    }
    meta
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            status_flow: default_status_flow(),
            special_statuses: SpecialStatuses::default(),
            status_metadata: default_status_metadata(),
            progress_weights: BTreeMap::new(),
            epic_progress_mode: EpicProgressMode::default(),
        }
    }
}

impl WorkflowConfig {
    /// Returns `true` if `status` is a node of the status graph.
    pub fn is_known_status(&self, status: &str) -> bool {
        self.status_flow.contains_key(status)
    }

    /// All status names declared by the flow.
    pub fn status_names(&self) -> Vec<&str> {
        self.status_flow.keys().map(String::as_str).collect()
    }

    /// Legal successors of `from` (empty for terminal or unknown statuses).
    pub fn allowed_transitions(&self, from: &str) -> &[String] {
        self.status_flow.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` iff `to` is a legal successor of `from`.
    pub fn can_transition(&self, from: &str, to: &str) -> bool {
        self.allowed_transitions(from).iter().any(|s| s == to)
    }

    /// Validates a transition, reporting the legal successors on refusal.
    pub fn check_transition(&self, from: &str, to: &str) -> Result<(), InvalidTransition> {
        if self.can_transition(from, to) {
            return Ok(());
        }
        Err(InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            allowed: self.allowed_transitions(from).to_vec(),
        })
    }

    /// A status with no successors is terminal.
    pub fn is_terminal(&self, status: &str) -> bool {
        matches!(self.status_flow.get(status), Some(next) if next.is_empty())
    }

    /// Returns `true` if `status` is an initial status for new tasks.
    pub fn is_start(&self, status: &str) -> bool {
        self.special_statuses.start.iter().any(|s| s == status)
    }

    /// Returns `true` if `status` counts as done for progress.
    pub fn is_complete(&self, status: &str) -> bool {
        self.special_statuses.complete.iter().any(|s| s == status)
    }

    /// The first `start` status, used as the status of newly created tasks.
    pub fn initial_status(&self) -> &str {
        self.special_statuses
            .start
            .first()
            .map(String::as_str)
            .unwrap_or("todo")
    }

    /// Progress weight of a status. Explicit weights win; otherwise complete
    /// statuses (archived included) weigh 1.0 and everything else 0.0.
    pub fn weight_for(&self, status: &str) -> f64 {
        if let Some(weight) = self.progress_weights.get(status) {
            return *weight;
        }
        if self.is_complete(status) || status == "archived" {
            1.0
        } else {
            0.0
        }
    }

    /// The declared action for a status, if any.
    pub fn action_for(&self, status: &str) -> Option<&OrchestratorActionSpec> {
        self.status_metadata
            .get(status)?
            .orchestrator_action
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_flow_shape() {
        let wf = WorkflowConfig::default();
        assert!(wf.can_transition("todo", "in_progress"));
        assert!(wf.can_transition("in_progress", "completed"));
        assert!(wf.can_transition("ready_for_review", "in_progress"));
        assert!(!wf.can_transition("todo", "completed"));
        assert!(wf.is_terminal("completed"));
        assert!(wf.is_terminal("archived"));
        assert!(!wf.is_terminal("blocked"));
        assert_eq!(wf.initial_status(), "todo");
        assert!(wf.is_complete("completed"));
        assert!(!wf.is_complete("ready_for_review"));
    }

    #[test]
    fn check_transition_reports_allowed() {
        let wf = WorkflowConfig::default();
        let err = wf.check_transition("todo", "completed").unwrap_err();
        assert_eq!(err.from, "todo");
        assert_eq!(err.to, "completed");
        assert_eq!(err.allowed, vec!["in_progress".to_string(), "blocked".to_string()]);
    }

    #[test]
    fn weights_default_to_complete_set() {
        let wf = WorkflowConfig::default();
        assert_eq!(wf.weight_for("completed"), 1.0);
        assert_eq!(wf.weight_for("archived"), 1.0);
        assert_eq!(wf.weight_for("in_progress"), 0.0);
        assert_eq!(wf.weight_for("nonexistent"), 0.0);
    }

    #[test]
    fn explicit_weights_win() {
        let mut wf = WorkflowConfig::default();
        wf.progress_weights.insert("ready_for_review".into(), 0.75);
        assert_eq!(wf.weight_for("ready_for_review"), 0.75);
    }

    #[test]
    fn spawn_agent_action_renders_template() {
        let spec = OrchestratorActionSpec::SpawnAgent {
            agent_type: "developer".into(),
            skills: vec!["rust".into(), "sql".into()],
            instruction: "Implement {task_id} and report back".into(),
        };
        let action = spec.render("T-E01-F01-001").unwrap();
        assert_eq!(action.action, "spawn_agent");
        assert_eq!(action.agent_type, "developer");
        assert_eq!(action.instruction, "Implement T-E01-F01-001 and report back");
    }

    #[test]
    fn noop_action_renders_none() {
        assert_eq!(OrchestratorActionSpec::Noop.render("T-E01-F01-001"), None);
    }

    #[test]
    fn action_spec_serde_tagging() {
        let yaml_like = r#"{"action":"spawn_agent","agent_type":"tester","instruction":"verify {task_id}"}"#;
        let spec: OrchestratorActionSpec = serde_json::from_str(yaml_like).unwrap();
        match &spec {
            OrchestratorActionSpec::SpawnAgent { agent_type, skills, .. } => {
                assert_eq!(agent_type, "tester");
                assert!(skills.is_empty());
            }
            other => panic!("expected SpawnAgent, got {other:?}"),
        }
    }

    #[test]
    fn custom_flow_deserializes_with_defaults() {
        let json = r#"{"status_flow": {"todo": ["done"], "done": []}}"#;
        let wf: WorkflowConfig = serde_json::from_str(json).unwrap();
        assert!(wf.can_transition("todo", "done"));
        assert!(wf.is_terminal("done"));
        // Special statuses fall back to the defaults.
        assert_eq!(wf.initial_status(), "todo");
    }
}
