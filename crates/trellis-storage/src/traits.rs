//! Store and StoreTx traits -- the public API for work-item persistence.
//!
//! Consumers depend on these traits rather than on concrete implementations
//! so that alternative backends (mocks, proxies, etc.) can be substituted.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use trellis_core::cancel::CancelToken;
use trellis_core::document::{Document, DocumentParent};
use trellis_core::enums::{
    AgentType, BusinessValue, ConvertedType, EpicStatus, FeatureStatus, IdeaStatus, NoteType,
    Priority, RelationshipType, TaskStatus, VerificationStatus,
};
use trellis_core::epic::Epic;
use trellis_core::feature::Feature;
use trellis_core::history::{HistoryFilter, TaskHistory};
use trellis_core::idea::Idea;
use trellis_core::note::{NoteSearch, RejectionEntry, TaskNote};
use trellis_core::progress::EpicProgressMode;
use trellis_core::relationship::TaskRelationship;
use trellis_core::task::{CompletionMetadata, Task, TaskCriterion};
use trellis_core::workflow::WorkflowConfig;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Update structs
// ---------------------------------------------------------------------------
// Only `Some` fields are applied; `None` fields are left unchanged. For
// nullable columns the inner Option is the new value, so `Some(None)` clears.

/// Typed partial-update struct for epics.
#[derive(Debug, Clone, Default)]
pub struct EpicUpdates {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<EpicStatus>,
    pub priority: Option<Priority>,
    pub business_value: Option<Option<BusinessValue>>,
    pub slug: Option<Option<String>>,
}

/// Typed partial-update struct for features.
#[derive(Debug, Clone, Default)]
pub struct FeatureUpdates {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<FeatureStatus>,
    pub status_override: Option<bool>,
    pub progress_pct: Option<f64>,
    /// Outer `Some` triggers sibling resequencing; the inner value is the
    /// requested 1-based order, `None` to unorder.
    pub execution_order: Option<Option<i32>>,
    pub slug: Option<Option<String>>,
}

/// Typed partial-update struct for tasks.
///
/// Status changes through this struct do not append history; the transition
/// orchestrator is the only component that mutates task status.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdates {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub agent_type: Option<AgentType>,
    pub priority: Option<i32>,
    /// Validated against the dependency graph of the other tasks in the
    /// feature before being applied.
    pub depends_on: Option<Vec<String>>,
    pub assigned_agent: Option<Option<String>>,
    pub blocked_reason: Option<Option<String>>,
    /// Outer `Some` triggers sibling resequencing.
    pub execution_order: Option<Option<i32>>,
    pub completed_by: Option<Option<String>>,
    pub completion_notes: Option<Option<String>>,
    pub files_changed: Option<Vec<String>>,
    pub tests_passed: Option<Option<bool>>,
    pub verification_status: Option<VerificationStatus>,
    pub time_spent_minutes: Option<Option<i64>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub blocked_at: Option<Option<DateTime<Utc>>>,
}

/// Typed partial-update struct for ideas.
#[derive(Debug, Clone, Default)]
pub struct IdeaUpdates {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub position: Option<i32>,
    pub notes: Option<Option<String>>,
    pub related_docs: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
    pub status: Option<IdeaStatus>,
}

/// Fields appended as one history row. Id and timestamp are assigned on
/// insert.
#[derive(Debug, Clone)]
pub struct NewTaskHistory {
    pub task_id: i64,
    pub old_status: Option<TaskStatus>,
    pub new_status: TaskStatus,
    pub agent: Option<String>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub forced: bool,
}

// ---------------------------------------------------------------------------
// View / helper types
// ---------------------------------------------------------------------------

/// `status -> row count` breakdown.
pub type StatusBreakdown = BTreeMap<String, i64>;

/// Rejection totals per task: `(count, most recent rejection time)`.
#[derive(Debug, Clone, Default)]
pub struct RejectionCounts {
    pub counts: HashMap<i64, i64>,
    pub last_rejected_at: HashMap<i64, DateTime<Utc>>,
}

/// Aggregate statistics about the task database.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total_epics: i64,
    pub total_features: i64,
    pub total_tasks: i64,
    /// Breakdown of tasks by status: `(status, count)`.
    pub tasks_by_status: Vec<(String, i64)>,
    /// Breakdown of tasks by agent type: `(agent_type, count)`.
    pub tasks_by_agent_type: Vec<(String, i64)>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Primary storage interface. Mutating operations accept a [`CancelToken`];
/// a token signalled before commit rolls the transaction back and reports
/// `Cancelled`. Cancellation after commit is a no-op.
pub trait Store: Send + Sync {
    // -- Epics ---------------------------------------------------------------

    /// Validates, slugs, and inserts an epic, returning it with its row id.
    fn create_epic(&self, epic: &Epic, cancel: &CancelToken) -> Result<Epic>;

    /// Idempotent creation keyed on the epic key. Returns `(epic, created)`.
    fn create_epic_if_not_exists(&self, epic: &Epic, cancel: &CancelToken) -> Result<(Epic, bool)>;

    fn get_epic(&self, id: i64) -> Result<Epic>;

    /// Resolves an exact, numeric, or slug-qualified key.
    fn get_epic_by_key(&self, key: &str) -> Result<Epic>;

    /// Returns `None` (not an error) when no row matches, to serve collision
    /// checks.
    fn get_epic_by_file_path(&self, path: &str) -> Result<Option<Epic>>;

    fn list_epics(&self, status: Option<&EpicStatus>) -> Result<Vec<Epic>>;

    fn update_epic(&self, id: i64, updates: &EpicUpdates, cancel: &CancelToken) -> Result<Epic>;

    /// Changes the public key; fails with `Conflict` if taken.
    fn update_epic_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Epic>;

    /// Sets or clears the backing file path; fails with `Conflict` on
    /// duplicates.
    fn update_epic_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Epic>;

    /// Deletes the epic; features and tasks cascade.
    fn delete_epic(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    /// Computes epic progress from current feature rollups.
    fn calculate_epic_progress(&self, id: i64, mode: EpicProgressMode) -> Result<f64>;

    /// `feature status -> count` for the epic.
    fn epic_feature_breakdown(&self, id: i64) -> Result<StatusBreakdown>;

    /// Force-cascade: features to `feature_status` and all their tasks to
    /// `task_status`, two UPDATEs in one transaction.
    fn cascade_epic_status(
        &self,
        id: i64,
        feature_status: &FeatureStatus,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()>;

    // -- Features ------------------------------------------------------------

    fn create_feature(&self, feature: &Feature, cancel: &CancelToken) -> Result<Feature>;

    fn create_feature_if_not_exists(
        &self,
        feature: &Feature,
        cancel: &CancelToken,
    ) -> Result<(Feature, bool)>;

    fn get_feature(&self, id: i64) -> Result<Feature>;

    fn get_feature_by_key(&self, key: &str) -> Result<Feature>;

    fn get_feature_by_file_path(&self, path: &str) -> Result<Option<Feature>>;

    /// Ordered by execution_order (nulls last), then created_at.
    fn list_features(
        &self,
        epic_id: Option<i64>,
        status: Option<&FeatureStatus>,
    ) -> Result<Vec<Feature>>;

    /// Applies updates; an execution_order change resequences all siblings in
    /// the same transaction.
    fn update_feature(
        &self,
        id: i64,
        updates: &FeatureUpdates,
        cancel: &CancelToken,
    ) -> Result<Feature>;

    fn update_feature_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Feature>;

    fn update_feature_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Feature>;

    fn delete_feature(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    /// Computes feature progress from the current task breakdown without
    /// writing it.
    fn calculate_feature_progress(&self, id: i64, workflow: &WorkflowConfig) -> Result<f64>;

    /// Writes the cached progress; at 100.0 sets status to completed unless
    /// status_override is set, and never touches status below 100.
    fn update_feature_progress(
        &self,
        id: i64,
        workflow: &WorkflowConfig,
        cancel: &CancelToken,
    ) -> Result<Feature>;

    /// `task status -> count` for the feature.
    fn feature_task_breakdown(&self, id: i64) -> Result<StatusBreakdown>;

    fn set_status_override(&self, id: i64, flag: bool, cancel: &CancelToken) -> Result<Feature>;

    /// Applies the status only when status_override is unset; returns whether
    /// it was applied.
    fn update_status_if_not_overridden(
        &self,
        id: i64,
        status: &FeatureStatus,
        cancel: &CancelToken,
    ) -> Result<bool>;

    /// Force-cascade: all tasks of the feature to `task_status`.
    fn cascade_feature_status(
        &self,
        id: i64,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()>;

    // -- Tasks ---------------------------------------------------------------

    /// Validates (including depends_on against the feature's dependency
    /// graph), inserts, and appends the creation history row.
    fn create_task(&self, task: &Task, cancel: &CancelToken) -> Result<Task>;

    fn create_task_if_not_exists(&self, task: &Task, cancel: &CancelToken)
    -> Result<(Task, bool)>;

    fn get_task(&self, id: i64) -> Result<Task>;

    fn get_task_by_key(&self, key: &str) -> Result<Task>;

    fn get_task_by_file_path(&self, path: &str) -> Result<Option<Task>>;

    fn list_tasks(
        &self,
        feature_id: Option<i64>,
        status: Option<&TaskStatus>,
    ) -> Result<Vec<Task>>;

    fn update_task(&self, id: i64, updates: &TaskUpdates, cancel: &CancelToken) -> Result<Task>;

    fn update_task_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Task>;

    fn update_task_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task>;

    fn delete_task(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    /// Rejection count and last rejection time per task id.
    fn rejection_counts(&self, task_ids: &[i64]) -> Result<RejectionCounts>;

    /// Tasks whose files_changed list contains the pattern.
    fn find_tasks_by_file_changed(&self, pattern: &str) -> Result<Vec<Task>>;

    /// Completed tasks not yet verified.
    fn unverified_tasks(&self) -> Result<Vec<Task>>;

    /// Writes the completion payload onto the task addressed by key.
    fn update_completion_metadata(
        &self,
        key: &str,
        meta: &CompletionMetadata,
        cancel: &CancelToken,
    ) -> Result<Task>;

    // -- History -------------------------------------------------------------

    /// Most recent first.
    fn history_for_task(&self, task_id: i64) -> Result<Vec<TaskHistory>>;

    fn recent_history(&self, limit: i64) -> Result<Vec<TaskHistory>>;

    fn history_with_filters(&self, filter: &HistoryFilter) -> Result<Vec<TaskHistory>>;

    /// Chronological ascending, for timeline display.
    fn history_by_task_key(&self, key: &str) -> Result<Vec<TaskHistory>>;

    /// Only rows carrying a rejection_reason, most recent first.
    fn rejection_history_rows(&self, task_id: i64) -> Result<Vec<TaskHistory>>;

    // -- Notes ---------------------------------------------------------------

    fn create_note(
        &self,
        task_id: i64,
        note_type: NoteType,
        content: &str,
        created_by: Option<&str>,
        metadata: Option<serde_json::Value>,
        cancel: &CancelToken,
    ) -> Result<TaskNote>;

    /// Builds the rejection metadata payload and inserts the note. The
    /// transactional overload lives on [`StoreTx`].
    #[allow(clippy::too_many_arguments)]
    fn create_rejection_note(
        &self,
        task_id: i64,
        history_id: i64,
        from_status: &str,
        to_status: &str,
        reason: &str,
        rejected_by: Option<&str>,
        document_path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<TaskNote>;

    /// Rejection notes newest-first with parsed metadata.
    fn rejection_history(&self, task_id: i64) -> Result<Vec<RejectionEntry>>;

    /// Substring search across note content with optional filters.
    fn search_notes(&self, search: &NoteSearch) -> Result<Vec<TaskNote>>;

    // -- Relationships -------------------------------------------------------

    /// Inserts a typed edge. Blocking kinds run cycle detection over the
    /// unified edge set inside the same transaction.
    fn create_relationship(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
        cancel: &CancelToken,
    ) -> Result<TaskRelationship>;

    fn outgoing_relationships(
        &self,
        task_id: i64,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<TaskRelationship>>;

    fn incoming_relationships(
        &self,
        task_id: i64,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<TaskRelationship>>;

    fn delete_relationship(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    fn delete_relationship_by_triple(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
        cancel: &CancelToken,
    ) -> Result<()>;

    // -- Documents -----------------------------------------------------------

    /// Idempotent on `(title, file_path)`.
    fn create_or_get_document(
        &self,
        title: &str,
        file_path: &str,
        cancel: &CancelToken,
    ) -> Result<Document>;

    /// INSERT-OR-IGNORE semantics; linking twice leaves one row.
    fn link_document(
        &self,
        parent: DocumentParent,
        document_id: i64,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Idempotent unlink.
    fn unlink_document(
        &self,
        parent: DocumentParent,
        document_id: i64,
        cancel: &CancelToken,
    ) -> Result<()>;

    fn documents_for(&self, parent: DocumentParent) -> Result<Vec<Document>>;

    // -- Ideas ---------------------------------------------------------------

    fn create_idea(&self, idea: &Idea, cancel: &CancelToken) -> Result<Idea>;

    fn get_idea(&self, id: i64) -> Result<Idea>;

    fn get_idea_by_key(&self, key: &str) -> Result<Idea>;

    fn list_ideas(&self, status: Option<&IdeaStatus>) -> Result<Vec<Idea>>;

    fn update_idea(&self, id: i64, updates: &IdeaUpdates, cancel: &CancelToken) -> Result<Idea>;

    fn delete_idea(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    /// Marks the idea converted, recording what it became. Converting twice
    /// is a conflict.
    fn convert_idea(
        &self,
        id: i64,
        to_type: ConvertedType,
        to_key: &str,
        cancel: &CancelToken,
    ) -> Result<Idea>;

    // -- Acceptance criteria -------------------------------------------------

    fn add_criterion(
        &self,
        task_id: i64,
        criterion: &str,
        cancel: &CancelToken,
    ) -> Result<TaskCriterion>;

    /// Ordered by position.
    fn criteria_for_task(&self, task_id: i64) -> Result<Vec<TaskCriterion>>;

    fn set_criterion_met(&self, id: i64, is_met: bool, cancel: &CancelToken)
    -> Result<TaskCriterion>;

    fn delete_criterion(&self, id: i64, cancel: &CancelToken) -> Result<()>;

    // -- Statistics ----------------------------------------------------------

    fn statistics(&self) -> Result<Statistics>;

    // -- Transactions --------------------------------------------------------

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok` and the token is not cancelled, the
    /// transaction is committed. A cancelled token or an `Err` rolls it back.
    fn run_in_transaction(
        &self,
        cancel: &CancelToken,
        f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// StoreTx trait
// ---------------------------------------------------------------------------

/// Subset of [`Store`] operations available inside a transaction.
///
/// All operations share a single database connection and are committed or
/// rolled back atomically.
pub trait StoreTx {
    // -- Lookups -------------------------------------------------------------

    fn get_epic(&self, id: i64) -> Result<Epic>;
    fn get_feature(&self, id: i64) -> Result<Feature>;
    fn get_task(&self, id: i64) -> Result<Task>;

    fn resolve_epic(&self, key: &str) -> Result<Epic>;
    fn resolve_feature(&self, key: &str) -> Result<Feature>;
    fn resolve_task(&self, key: &str) -> Result<Task>;

    fn features_in_epic(&self, epic_id: i64) -> Result<Vec<Feature>>;
    fn tasks_in_feature(&self, feature_id: i64) -> Result<Vec<Task>>;

    // -- Writes --------------------------------------------------------------

    fn create_epic(&self, epic: &Epic) -> Result<Epic>;
    fn create_feature(&self, feature: &Feature) -> Result<Feature>;
    fn create_task(&self, task: &Task) -> Result<Task>;

    fn update_epic(&self, id: i64, updates: &EpicUpdates) -> Result<Epic>;
    fn update_feature(&self, id: i64, updates: &FeatureUpdates) -> Result<Feature>;
    fn update_task(&self, id: i64, updates: &TaskUpdates) -> Result<Task>;

    // -- History and notes ---------------------------------------------------

    fn append_history(&self, row: &NewTaskHistory) -> Result<TaskHistory>;

    fn create_note(
        &self,
        task_id: i64,
        note_type: NoteType,
        content: &str,
        created_by: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TaskNote>;

    #[allow(clippy::too_many_arguments)]
    fn create_rejection_note(
        &self,
        task_id: i64,
        history_id: i64,
        from_status: &str,
        to_status: &str,
        reason: &str,
        rejected_by: Option<&str>,
        document_path: Option<&str>,
    ) -> Result<TaskNote>;

    // -- Progress and breakdowns ---------------------------------------------

    fn feature_task_breakdown(&self, feature_id: i64) -> Result<StatusBreakdown>;

    /// Writes the cached progress and applies the completion rule, honoring
    /// status_override.
    fn update_feature_progress(
        &self,
        feature_id: i64,
        workflow: &WorkflowConfig,
    ) -> Result<Feature>;

    // -- Relationships -------------------------------------------------------

    fn create_relationship(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
    ) -> Result<TaskRelationship>;

    // -- Cascades ------------------------------------------------------------

    fn cascade_feature_tasks(&self, feature_id: i64, status: &TaskStatus) -> Result<()>;
    fn cascade_epic_features(&self, epic_id: i64, status: &FeatureStatus) -> Result<()>;
    fn cascade_epic_tasks(&self, epic_id: i64, status: &TaskStatus) -> Result<()>;
}
