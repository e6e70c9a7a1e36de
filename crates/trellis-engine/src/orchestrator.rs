//! The transition orchestrator.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info};

use trellis_core::cancel::CancelToken;
use trellis_core::enums::{EpicStatus, FeatureStatus, TaskStatus};
use trellis_core::epic::Epic;
use trellis_core::feature::Feature;
use trellis_core::graph::DependencyGraph;
use trellis_core::task::Task;
use trellis_core::validation::validate_task_with_statuses;
use trellis_core::workflow::{InvalidTransition, OrchestratorAction, WorkflowConfig};

use trellis_storage::error::{Result, StoreError};
use trellis_storage::traits::{EpicUpdates, FeatureUpdates, NewTaskHistory, Store, StoreTx, TaskUpdates};

/// Caller-supplied context for a status change.
///
/// `force` bypasses workflow validation for this one mutation and is recorded
/// on the history row. A `rejection_reason` on a transition out of review
/// produces a rejection note in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub agent: Option<String>,
    pub notes: Option<String>,
    pub force: bool,
    pub rejection_reason: Option<String>,
    pub document_path: Option<String>,
    pub blocked_reason: Option<String>,
}

impl StatusChange {
    /// A plain, non-forced change attributed to `agent`.
    pub fn by(agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            ..Self::default()
        }
    }

    /// A forced change attributed to `agent`.
    pub fn forced_by(agent: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            force: true,
            ..Self::default()
        }
    }
}

/// Composes the workflow state machine, repositories, and progress
/// propagation. All mutations run inside a single store transaction.
pub struct Orchestrator<S: Store> {
    store: S,
    workflow: WorkflowConfig,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(store: S, workflow: WorkflowConfig) -> Self {
        Self { store, workflow }
    }

    /// Uses the built-in default workflow.
    pub fn with_default_workflow(store: S) -> Self {
        Self::new(store, WorkflowConfig::default())
    }

    /// The underlying store, for reads and non-status operations.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active workflow configuration.
    pub fn workflow(&self) -> &WorkflowConfig {
        &self.workflow
    }

    // -- Task creation -------------------------------------------------------

    /// Creates a task at the workflow's start status, validates its
    /// dependencies against the sibling graph, appends the creation history
    /// row, and refreshes the parent feature's progress, all in one
    /// transaction.
    pub fn create_task(&self, task: &Task, cancel: &CancelToken) -> Result<Task> {
        let mut task = task.clone();
        task.status = TaskStatus::from(self.workflow.initial_status());
        let statuses = self.workflow.status_names();
        validate_task_with_statuses(&task, &statuses)?;

        let mut created: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let row = tx.create_task(&task)?;
            tx.update_feature_progress(row.feature_id, &self.workflow)?;
            created = Some(row);
            Ok(())
        })?;
        created.ok_or_else(|| StoreError::Internal("task creation yielded no row".into()))
    }

    /// Applies a partial update through the store; depends_on changes are
    /// validated against the sibling dependency graph inside the
    /// transaction. Status does not belong here; use
    /// [`update_status`](Self::update_status).
    pub fn update_task(
        &self,
        task_ref: &str,
        updates: &TaskUpdates,
        cancel: &CancelToken,
    ) -> Result<Task> {
        let mut updated: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let task = tx.resolve_task(task_ref)?;
            updated = Some(tx.update_task(task.id, updates)?);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("task update yielded no row".into()))
    }

    // -- Status transitions --------------------------------------------------

    /// Changes a task's status, returning the updated task.
    pub fn update_status(
        &self,
        task_ref: &str,
        new_status: &TaskStatus,
        change: &StatusChange,
        cancel: &CancelToken,
    ) -> Result<Task> {
        self.update_status_with_action(task_ref, new_status, change, cancel)
            .map(|(task, _)| task)
    }

    /// Changes a task's status and returns the orchestrator action declared
    /// by the target status, if any.
    ///
    /// Unless `change.force` is set the transition is validated against the
    /// workflow. Entering a start status stamps `started_at`; entering a
    /// complete status stamps `completed_at` (cleared again on leaving);
    /// entering `blocked` records `blocked_at` and the reason. The history
    /// row, any rejection note, and feature/epic progress propagation commit
    /// atomically with the status itself. The action is rendered after the
    /// commit; the status change does not depend on it.
    pub fn update_status_with_action(
        &self,
        task_ref: &str,
        new_status: &TaskStatus,
        change: &StatusChange,
        cancel: &CancelToken,
    ) -> Result<(Task, Option<OrchestratorAction>)> {
        let mut updated: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let task = tx.resolve_task(task_ref)?;
            if !change.force {
                self.workflow
                    .check_transition(task.status.as_str(), new_status.as_str())?;
            }
            let row = self.transition_on_tx(tx, &task, new_status, change)?;
            self.propagate_on_tx(tx, row.feature_id)?;
            updated = Some(row);
            Ok(())
        })?;

        let task =
            updated.ok_or_else(|| StoreError::Internal("transition yielded no row".into()))?;
        info!(task = %task.key, status = %new_status, forced = change.force, "task status changed");

        let action = self
            .workflow
            .action_for(new_status.as_str())
            .and_then(|spec| spec.render(&task.key));
        if let Some(ref action) = action {
            debug!(task = %task.key, kind = %action.action, "emitting orchestrator action");
        }
        Ok((task, action))
    }

    /// Blocks a task with a reason.
    pub fn block_task(
        &self,
        task_ref: &str,
        reason: &str,
        agent: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task> {
        let change = StatusChange {
            agent: agent.map(str::to_string),
            blocked_reason: Some(reason.to_string()),
            ..Default::default()
        };
        self.update_status(task_ref, &TaskStatus::Blocked, &change, cancel)
    }

    /// Unblocks a task, back to `in_progress` when work had started and
    /// `todo` otherwise. Unblocking a task that is not blocked reports
    /// an invalid transition rather than flipping state twice.
    pub fn unblock_task(
        &self,
        task_ref: &str,
        agent: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task> {
        let mut updated: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let task = tx.resolve_task(task_ref)?;
            let target = if task.started_at.is_some() {
                TaskStatus::InProgress
            } else {
                TaskStatus::Todo
            };
            if task.status != TaskStatus::Blocked {
                return Err(StoreError::InvalidTransition(InvalidTransition {
                    from: task.status.as_str().to_string(),
                    to: target.as_str().to_string(),
                    allowed: self
                        .workflow
                        .allowed_transitions(task.status.as_str())
                        .to_vec(),
                }));
            }
            self.workflow
                .check_transition(task.status.as_str(), target.as_str())?;
            let change = StatusChange {
                agent: agent.map(str::to_string),
                ..Default::default()
            };
            let row = self.transition_on_tx(tx, &task, &target, &change)?;
            self.propagate_on_tx(tx, row.feature_id)?;
            updated = Some(row);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("unblock yielded no row".into()))
    }

    /// Reopens a completed task back to `in_progress`, clearing
    /// `completed_at`. The backward transition is sanctioned by the
    /// operation itself and recorded with `forced = false`.
    pub fn reopen_task(
        &self,
        task_ref: &str,
        agent: Option<&str>,
        notes: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task> {
        let mut updated: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let task = tx.resolve_task(task_ref)?;
            updated = Some(self.reopen_on_tx(tx, &task, agent, notes)?);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("reopen yielded no row".into()))
    }

    /// Reopens a task and blocks its transitive dependents.
    ///
    /// Every task whose depends_on chain reaches the reopened task is set to
    /// `blocked` with a reason naming the reopened task, each with its own
    /// history row; archived and already-blocked dependents are left alone.
    /// A visited set guards the recursion against revisiting.
    pub fn reopen_task_with_auto_block(
        &self,
        task_ref: &str,
        agent: Option<&str>,
        notes: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task> {
        let mut updated: Option<Task> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let task = tx.resolve_task(task_ref)?;
            let reopened = self.reopen_on_tx(tx, &task, agent, notes)?;

            let siblings = tx.tasks_in_feature(task.feature_id)?;
            let graph = DependencyGraph::from_edges(
                siblings
                    .iter()
                    .map(|t| (t.key.clone(), t.depends_on.clone())),
            );
            let reason = format!("Prerequisite task {} was reopened", task.key);

            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(task.key.clone());
            let mut queue: Vec<String> = vec![task.key.clone()];
            while let Some(current) = queue.pop() {
                for dependent_key in graph.dependents(&current) {
                    if !visited.insert(dependent_key.clone()) {
                        continue;
                    }
                    queue.push(dependent_key.clone());

                    let Some(dependent) = siblings.iter().find(|t| t.key == dependent_key)
                    else {
                        continue;
                    };
                    if matches!(
                        dependent.status,
                        TaskStatus::Blocked | TaskStatus::Archived
                    ) {
                        continue;
                    }
                    let change = StatusChange {
                        agent: agent.map(str::to_string),
                        blocked_reason: Some(reason.clone()),
                        ..Default::default()
                    };
                    self.transition_on_tx(tx, dependent, &TaskStatus::Blocked, &change)?;
                    debug!(task = %dependent.key, prerequisite = %task.key, "auto-blocked dependent");
                }
            }

            self.propagate_on_tx(tx, task.feature_id)?;
            updated = Some(reopened);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("reopen yielded no row".into()))
    }

    // -- Feature / epic status -----------------------------------------------

    /// Manual feature status update; applies even when status_override is
    /// set (the override only fences automatic propagation).
    pub fn update_feature_status(
        &self,
        feature_ref: &str,
        status: &FeatureStatus,
        cancel: &CancelToken,
    ) -> Result<Feature> {
        let mut updated: Option<Feature> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let feature = tx.resolve_feature(feature_ref)?;
            updated = Some(tx.update_feature(
                feature.id,
                &FeatureUpdates {
                    status: Some(status.clone()),
                    ..Default::default()
                },
            )?);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("feature update yielded no row".into()))
    }

    /// Manual epic status update.
    pub fn update_epic_status(
        &self,
        epic_ref: &str,
        status: &EpicStatus,
        cancel: &CancelToken,
    ) -> Result<Epic> {
        let mut updated: Option<Epic> = None;
        self.store.run_in_transaction(cancel, &mut |tx| {
            let epic = tx.resolve_epic(epic_ref)?;
            updated = Some(tx.update_epic(
                epic.id,
                &EpicUpdates {
                    status: Some(status.clone()),
                    ..Default::default()
                },
            )?);
            Ok(())
        })?;
        updated.ok_or_else(|| StoreError::Internal("epic update yielded no row".into()))
    }

    /// Force-cascade: all features of the epic to `feature_status` and all
    /// their tasks to `task_status`, two UPDATEs in one transaction.
    pub fn cascade_epic_status(
        &self,
        epic_ref: &str,
        feature_status: &FeatureStatus,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.store.run_in_transaction(cancel, &mut |tx| {
            let epic = tx.resolve_epic(epic_ref)?;
            tx.cascade_epic_features(epic.id, feature_status)?;
            tx.cascade_epic_tasks(epic.id, task_status)?;
            info!(epic = %epic.key, "force-cascaded epic status");
            Ok(())
        })
    }

    /// Force-cascade: all tasks of the feature to `task_status`.
    pub fn cascade_feature_status(
        &self,
        feature_ref: &str,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.store.run_in_transaction(cancel, &mut |tx| {
            let feature = tx.resolve_feature(feature_ref)?;
            tx.cascade_feature_tasks(feature.id, task_status)?;
            info!(feature = %feature.key, "force-cascaded feature status");
            Ok(())
        })
    }

    // -- Internals -----------------------------------------------------------

    /// Reopen body shared by both reopen entry points.
    fn reopen_on_tx(
        &self,
        tx: &dyn StoreTx,
        task: &Task,
        agent: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Task> {
        let change = StatusChange {
            agent: agent.map(str::to_string),
            notes: notes.map(str::to_string),
            ..Default::default()
        };
        let row = self.transition_on_tx(tx, task, &TaskStatus::InProgress, &change)?;
        self.propagate_on_tx(tx, row.feature_id)?;
        Ok(row)
    }

    /// Writes the status row, stamps lifecycle timestamps, appends the
    /// history row, and creates a rejection note when the transition is a
    /// rejection. Runs entirely on the caller's transaction.
    fn transition_on_tx(
        &self,
        tx: &dyn StoreTx,
        task: &Task,
        new_status: &TaskStatus,
        change: &StatusChange,
    ) -> Result<Task> {
        let old = &task.status;
        let now = Utc::now();

        let mut updates = TaskUpdates {
            status: Some(new_status.clone()),
            ..Default::default()
        };
        if self.workflow.is_start(new_status.as_str()) && task.started_at.is_none() {
            updates.started_at = Some(Some(now));
        }
        if self.workflow.is_complete(new_status.as_str()) {
            updates.completed_at = Some(Some(now));
            if change.agent.is_some() {
                updates.completed_by = Some(change.agent.clone());
            }
        } else if self.workflow.is_complete(old.as_str()) {
            updates.completed_at = Some(None);
        }
        if *new_status == TaskStatus::Blocked {
            updates.blocked_at = Some(Some(now));
            updates.blocked_reason =
                Some(change.blocked_reason.clone().or_else(|| change.notes.clone()));
        } else if *old == TaskStatus::Blocked {
            updates.blocked_at = Some(None);
            updates.blocked_reason = Some(None);
        }

        let updated = tx.update_task(task.id, &updates)?;

        let history = tx.append_history(&NewTaskHistory {
            task_id: task.id,
            old_status: Some(old.clone()),
            new_status: new_status.clone(),
            agent: change.agent.clone(),
            notes: change.notes.clone(),
            rejection_reason: change.rejection_reason.clone(),
            forced: change.force,
        })?;

        if let Some(ref reason) = change.rejection_reason {
            if *old == TaskStatus::ReadyForReview && !self.workflow.is_complete(new_status.as_str())
            {
                tx.create_rejection_note(
                    task.id,
                    history.id,
                    old.as_str(),
                    new_status.as_str(),
                    reason,
                    change.agent.as_deref(),
                    change.document_path.as_deref(),
                )?;
            }
        }

        Ok(updated)
    }

    /// Recomputes the parent feature's cached progress (completing it at
    /// 100% unless overridden) and re-derives the epic status from its
    /// feature breakdown.
    fn propagate_on_tx(&self, tx: &dyn StoreTx, feature_id: i64) -> Result<()> {
        let feature = tx.update_feature_progress(feature_id, &self.workflow)?;

        let features = tx.features_in_epic(feature.epic_id)?;
        let derived = derive_epic_status(&features);
        let epic = tx.get_epic(feature.epic_id)?;
        if epic.status != derived {
            tx.update_epic(
                epic.id,
                &EpicUpdates {
                    status: Some(derived),
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }
}

/// Derives an epic's status from its feature set: completed when every
/// feature is done, in progress once any feature has moved or made progress,
/// planning otherwise.
fn derive_epic_status(features: &[Feature]) -> EpicStatus {
    if features.is_empty() {
        return EpicStatus::Planning;
    }
    if features.iter().all(|f| f.status.is_done()) {
        return EpicStatus::Completed;
    }
    let any_movement = features.iter().any(|f| {
        f.progress_pct > 0.0
            || matches!(
                f.status,
                FeatureStatus::InProgress | FeatureStatus::Completed | FeatureStatus::Archived
            )
    });
    if any_movement {
        EpicStatus::InProgress
    } else {
        EpicStatus::Planning
    }
}
