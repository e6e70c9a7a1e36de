//! SQLite-backed transactional store for the trellis task engine.
//!
//! Provides the [`Store`] and [`StoreTx`] traits and their SQLite
//! implementation ([`SqliteStore`]).

pub mod error;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience.
pub use error::StoreError;
pub use sqlite::SqliteStore;
pub use traits::{
    EpicUpdates, FeatureUpdates, IdeaUpdates, NewTaskHistory, RejectionCounts, StatusBreakdown,
    Statistics, Store, StoreTx, TaskUpdates,
};

use tracing::info;

use trellis_core::cancel::CancelToken;
use trellis_core::document::{Document, DocumentParent};
use trellis_core::enums::{
    ConvertedType, EpicStatus, FeatureStatus, IdeaStatus, NoteType, RelationshipType, TaskStatus,
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
use crate::sqlite::{documents, epics, features, ideas, notes, relationships, tasks};

impl SqliteStore {
    fn statistics_impl(&self) -> Result<Statistics> {
        let conn = self.acquire()?;
        let mut stats = Statistics {
            total_epics: conn.query_row("SELECT COUNT(*) FROM epics", [], |r| r.get(0))?,
            total_features: conn.query_row("SELECT COUNT(*) FROM features", [], |r| r.get(0))?,
            total_tasks: conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))?,
            ..Default::default()
        };

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            stats.tasks_by_status.push(row?);
        }

        let mut stmt = conn.prepare(
            "SELECT agent_type, COUNT(*) FROM tasks GROUP BY agent_type ORDER BY agent_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            stats.tasks_by_agent_type.push(row?);
        }

        Ok(stats)
    }

    fn guard_cancel(cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    // -- Epics ---------------------------------------------------------------

    fn create_epic(&self, epic: &Epic, cancel: &CancelToken) -> Result<Epic> {
        self.with_tx(cancel, |conn| epics::insert_epic_on_conn(conn, epic))
    }

    fn create_epic_if_not_exists(&self, epic: &Epic, cancel: &CancelToken) -> Result<(Epic, bool)> {
        self.with_tx(cancel, |conn| {
            match epics::get_epic_by_key_on_conn(conn, &epic.key) {
                Ok(existing) => Ok((existing, false)),
                Err(e) if e.is_not_found() => {
                    Ok((epics::insert_epic_on_conn(conn, epic)?, true))
                }
                Err(e) => Err(e),
            }
        })
    }

    fn get_epic(&self, id: i64) -> Result<Epic> {
        self.get_epic_impl(id)
    }

    fn get_epic_by_key(&self, key: &str) -> Result<Epic> {
        self.get_epic_by_key_impl(key)
    }

    fn get_epic_by_file_path(&self, path: &str) -> Result<Option<Epic>> {
        self.get_epic_by_file_path_impl(path)
    }

    fn list_epics(&self, status: Option<&EpicStatus>) -> Result<Vec<Epic>> {
        self.list_epics_impl(status)
    }

    fn update_epic(&self, id: i64, updates: &EpicUpdates, cancel: &CancelToken) -> Result<Epic> {
        self.with_tx(cancel, |conn| epics::update_epic_on_conn(conn, id, updates))
    }

    fn update_epic_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Epic> {
        self.with_tx(cancel, |conn| epics::update_epic_key_on_conn(conn, id, new_key))
    }

    fn update_epic_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Epic> {
        self.with_tx(cancel, |conn| {
            epics::update_epic_file_path_on_conn(conn, id, path)
        })
    }

    fn delete_epic(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let affected = conn.execute("DELETE FROM epics WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(StoreError::not_found("epic", id.to_string()));
            }
            Ok(())
        })
    }

    fn calculate_epic_progress(&self, id: i64, mode: EpicProgressMode) -> Result<f64> {
        self.calculate_epic_progress_impl(id, mode)
    }

    fn epic_feature_breakdown(&self, id: i64) -> Result<StatusBreakdown> {
        self.epic_feature_breakdown_impl(id)
    }

    fn cascade_epic_status(
        &self,
        id: i64,
        feature_status: &FeatureStatus,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let epic = epics::get_epic_on_conn(conn, id)?;
            epics::cascade_epic_features_on_conn(conn, id, feature_status)?;
            epics::cascade_epic_tasks_on_conn(conn, id, task_status)?;
            info!(
                epic = %epic.key,
                feature_status = %feature_status,
                task_status = %task_status,
                "force-cascaded epic status"
            );
            Ok(())
        })
    }

    // -- Features ------------------------------------------------------------

    fn create_feature(&self, feature: &Feature, cancel: &CancelToken) -> Result<Feature> {
        self.with_tx(cancel, |conn| features::insert_feature_on_conn(conn, feature))
    }

    fn create_feature_if_not_exists(
        &self,
        feature: &Feature,
        cancel: &CancelToken,
    ) -> Result<(Feature, bool)> {
        self.with_tx(cancel, |conn| {
            match features::get_feature_by_key_on_conn(conn, &feature.key) {
                Ok(existing) => Ok((existing, false)),
                Err(e) if e.is_not_found() => {
                    Ok((features::insert_feature_on_conn(conn, feature)?, true))
                }
                Err(e) => Err(e),
            }
        })
    }

    fn get_feature(&self, id: i64) -> Result<Feature> {
        self.get_feature_impl(id)
    }

    fn get_feature_by_key(&self, key: &str) -> Result<Feature> {
        self.get_feature_by_key_impl(key)
    }

    fn get_feature_by_file_path(&self, path: &str) -> Result<Option<Feature>> {
        self.get_feature_by_file_path_impl(path)
    }

    fn list_features(
        &self,
        epic_id: Option<i64>,
        status: Option<&FeatureStatus>,
    ) -> Result<Vec<Feature>> {
        self.list_features_impl(epic_id, status)
    }

    fn update_feature(
        &self,
        id: i64,
        updates: &FeatureUpdates,
        cancel: &CancelToken,
    ) -> Result<Feature> {
        self.with_tx(cancel, |conn| {
            features::update_feature_on_conn(conn, id, updates)
        })
    }

    fn update_feature_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Feature> {
        self.with_tx(cancel, |conn| {
            features::update_feature_key_on_conn(conn, id, new_key)
        })
    }

    fn update_feature_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Feature> {
        self.with_tx(cancel, |conn| {
            features::update_feature_file_path_on_conn(conn, id, path)
        })
    }

    fn delete_feature(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let affected = conn.execute("DELETE FROM features WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(StoreError::not_found("feature", id.to_string()));
            }
            Ok(())
        })
    }

    fn calculate_feature_progress(&self, id: i64, workflow: &WorkflowConfig) -> Result<f64> {
        self.calculate_feature_progress_impl(id, workflow)
    }

    fn update_feature_progress(
        &self,
        id: i64,
        workflow: &WorkflowConfig,
        cancel: &CancelToken,
    ) -> Result<Feature> {
        self.with_tx(cancel, |conn| {
            features::update_feature_progress_on_conn(conn, id, workflow)
        })
    }

    fn feature_task_breakdown(&self, id: i64) -> Result<StatusBreakdown> {
        self.feature_task_breakdown_impl(id)
    }

    fn set_status_override(&self, id: i64, flag: bool, cancel: &CancelToken) -> Result<Feature> {
        self.with_tx(cancel, |conn| {
            let affected = conn.execute(
                "UPDATE features SET status_override = ?1 WHERE id = ?2",
                rusqlite::params![flag as i32, id],
            )?;
            if affected == 0 {
                return Err(StoreError::not_found("feature", id.to_string()));
            }
            features::get_feature_on_conn(conn, id)
        })
    }

    fn update_status_if_not_overridden(
        &self,
        id: i64,
        status: &FeatureStatus,
        cancel: &CancelToken,
    ) -> Result<bool> {
        self.with_tx(cancel, |conn| {
            features::update_status_if_not_overridden_on_conn(conn, id, status)
        })
    }

    fn cascade_feature_status(
        &self,
        id: i64,
        task_status: &TaskStatus,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let feature = features::get_feature_on_conn(conn, id)?;
            features::cascade_feature_tasks_on_conn(conn, id, task_status)?;
            info!(feature = %feature.key, task_status = %task_status, "force-cascaded feature status");
            Ok(())
        })
    }

    // -- Tasks ---------------------------------------------------------------

    fn create_task(&self, task: &Task, cancel: &CancelToken) -> Result<Task> {
        self.with_tx(cancel, |conn| tasks::insert_task_on_conn(conn, task))
    }

    fn create_task_if_not_exists(
        &self,
        task: &Task,
        cancel: &CancelToken,
    ) -> Result<(Task, bool)> {
        self.with_tx(cancel, |conn| {
            match tasks::get_task_by_key_on_conn(conn, &task.key) {
                Ok(existing) => Ok((existing, false)),
                Err(e) if e.is_not_found() => Ok((tasks::insert_task_on_conn(conn, task)?, true)),
                Err(e) => Err(e),
            }
        })
    }

    fn get_task(&self, id: i64) -> Result<Task> {
        self.get_task_impl(id)
    }

    fn get_task_by_key(&self, key: &str) -> Result<Task> {
        self.get_task_by_key_impl(key)
    }

    fn get_task_by_file_path(&self, path: &str) -> Result<Option<Task>> {
        self.get_task_by_file_path_impl(path)
    }

    fn list_tasks(
        &self,
        feature_id: Option<i64>,
        status: Option<&TaskStatus>,
    ) -> Result<Vec<Task>> {
        self.list_tasks_impl(feature_id, status)
    }

    fn update_task(&self, id: i64, updates: &TaskUpdates, cancel: &CancelToken) -> Result<Task> {
        self.with_tx(cancel, |conn| tasks::update_task_on_conn(conn, id, updates))
    }

    fn update_task_key(&self, id: i64, new_key: &str, cancel: &CancelToken) -> Result<Task> {
        self.with_tx(cancel, |conn| tasks::update_task_key_on_conn(conn, id, new_key))
    }

    fn update_task_file_path(
        &self,
        id: i64,
        path: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Task> {
        self.with_tx(cancel, |conn| {
            tasks::update_task_file_path_on_conn(conn, id, path)
        })
    }

    fn delete_task(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(StoreError::not_found("task", id.to_string()));
            }
            Ok(())
        })
    }

    fn rejection_counts(&self, task_ids: &[i64]) -> Result<RejectionCounts> {
        self.rejection_counts_impl(task_ids)
    }

    fn find_tasks_by_file_changed(&self, pattern: &str) -> Result<Vec<Task>> {
        self.find_tasks_by_file_changed_impl(pattern)
    }

    fn unverified_tasks(&self) -> Result<Vec<Task>> {
        self.unverified_tasks_impl()
    }

    fn update_completion_metadata(
        &self,
        key: &str,
        meta: &CompletionMetadata,
        cancel: &CancelToken,
    ) -> Result<Task> {
        Self::guard_cancel(cancel)?;
        self.update_completion_metadata_impl(key, meta)
    }

    // -- History -------------------------------------------------------------

    fn history_for_task(&self, task_id: i64) -> Result<Vec<TaskHistory>> {
        self.history_for_task_impl(task_id)
    }

    fn recent_history(&self, limit: i64) -> Result<Vec<TaskHistory>> {
        self.recent_history_impl(limit)
    }

    fn history_with_filters(&self, filter: &HistoryFilter) -> Result<Vec<TaskHistory>> {
        self.history_with_filters_impl(filter)
    }

    fn history_by_task_key(&self, key: &str) -> Result<Vec<TaskHistory>> {
        self.history_by_task_key_impl(key)
    }

    fn rejection_history_rows(&self, task_id: i64) -> Result<Vec<TaskHistory>> {
        self.rejection_history_rows_impl(task_id)
    }

    // -- Notes ---------------------------------------------------------------

    fn create_note(
        &self,
        task_id: i64,
        note_type: NoteType,
        content: &str,
        created_by: Option<&str>,
        metadata: Option<serde_json::Value>,
        cancel: &CancelToken,
    ) -> Result<TaskNote> {
        self.with_tx(cancel, |conn| {
            notes::create_note_on_conn(conn, task_id, note_type, content, created_by, metadata)
        })
    }

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
    ) -> Result<TaskNote> {
        self.with_tx(cancel, |conn| {
            notes::create_rejection_note_on_conn(
                conn,
                task_id,
                history_id,
                from_status,
                to_status,
                reason,
                rejected_by,
                document_path,
            )
        })
    }

    fn rejection_history(&self, task_id: i64) -> Result<Vec<RejectionEntry>> {
        self.rejection_history_impl(task_id)
    }

    fn search_notes(&self, search: &NoteSearch) -> Result<Vec<TaskNote>> {
        self.search_notes_impl(search)
    }

    // -- Relationships -------------------------------------------------------

    fn create_relationship(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
        cancel: &CancelToken,
    ) -> Result<TaskRelationship> {
        self.with_tx(cancel, |conn| {
            relationships::create_relationship_on_conn(
                conn,
                from_task_id,
                to_task_id,
                relationship_type,
            )
        })
    }

    fn outgoing_relationships(
        &self,
        task_id: i64,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<TaskRelationship>> {
        self.relationships_impl(task_id, relationship_type, true)
    }

    fn incoming_relationships(
        &self,
        task_id: i64,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<TaskRelationship>> {
        self.relationships_impl(task_id, relationship_type, false)
    }

    fn delete_relationship(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.delete_relationship_impl(id)
    }

    fn delete_relationship_by_triple(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
        cancel: &CancelToken,
    ) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.delete_relationship_by_triple_impl(from_task_id, to_task_id, relationship_type)
    }

    // -- Documents -----------------------------------------------------------

    fn create_or_get_document(
        &self,
        title: &str,
        file_path: &str,
        cancel: &CancelToken,
    ) -> Result<Document> {
        self.with_tx(cancel, |conn| {
            documents::create_or_get_document_on_conn(conn, title, file_path)
        })
    }

    fn link_document(
        &self,
        parent: DocumentParent,
        document_id: i64,
        cancel: &CancelToken,
    ) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.link_document_impl(parent, document_id)
    }

    fn unlink_document(
        &self,
        parent: DocumentParent,
        document_id: i64,
        cancel: &CancelToken,
    ) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.unlink_document_impl(parent, document_id)
    }

    fn documents_for(&self, parent: DocumentParent) -> Result<Vec<Document>> {
        self.documents_for_impl(parent)
    }

    // -- Ideas ---------------------------------------------------------------

    fn create_idea(&self, idea: &Idea, cancel: &CancelToken) -> Result<Idea> {
        self.with_tx(cancel, |conn| ideas::insert_idea_on_conn(conn, idea))
    }

    fn get_idea(&self, id: i64) -> Result<Idea> {
        self.get_idea_impl(id)
    }

    fn get_idea_by_key(&self, key: &str) -> Result<Idea> {
        self.get_idea_by_key_impl(key)
    }

    fn list_ideas(&self, status: Option<&IdeaStatus>) -> Result<Vec<Idea>> {
        self.list_ideas_impl(status)
    }

    fn update_idea(&self, id: i64, updates: &IdeaUpdates, cancel: &CancelToken) -> Result<Idea> {
        Self::guard_cancel(cancel)?;
        self.update_idea_impl(id, updates)
    }

    fn delete_idea(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.delete_idea_impl(id)
    }

    fn convert_idea(
        &self,
        id: i64,
        to_type: ConvertedType,
        to_key: &str,
        cancel: &CancelToken,
    ) -> Result<Idea> {
        Self::guard_cancel(cancel)?;
        self.convert_idea_impl(id, to_type, to_key)
    }

    // -- Acceptance criteria -------------------------------------------------

    fn add_criterion(
        &self,
        task_id: i64,
        criterion: &str,
        cancel: &CancelToken,
    ) -> Result<TaskCriterion> {
        Self::guard_cancel(cancel)?;
        self.add_criterion_impl(task_id, criterion)
    }

    fn criteria_for_task(&self, task_id: i64) -> Result<Vec<TaskCriterion>> {
        self.criteria_for_task_impl(task_id)
    }

    fn set_criterion_met(
        &self,
        id: i64,
        is_met: bool,
        cancel: &CancelToken,
    ) -> Result<TaskCriterion> {
        Self::guard_cancel(cancel)?;
        self.set_criterion_met_impl(id, is_met)
    }

    fn delete_criterion(&self, id: i64, cancel: &CancelToken) -> Result<()> {
        Self::guard_cancel(cancel)?;
        self.delete_criterion_impl(id)
    }

    // -- Statistics ----------------------------------------------------------

    fn statistics(&self) -> Result<Statistics> {
        self.statistics_impl()
    }

    // -- Transactions --------------------------------------------------------

    fn run_in_transaction(
        &self,
        cancel: &CancelToken,
        f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>,
    ) -> Result<()> {
        self.run_in_transaction_impl(cancel, f)
    }
}
