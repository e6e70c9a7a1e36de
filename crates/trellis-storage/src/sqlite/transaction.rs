//! Transaction wrapper for [`SqliteStore`].

use rusqlite::Connection;

use trellis_core::cancel::CancelToken;
use trellis_core::enums::{FeatureStatus, NoteType, RelationshipType, TaskStatus};
use trellis_core::epic::Epic;
use trellis_core::feature::Feature;
use trellis_core::history::TaskHistory;
use trellis_core::note::TaskNote;
use trellis_core::relationship::TaskRelationship;
use trellis_core::task::Task;
use trellis_core::workflow::WorkflowConfig;

use crate::error::{Result, StoreError};
use crate::sqlite::store::SqliteStore;
use crate::sqlite::{epics, features, history, notes, relationships, resolver, tasks};
use crate::traits::{
    EpicUpdates, FeatureUpdates, NewTaskHistory, StatusBreakdown, StoreTx, TaskUpdates,
};

/// A thin wrapper around a SQLite connection that is inside a transaction.
///
/// [`SqliteTx`] holds a reference to the connection (which already has an
/// active transaction via `BEGIN`). It implements [`StoreTx`] by delegating
/// to the same connection-level helpers used by [`SqliteStore`].
pub(crate) struct SqliteTx<'a> {
    pub(crate) conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn get_epic(&self, id: i64) -> Result<Epic> {
        epics::get_epic_on_conn(self.conn, id)
    }

    fn get_feature(&self, id: i64) -> Result<Feature> {
        features::get_feature_on_conn(self.conn, id)
    }

    fn get_task(&self, id: i64) -> Result<Task> {
        tasks::get_task_on_conn(self.conn, id)
    }

    fn resolve_epic(&self, key: &str) -> Result<Epic> {
        resolver::resolve_epic_on_conn(self.conn, key)
    }

    fn resolve_feature(&self, key: &str) -> Result<Feature> {
        resolver::resolve_feature_on_conn(self.conn, key)
    }

    fn resolve_task(&self, key: &str) -> Result<Task> {
        resolver::resolve_task_on_conn(self.conn, key)
    }

    fn features_in_epic(&self, epic_id: i64) -> Result<Vec<Feature>> {
        features::features_in_epic_on_conn(self.conn, epic_id)
    }

    fn tasks_in_feature(&self, feature_id: i64) -> Result<Vec<Task>> {
        tasks::tasks_in_feature_on_conn(self.conn, feature_id)
    }

    fn create_epic(&self, epic: &Epic) -> Result<Epic> {
        epics::insert_epic_on_conn(self.conn, epic)
    }

    fn create_feature(&self, feature: &Feature) -> Result<Feature> {
        features::insert_feature_on_conn(self.conn, feature)
    }

    fn create_task(&self, task: &Task) -> Result<Task> {
        tasks::insert_task_on_conn(self.conn, task)
    }

    fn update_epic(&self, id: i64, updates: &EpicUpdates) -> Result<Epic> {
        epics::update_epic_on_conn(self.conn, id, updates)
    }

    fn update_feature(&self, id: i64, updates: &FeatureUpdates) -> Result<Feature> {
        features::update_feature_on_conn(self.conn, id, updates)
    }

    fn update_task(&self, id: i64, updates: &TaskUpdates) -> Result<Task> {
        tasks::update_task_on_conn(self.conn, id, updates)
    }

    fn append_history(&self, row: &NewTaskHistory) -> Result<TaskHistory> {
        history::append_history_on_conn(self.conn, row)
    }

    fn create_note(
        &self,
        task_id: i64,
        note_type: NoteType,
        content: &str,
        created_by: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TaskNote> {
        notes::create_note_on_conn(self.conn, task_id, note_type, content, created_by, metadata)
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
    ) -> Result<TaskNote> {
        notes::create_rejection_note_on_conn(
            self.conn,
            task_id,
            history_id,
            from_status,
            to_status,
            reason,
            rejected_by,
            document_path,
        )
    }

    fn feature_task_breakdown(&self, feature_id: i64) -> Result<StatusBreakdown> {
        features::task_breakdown_on_conn(self.conn, feature_id)
    }

    fn update_feature_progress(
        &self,
        feature_id: i64,
        workflow: &WorkflowConfig,
    ) -> Result<Feature> {
        features::update_feature_progress_on_conn(self.conn, feature_id, workflow)
    }

    fn create_relationship(
        &self,
        from_task_id: i64,
        to_task_id: i64,
        relationship_type: &RelationshipType,
    ) -> Result<TaskRelationship> {
        relationships::create_relationship_on_conn(
            self.conn,
            from_task_id,
            to_task_id,
            relationship_type,
        )
    }

    fn cascade_feature_tasks(&self, feature_id: i64, status: &TaskStatus) -> Result<()> {
        features::cascade_feature_tasks_on_conn(self.conn, feature_id, status)
    }

    fn cascade_epic_features(&self, epic_id: i64, status: &FeatureStatus) -> Result<()> {
        epics::cascade_epic_features_on_conn(self.conn, epic_id, status)
    }

    fn cascade_epic_tasks(&self, epic_id: i64, status: &TaskStatus) -> Result<()> {
        epics::cascade_epic_tasks_on_conn(self.conn, epic_id, status)
    }
}

// ---------------------------------------------------------------------------
// SqliteStore transaction plumbing
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Runs a closure against a connection inside a transaction, committing
    /// on success. The cancel token is observed on entry and again before
    /// commit; a cancelled token rolls back and reports `Cancelled`.
    pub(crate) fn with_tx<T>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let conn = self.acquire()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Transaction(format!("failed to begin: {e}")))?;

        let result = f(&tx)?;

        if cancel.is_cancelled() {
            // Transaction is rolled back on drop.
            return Err(StoreError::Cancelled);
        }
        tx.commit()
            .map_err(|e| StoreError::Transaction(format!("failed to commit: {e}")))?;
        Ok(result)
    }

    /// Runs a caller-supplied closure inside a database transaction.
    pub(crate) fn run_in_transaction_impl(
        &self,
        cancel: &CancelToken,
        f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>,
    ) -> Result<()> {
        self.with_tx(cancel, |conn| {
            let sqlite_tx = SqliteTx { conn };
            f(&sqlite_tx)
        })
    }
}
