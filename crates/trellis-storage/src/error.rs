//! Store error types.

use trellis_core::graph::GraphError;
use trellis_core::validation::ValidationError;
use trellis_core::workflow::InvalidTransition;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "task", "feature").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A numeric-only key matched more than one row.
    #[error("ambiguous key '{input}' matches: {}", matches.join(", "))]
    AmbiguousKey {
        /// The caller-supplied lookup string.
        input: String,
        /// Keys of all matching rows.
        matches: Vec<String>,
    },

    /// An input failed a documented invariant.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A unique constraint would be violated.
    #[error("{entity} already exists: {value}")]
    Conflict {
        /// The kind of entity.
        entity: String,
        /// The conflicting key or path.
        value: String,
    },

    /// The workflow state machine refused a transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Adding the proposed edge would close a dependency cycle.
    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency {
        /// The cycle path, first node repeated at the end.
        path: Vec<String>,
    },

    /// A task's depends_on includes its own key.
    #[error("task {0} cannot depend on itself")]
    SelfReference(String),

    /// A depends_on entry does not match any task in the same feature.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// The caller cancelled before commit.
    #[error("operation cancelled")]
    Cancelled,

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration {
        /// Name of the migration that failed.
        name: String,
        /// Underlying error description.
        reason: String,
    },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StoreError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StoreError::Conflict`] for the given entity kind and value.
    pub fn conflict(entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
            value: value.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a [`StoreError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transaction(_))
    }
}

impl From<GraphError> for StoreError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::SelfReference(key) => Self::SelfReference(key),
            GraphError::UnknownDependency(key) => Self::UnknownDependency(key),
            GraphError::CircularDependency { path } => Self::CircularDependency { path },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_errors_map_to_store_kinds() {
        let err: StoreError = GraphError::SelfReference("T-E01-F01-001".into()).into();
        assert!(matches!(err, StoreError::SelfReference(_)));

        let err: StoreError = GraphError::CircularDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
    }

    #[test]
    fn predicates() {
        assert!(StoreError::not_found("task", "T-E01-F01-001").is_not_found());
        assert!(StoreError::conflict("epic", "E01").is_conflict());
        assert!(StoreError::Transaction("busy".into()).is_retryable());
        assert!(!StoreError::Cancelled.is_retryable());
    }
}
