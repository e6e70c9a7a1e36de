//! Typed edges between tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::RelationshipType;

/// A typed edge between two tasks. Unique on
/// `(from_task_id, to_task_id, relationship_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRelationship {
    pub id: i64,

    pub from_task_id: i64,

    pub to_task_id: i64,

    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_type_field() {
        let rel = TaskRelationship {
            id: 1,
            from_task_id: 10,
            to_task_id: 11,
            relationship_type: RelationshipType::Blocks,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&rel).unwrap();
        assert!(json.contains(r#""type":"blocks""#));
        let back: TaskRelationship = serde_json::from_str(&json).unwrap();
        assert_eq!(back.relationship_type, RelationshipType::Blocks);
    }
}
