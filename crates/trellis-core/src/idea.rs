//! Idea -- a pre-planning backlog item convertible into a work item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ConvertedType, IdeaStatus, Priority};

/// A backlog idea. Conversion into an epic, feature, or task is terminal and
/// recorded on the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    #[serde(default)]
    pub id: i64,

    pub key: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_date: DateTime<Utc>,

    #[serde(default)]
    pub priority: Priority,

    /// Position within the backlog.
    #[serde(default)]
    pub position: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_docs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub status: IdeaStatus,

    // -- Conversion tracking -------------------------------------------------
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_to_type: Option<ConvertedType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_to_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<DateTime<Utc>>,
}

impl Idea {
    /// A fresh idea with defaults for everything but key and title.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            key: key.into(),
            title: title.into(),
            description: None,
            created_date: Utc::now(),
            priority: Priority::default(),
            position: 0,
            notes: None,
            related_docs: Vec::new(),
            dependencies: Vec::new(),
            status: IdeaStatus::default(),
            converted_to_type: None,
            converted_to_key: None,
            converted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_idea_defaults() {
        let idea = Idea::new("IDEA-7", "Dark mode");
        assert_eq!(idea.status, IdeaStatus::New);
        assert_eq!(idea.priority, Priority::Medium);
        assert!(idea.converted_to_type.is_none());
    }

    #[test]
    fn serde_roundtrip_with_conversion() {
        let mut idea = Idea::new("IDEA-8", "Split billing epic");
        idea.status = IdeaStatus::Converted;
        idea.converted_to_type = Some(ConvertedType::Epic);
        idea.converted_to_key = Some("E09".into());
        idea.converted_at = Some(Utc::now());

        let json = serde_json::to_string(&idea).unwrap();
        let back: Idea = serde_json::from_str(&json).unwrap();
        assert_eq!(back, idea);
    }
}
