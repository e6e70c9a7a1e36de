//! Epic -- the top-level work item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{BusinessValue, EpicStatus, Priority};
use crate::slug::slugify;

/// A top-level work item owning a set of features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    /// Internal row id, immutable once assigned.
    #[serde(default)]
    pub id: i64,

    /// Public key matching `E\d{2}`.
    pub key: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: EpicStatus,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_value: Option<BusinessValue>,

    /// Lowercase kebab slug derived from the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Backing markdown file, unique when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Builder for [`Epic`]. `build()` derives the slug from the title when one
/// was not supplied.
#[derive(Debug, Clone)]
pub struct EpicBuilder {
    epic: Epic,
    explicit_slug: bool,
}

impl EpicBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            epic: Epic {
                id: 0,
                key: String::new(),
                title: title.into(),
                description: None,
                status: EpicStatus::default(),
                priority: Priority::default(),
                business_value: None,
                slug: None,
                file_path: None,
                created_at: now,
                updated_at: now,
            },
            explicit_slug: false,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.epic.key = key.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.epic.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: EpicStatus) -> Self {
        self.epic.status = status;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.epic.priority = priority;
        self
    }

    pub fn business_value(mut self, value: BusinessValue) -> Self {
        self.epic.business_value = Some(value);
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.epic.slug = Some(slug.into());
        self.explicit_slug = true;
        self
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.epic.file_path = Some(path.into());
        self
    }

    pub fn build(mut self) -> Epic {
        if !self.explicit_slug {
            let slug = slugify(&self.epic.title);
            if !slug.is_empty() {
                self.epic.slug = Some(slug);
            }
        }
        self.epic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_derives_slug() {
        let epic = EpicBuilder::new("User Authentication").key("E01").build();
        assert_eq!(epic.slug.as_deref(), Some("user-authentication"));
        assert_eq!(epic.status, EpicStatus::Planning);
        assert_eq!(epic.priority, Priority::Medium);
    }

    #[test]
    fn explicit_slug_wins() {
        let epic = EpicBuilder::new("User Authentication")
            .key("E01")
            .slug("auth")
            .build();
        assert_eq!(epic.slug.as_deref(), Some("auth"));
    }

    #[test]
    fn serde_roundtrip() {
        let epic = EpicBuilder::new("Billing")
            .key("E02")
            .description("Invoice pipeline")
            .business_value(BusinessValue::High)
            .build();
        let json = serde_json::to_string(&epic).unwrap();
        let back: Epic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, epic);
    }
}
