//! Feature -- the mid-level work item, child of an epic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::FeatureStatus;
use crate::slug::slugify;

/// A feature under an epic, owning a set of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: i64,

    /// Owning epic row id.
    pub epic_id: i64,

    /// Public key matching `E\d{2}-F\d{2}`.
    pub key: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: FeatureStatus,

    /// When true, automatic status propagation must not overwrite `status`.
    #[serde(default)]
    pub status_override: bool,

    /// Cached progress percentage, 0.0..=100.0, maintained by UpdateProgress.
    #[serde(default)]
    pub progress_pct: f64,

    /// 1-based order among siblings, unique when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Builder for [`Feature`].
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    feature: Feature,
    explicit_slug: bool,
}

impl FeatureBuilder {
    pub fn new(epic_id: i64, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            feature: Feature {
                id: 0,
                epic_id,
                key: String::new(),
                title: title.into(),
                description: None,
                status: FeatureStatus::default(),
                status_override: false,
                progress_pct: 0.0,
                execution_order: None,
                slug: None,
                file_path: None,
                created_at: now,
                updated_at: now,
            },
            explicit_slug: false,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.feature.key = key.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.feature.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: FeatureStatus) -> Self {
        self.feature.status = status;
        self
    }

    pub fn status_override(mut self, flag: bool) -> Self {
        self.feature.status_override = flag;
        self
    }

    pub fn execution_order(mut self, order: i32) -> Self {
        self.feature.execution_order = Some(order);
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.feature.slug = Some(slug.into());
        self.explicit_slug = true;
        self
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.feature.file_path = Some(path.into());
        self
    }

    pub fn build(mut self) -> Feature {
        if !self.explicit_slug {
            let slug = slugify(&self.feature.title);
            if !slug.is_empty() {
                self.feature.slug = Some(slug);
            }
        }
        self.feature
    }
}
