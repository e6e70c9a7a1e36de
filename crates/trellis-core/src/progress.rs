//! Weighted progress calculation for features and epics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::FeatureStatus;
use crate::workflow::WorkflowConfig;

/// How epic progress is derived from its features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicProgressMode {
    /// Plain average of feature percentages; completed/archived features
    /// count as 100 regardless of their cached value.
    Simple,
    /// Average of feature percentages weighted by each feature's task count.
    #[default]
    WeightedByTasks,
}

/// Per-feature inputs for epic progress.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRollup {
    pub status: FeatureStatus,
    pub progress_pct: f64,
    pub task_count: i64,
}

/// Feature progress from a `status -> count` breakdown of its tasks.
///
/// Each status contributes its workflow weight; the result is the weighted
/// share of the total task count, as a percentage. Zero tasks yield 0.0.
pub fn feature_progress(breakdown: &BTreeMap<String, i64>, workflow: &WorkflowConfig) -> f64 {
    let total: i64 = breakdown.values().sum();
    if total <= 0 {
        return 0.0;
    }
    let weighted: f64 = breakdown
        .iter()
        .map(|(status, count)| *count as f64 * workflow.weight_for(status))
        .sum();
    100.0 * weighted / total as f64
}

/// Epic progress from its feature rollups. Zero features (or, in weighted
/// mode, zero total tasks) yield 0.0.
pub fn epic_progress(features: &[FeatureRollup], mode: EpicProgressMode) -> f64 {
    if features.is_empty() {
        return 0.0;
    }
    match mode {
        EpicProgressMode::Simple => {
            let sum: f64 = features
                .iter()
                .map(|f| {
                    if f.status.is_done() {
                        100.0
                    } else {
                        f.progress_pct
                    }
                })
                .sum();
            sum / features.len() as f64
        }
        EpicProgressMode::WeightedByTasks => {
            let total_tasks: i64 = features.iter().map(|f| f.task_count).sum();
            if total_tasks <= 0 {
                return 0.0;
            }
            let weighted: f64 = features
                .iter()
                .map(|f| f.progress_pct * f.task_count as f64)
                .sum();
            weighted / total_tasks as f64
        }
    }
}
