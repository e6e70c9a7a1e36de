//! Entity validation rules.

use crate::enums::NoteType;
use crate::epic::Epic;
use crate::feature::Feature;
use crate::idea::Idea;
use crate::keys::{feature_key_of_task, is_valid_epic_key, is_valid_feature_key, is_valid_task_key};
use crate::task::Task;

/// Error type for validation failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,

    #[error("title must be 500 characters or less (got {0})")]
    TitleTooLong(usize),

    #[error("key is required")]
    KeyRequired,

    #[error("invalid {entity} key: {key}")]
    InvalidKey { entity: &'static str, key: String },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("task {0} cannot depend on itself")]
    SelfDependency(String),

    #[error("dependency {dependency} is outside the feature of task {task}")]
    ForeignDependency { task: String, dependency: String },

    #[error("execution_order must be 1 or greater (got {0})")]
    InvalidExecutionOrder(i32),

    #[error("progress must be between 0 and 100 (got {0})")]
    ProgressOutOfRange(f64),

    #[error("time_spent_minutes cannot be negative")]
    NegativeTimeSpent,

    #[error("note content cannot be empty or whitespace-only")]
    BlankNoteContent,

    #[error("invalid note type: {0}")]
    InvalidNoteType(String),
}

fn check_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if title.len() > 500 {
        return Err(ValidationError::TitleTooLong(title.len()));
    }
    Ok(())
}

/// Validates an epic before insert or update.
pub fn validate_epic(epic: &Epic) -> Result<(), ValidationError> {
    check_title(&epic.title)?;
    if !is_valid_epic_key(&epic.key) {
        return Err(ValidationError::InvalidKey {
            entity: "epic",
            key: epic.key.clone(),
        });
    }
    Ok(())
}

/// Validates a feature before insert or update.
pub fn validate_feature(feature: &Feature) -> Result<(), ValidationError> {
    check_title(&feature.title)?;
    if !is_valid_feature_key(&feature.key) {
        return Err(ValidationError::InvalidKey {
            entity: "feature",
            key: feature.key.clone(),
        });
    }
    if let Some(order) = feature.execution_order {
        if order < 1 {
            return Err(ValidationError::InvalidExecutionOrder(order));
        }
    }
    if !(0.0..=100.0).contains(&feature.progress_pct) {
        return Err(ValidationError::ProgressOutOfRange(feature.progress_pct));
    }
    Ok(())
}

/// Validates a task using the built-in status set only.
pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    validate_task_with_statuses(task, &[])
}

/// Validates a task, allowing the given custom workflow statuses.
pub fn validate_task_with_statuses(
    task: &Task,
    custom_statuses: &[&str],
) -> Result<(), ValidationError> {
    validate_task_structure(task)?;
    if !task.status.is_declared_in(custom_statuses) {
        return Err(ValidationError::InvalidStatus(
            task.status.as_str().to_owned(),
        ));
    }
    Ok(())
}

/// Validates everything about a task except status membership, which depends
/// on the active workflow.
///
/// Dependency keys are checked for format, self-reference, and feature
/// membership here; existence of the referenced rows is the store's check.
pub fn validate_task_structure(task: &Task) -> Result<(), ValidationError> {
    check_title(&task.title)?;
    if !is_valid_task_key(&task.key) {
        return Err(ValidationError::InvalidKey {
            entity: "task",
            key: task.key.clone(),
        });
    }

    let own_feature = feature_key_of_task(&task.key);
    for dep in &task.depends_on {
        if dep == &task.key {
            return Err(ValidationError::SelfDependency(task.key.clone()));
        }
        if !is_valid_task_key(dep) {
            return Err(ValidationError::InvalidKey {
                entity: "task",
                key: dep.clone(),
            });
        }
        if feature_key_of_task(dep) != own_feature {
            return Err(ValidationError::ForeignDependency {
                task: task.key.clone(),
                dependency: dep.clone(),
            });
        }
    }

    if let Some(order) = task.execution_order {
        if order < 1 {
            return Err(ValidationError::InvalidExecutionOrder(order));
        }
    }
    if let Some(minutes) = task.time_spent_minutes {
        if minutes < 0 {
            return Err(ValidationError::NegativeTimeSpent);
        }
    }
    Ok(())
}

/// Validates note content and type before insert.
pub fn validate_note(note_type: &NoteType, content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::BlankNoteContent);
    }
    if !note_type.is_builtin() {
        return Err(ValidationError::InvalidNoteType(
            note_type.as_str().to_owned(),
        ));
    }
    Ok(())
}

/// Validates an idea before insert or update.
pub fn validate_idea(idea: &Idea) -> Result<(), ValidationError> {
    check_title(&idea.title)?;
    if idea.key.trim().is_empty() {
        return Err(ValidationError::KeyRequired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::TaskStatus;
    use crate::epic::EpicBuilder;
    use crate::feature::FeatureBuilder;
    use crate::task::TaskBuilder;

    #[test]
    fn valid_entities_pass() {
        let epic = EpicBuilder::new("Auth").key("E01").build();
        assert!(validate_epic(&epic).is_ok());

        let feature = FeatureBuilder::new(1, "Login").key("E01-F01").build();
        assert!(validate_feature(&feature).is_ok());

        let task = TaskBuilder::new(1, "Form").key("T-E01-F01-001").build();
        assert!(validate_task(&task).is_ok());
    }

    #[test]
    fn bad_keys_fail() {
        let epic = EpicBuilder::new("Auth").key("E1").build();
        assert!(matches!(
            validate_epic(&epic),
            Err(ValidationError::InvalidKey { entity: "epic", .. })
        ));

        let feature = FeatureBuilder::new(1, "Login").key("F01").build();
        assert!(validate_feature(&feature).is_err());

        let task = TaskBuilder::new(1, "Form").key("E01-F01-001").build();
        assert!(validate_task(&task).is_err());
    }

    #[test]
    fn empty_title_fails() {
        let epic = EpicBuilder::new("   ").key("E01").build();
        assert_eq!(validate_epic(&epic), Err(ValidationError::TitleRequired));
    }

    #[test]
    fn self_dependency_fails() {
        let task = TaskBuilder::new(1, "Form")
            .key("T-E01-F01-001")
            .depends_on(vec!["T-E01-F01-001".into()])
            .build();
        assert!(matches!(
            validate_task(&task),
            Err(ValidationError::SelfDependency(_))
        ));
    }

    #[test]
    fn cross_feature_dependency_fails() {
        let task = TaskBuilder::new(1, "Form")
            .key("T-E01-F01-002")
            .depends_on(vec!["T-E01-F02-001".into()])
            .build();
        assert!(matches!(
            validate_task(&task),
            Err(ValidationError::ForeignDependency { .. })
        ));
    }

    #[test]
    fn custom_status_needs_declaration() {
        let task = TaskBuilder::new(1, "Form")
            .key("T-E01-F01-001")
            .status(TaskStatus::Custom("triage".into()))
            .build();
        assert!(validate_task(&task).is_err());
        assert!(validate_task_with_statuses(&task, &["triage"]).is_ok());
    }

    #[test]
    fn negative_time_spent_fails() {
        let mut task = TaskBuilder::new(1, "Form").key("T-E01-F01-001").build();
        task.time_spent_minutes = Some(-10);
        assert_eq!(
            validate_task(&task),
            Err(ValidationError::NegativeTimeSpent)
        );
    }

    #[test]
    fn blank_note_content_fails() {
        assert_eq!(
            validate_note(&NoteType::Comment, "   \n\t"),
            Err(ValidationError::BlankNoteContent)
        );
        assert!(validate_note(&NoteType::Rejection, "missing tests").is_ok());
    }

    #[test]
    fn custom_note_type_fails() {
        assert!(matches!(
            validate_note(&NoteType::Custom("musing".into()), "hm"),
            Err(ValidationError::InvalidNoteType(_))
        ));
    }

    #[test]
    fn progress_out_of_range_fails() {
        let mut feature = FeatureBuilder::new(1, "Login").key("E01-F01").build();
        feature.progress_pct = 101.0;
        assert!(matches!(
            validate_feature(&feature),
            Err(ValidationError::ProgressOutOfRange(_))
        ));
    }
}
