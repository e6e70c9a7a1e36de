//! Workflow configuration loading for the trellis task engine.
//!
//! The workflow file is a YAML document matching
//! [`WorkflowConfig`](trellis_core::workflow::WorkflowConfig); values may be
//! overridden through `TRELLIS_`-prefixed environment variables. A missing
//! file yields the built-in default workflow.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use trellis_core::workflow::WorkflowConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or merged.
    #[error("failed to load workflow config: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration file could not be written.
    #[error("failed to write workflow config: {0}")]
    Write(#[from] std::io::Error),

    /// The configuration could not be serialized as YAML.
    #[error("failed to serialize workflow config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// The configured workflow is inconsistent.
    #[error("invalid workflow config: {reason}")]
    Invalid {
        /// Why the workflow was rejected.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Loads the workflow configuration from a YAML file, layering
/// `TRELLIS_`-prefixed environment variables on top. A missing file yields
/// the default workflow.
pub fn load_workflow_config(path: impl AsRef<Path>) -> Result<WorkflowConfig> {
    let path = path.as_ref();

    let mut figment = Figment::from(Serialized::defaults(WorkflowConfig::default()));
    if path.exists() {
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed("TRELLIS_").split("__"));

    let config: WorkflowConfig = figment.extract().map_err(Box::new)?;
    validate_workflow(&config)?;
    Ok(config)
}

/// Writes the workflow configuration as YAML.
pub fn save_workflow_config(path: impl AsRef<Path>, config: &WorkflowConfig) -> Result<()> {
    validate_workflow(config)?;
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Checks the internal consistency of a workflow configuration: every flow
/// target must be a declared status, and the start/complete lists must name
/// declared statuses.
pub fn validate_workflow(config: &WorkflowConfig) -> Result<()> {
    if config.status_flow.is_empty() {
        return Err(ConfigError::Invalid {
            reason: "status_flow is empty".into(),
        });
    }
    for (from, targets) in &config.status_flow {
        for to in targets {
            if !config.is_known_status(to) {
                return Err(ConfigError::Invalid {
                    reason: format!("transition {from} -> {to} targets an undeclared status"),
                });
            }
        }
    }
    for status in &config.special_statuses.start {
        if !config.is_known_status(status) {
            return Err(ConfigError::Invalid {
                reason: format!("start status '{status}' is not in status_flow"),
            });
        }
    }
    for status in &config.special_statuses.complete {
        if !config.is_known_status(status) {
            return Err(ConfigError::Invalid {
                reason: format!("complete status '{status}' is not in status_flow"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_core::workflow::OrchestratorActionSpec;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_workflow_config(dir.path().join("workflow.yaml")).unwrap();
        assert_eq!(config, WorkflowConfig::default());
    }

    #[test]
    fn file_overrides_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yaml");
        std::fs::write(
            &path,
            r#"
status_flow:
  todo: [doing]
  doing: [done]
  done: []
special_statuses:
  start: [todo]
  complete: [done]
"#,
        )
        .unwrap();

        let config = load_workflow_config(&path).unwrap();
        assert!(config.can_transition("todo", "doing"));
        assert!(config.is_terminal("done"));
        assert!(config.is_complete("done"));
        assert!(!config.can_transition("todo", "in_progress"));
    }

    #[test]
    fn action_metadata_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yaml");
        std::fs::write(
            &path,
            r#"
status_metadata:
  in_progress:
    label: In Progress
    phase: execution
    orchestrator_action:
      action: spawn_agent
      agent_type: developer
      skills: [rust]
      instruction: "Work on {task_id}"
"#,
        )
        .unwrap();

        let config = load_workflow_config(&path).unwrap();
        match config.action_for("in_progress") {
            Some(OrchestratorActionSpec::SpawnAgent {
                agent_type,
                skills,
                instruction,
            }) => {
                assert_eq!(agent_type, "developer");
                assert_eq!(skills, &["rust".to_string()]);
                assert_eq!(instruction, "Work on {task_id}");
            }
            other => panic!("expected spawn_agent action, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_flow_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yaml");
        std::fs::write(
            &path,
            r#"
status_flow:
  todo: [ghost]
special_statuses:
  start: [todo]
  complete: [todo]
"#,
        )
        .unwrap();

        let err = load_workflow_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn undeclared_start_status_rejected() {
        let mut config = WorkflowConfig::default();
        config.special_statuses.start = vec!["ghost".into()];
        assert!(validate_workflow(&config).is_err());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.yaml");

        let mut config = WorkflowConfig::default();
        config.progress_weights.insert("ready_for_review".into(), 0.5);
        save_workflow_config(&path, &config).unwrap();

        let back = load_workflow_config(&path).unwrap();
        assert_eq!(back.weight_for("ready_for_review"), 0.5);
        assert_eq!(back.status_flow, config.status_flow);
    }
}
