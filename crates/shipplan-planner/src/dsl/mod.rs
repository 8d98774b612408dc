//! Textual plan front end.

pub mod yaml;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    #[error("node '{node}' references unknown input '{input}'")]
    UnknownInput { node: String, input: String },

    #[error("invalid node '{node}': {reason}")]
    Invalid { node: String, reason: String },

    #[error(transparent)]
    Plan(#[from] shipplan_core::Error),
}
