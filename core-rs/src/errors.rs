//! Error types for Adjudication Core

use thiserror::Error;

use crate::policy::PolicyId;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Role store could not be reached. Authorization callers treat this as deny.
    #[error("Role store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Ingest queue closed: consumer has been dropped")]
    QueueClosed,

    #[error("Worker state error: {0}")]
    WorkerState(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(PolicyId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for failures that must be surfaced to an authorization caller as "access denied".
    pub fn is_fail_closed(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
