use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::Stage;

#[derive(Error, Debug)]
pub enum AutosegError {
    #[error("No descriptor found in {0}")]
    DescriptorNotFound(PathBuf),

    #[error("Artifact {artifact} not found next to {descriptor}")]
    ArtifactNotFound {
        descriptor: PathBuf,
        artifact: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Malformed descriptor {path}: missing {key}")]
    Malformed { path: PathBuf, key: &'static str },

    #[error("Cannot parse descriptor {path}: {reason}")]
    Unparseable { path: PathBuf, reason: String },

    #[error("Position {position} out of range (queue holds {len} jobs)")]
    OutOfRange { position: usize, len: usize },

    #[error("Processing is already paused")]
    AlreadyPaused,

    #[error("Processing is already unpaused")]
    AlreadyUnpaused,

    #[error("Could not move {from} into {to} after rename retry: {source}")]
    MoveCollision {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stage transition {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("Processing failed: {0}")]
    ProcessFailed(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No response from server")]
    NoResponse,

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutosegError {
    /// True for errors that mean a raw descriptor can never be bound: it does
    /// not parse, names no target, or its artifact is missing. The ingestion
    /// loop quarantines on these.
    pub fn is_association_error(&self) -> bool {
        matches!(
            self,
            AutosegError::ArtifactNotFound { .. }
                | AutosegError::Malformed { .. }
                | AutosegError::Unparseable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AutosegError>;
