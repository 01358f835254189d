//! Control-plane wire format.
//!
//! One request and one response per connection. Each message is a JSON
//! document in a single frame with a 4-byte big-endian length prefix.
//!
//! ```text
//! +----------------+---------------------------+
//! | length (u32be) |   JSON (length bytes)     |
//! +----------------+---------------------------+
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::{AutosegError, Result};
use crate::scheduler::{JobInfo, JobListing, JobSummary};

/// Largest accepted frame.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Frame codec used on both ends of a control connection.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    serde_json::from_slice(frame).map_err(|e| AutosegError::Protocol(e.to_string()))
}

/// Operator command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Current job and the waiting line
    Jobs,
    Completed,
    Failed,
    Info { name: String },
    /// Move a queued job to a 1-based position
    Move { name: String, position: usize },
    Restart { name: String },
    Delete { name: String },
    Pause,
    Unpause,
}

impl ControlRequest {
    pub fn command(&self) -> CommandName {
        match self {
            ControlRequest::Jobs => CommandName::Jobs,
            ControlRequest::Completed => CommandName::Completed,
            ControlRequest::Failed => CommandName::Failed,
            ControlRequest::Info { .. } => CommandName::Info,
            ControlRequest::Move { .. } => CommandName::Move,
            ControlRequest::Restart { .. } => CommandName::Restart,
            ControlRequest::Delete { .. } => CommandName::Delete,
            ControlRequest::Pause => CommandName::Pause,
            ControlRequest::Unpause => CommandName::Unpause,
        }
    }
}

/// Echo of the request kind in every response. `Invalid` answers requests
/// that could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Jobs,
    Completed,
    Failed,
    Info,
    Move,
    Restart,
    Delete,
    Pause,
    Unpause,
    Invalid,
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommandName::Jobs => "jobs",
            CommandName::Completed => "completed",
            CommandName::Failed => "failed",
            CommandName::Info => "info",
            CommandName::Move => "move",
            CommandName::Restart => "restart",
            CommandName::Delete => "delete",
            CommandName::Pause => "pause",
            CommandName::Unpause => "unpause",
            CommandName::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Paused,
    Unpaused,
}

/// Error payloads an operator can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ControlError {
    NotFound { name: String },
    OutOfRange { position: usize, len: usize },
    Unresolved { artifact: String },
    AlreadyPaused,
    AlreadyUnpaused,
    Invalid { message: String },
    Internal { message: String },
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::NotFound { name } => write!(f, "Job not found: {}", name),
            ControlError::OutOfRange { position, len } => write!(
                f,
                "Position {} out of range, valid positions are 1..={}",
                position, len
            ),
            ControlError::Unresolved { artifact } => {
                write!(f, "Artifact {} is missing, job cannot be queued", artifact)
            }
            ControlError::AlreadyPaused => write!(f, "Processing is already paused"),
            ControlError::AlreadyUnpaused => write!(f, "Processing is already unpaused"),
            ControlError::Invalid { message } => write!(f, "Invalid request: {}", message),
            ControlError::Internal { message } => write!(f, "Server error: {}", message),
        }
    }
}

impl From<&AutosegError> for ControlError {
    fn from(err: &AutosegError) -> Self {
        match err {
            AutosegError::JobNotFound(name) => ControlError::NotFound { name: name.clone() },
            AutosegError::OutOfRange { position, len } => ControlError::OutOfRange {
                position: *position,
                len: *len,
            },
            AutosegError::ArtifactNotFound { artifact, .. } => ControlError::Unresolved {
                artifact: artifact.clone(),
            },
            AutosegError::AlreadyPaused => ControlError::AlreadyPaused,
            AutosegError::AlreadyUnpaused => ControlError::AlreadyUnpaused,
            AutosegError::Protocol(message) => ControlError::Invalid {
                message: message.clone(),
            },
            other => ControlError::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Queue snapshot, answered by `jobs`, `move`, `restart` and `delete`
    Queue(JobListing),
    /// Stage listing, answered by `completed` and `failed`
    Jobs(Vec<JobSummary>),
    Info(Box<JobInfo>),
    Processing(ProcessingState),
    Error(ControlError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub command: CommandName,
    pub payload: Payload,
}

impl ControlResponse {
    pub fn new(command: CommandName, payload: Payload) -> Self {
        Self { command, payload }
    }

    pub fn error(command: CommandName, error: ControlError) -> Self {
        Self::new(command, Payload::Error(error))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::error(
            CommandName::Invalid,
            ControlError::Invalid {
                message: message.into(),
            },
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, Payload::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let json = serde_json::to_value(ControlRequest::Move {
            name: "C0001".into(),
            position: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"command": "move", "args": {"name": "C0001", "position": 2}})
        );
        let json = serde_json::to_value(ControlRequest::Pause).unwrap();
        assert_eq!(json, serde_json::json!({"command": "pause"}));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = decode::<ControlRequest>(br#"{"command": "reboot"}"#).unwrap_err();
        assert!(matches!(err, AutosegError::Protocol(_)));
        assert!(decode::<ControlRequest>(b"not json").is_err());
    }

    #[test]
    fn pause_errors_use_operator_names() {
        let json = serde_json::to_value(ControlResponse::error(
            CommandName::Pause,
            ControlError::AlreadyPaused,
        ))
        .unwrap();
        assert_eq!(json["payload"]["data"]["error"], "already_paused");
        let json = serde_json::to_value(ControlResponse::new(
            CommandName::Unpause,
            Payload::Processing(ProcessingState::Unpaused),
        ))
        .unwrap();
        assert_eq!(json["command"], "unpause");
        assert_eq!(json["payload"]["data"], "unpaused");
    }

    #[test]
    fn error_mapping() {
        let err = AutosegError::OutOfRange { position: 9, len: 2 };
        assert_eq!(
            ControlError::from(&err),
            ControlError::OutOfRange { position: 9, len: 2 }
        );
        let err = AutosegError::JobNotFound("x".into());
        assert_eq!(
            ControlError::from(&err),
            ControlError::NotFound { name: "x".into() }
        );
        let err = AutosegError::Fatal("disk".into());
        assert!(matches!(
            ControlError::from(&err),
            ControlError::Internal { .. }
        ));
    }

    #[test]
    fn codec_rejects_oversized_frames() {
        use bytes::BytesMut;
        use tokio_util::codec::Decoder;

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        buf.extend_from_slice(b"{}");
        assert!(codec().decode(&mut buf).is_err());
    }
}
