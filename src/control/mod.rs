//! Operator control plane: a TCP listener speaking length-prefixed JSON.

pub mod client;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::ControlClient;
pub use protocol::{ControlError, ControlRequest, ControlResponse, Payload, ProcessingState};
pub use server::ControlServer;
pub use service::ControlService;
