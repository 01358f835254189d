pub mod config;
pub mod control;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod worker;

pub use error::{AutosegError, Result};
pub use orchestrator::Orchestrator;
