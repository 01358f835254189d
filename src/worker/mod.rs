//! Processing and delivery of dispatched jobs.
//!
//! - [`Processor`]: runs the processing step for a job type
//! - [`ProcessorRegistry`]: picks the processor for a job's declared type
//! - [`Delivery`]: ships the output directory back to the client
//!
//! # Execution Flow
//!
//! 1. The dispatch loop resolves a processor from the job's `JOB_TYPE`
//! 2. [`CommandProcessor`] runs the configured program inside the job directory
//! 3. On success, [`Delivery::send`] pushes the contents of `masks/`
//!
//! Neither step moves the job directory; stage transitions stay with the
//! orchestrator.

pub mod delivery;
pub mod executor;

pub use delivery::{Delivery, LocalDelivery, SftpDelivery};
pub use executor::{CommandProcessor, Processor, ProcessorRegistry};
