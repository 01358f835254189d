//! Job model, on-disk lifecycle and the in-memory queue.
//!
//! - [`descriptor`]: metadata descriptor dialects (COM and JSON)
//! - [`job`]: stages, job records and their projections
//! - [`store`]: stage directories and transitions between them
//! - [`queue`]: dispatch order and the pause gate

pub mod descriptor;
pub mod job;
pub mod queue;
pub mod store;

pub use descriptor::{Dialect, Metadata};
pub use job::{DescriptorFile, JobInfo, JobRecord, JobSummary, Stage, OUTPUT_DIR};
pub use queue::{JobListing, JobQueue, JobRef, SharedQueue};
pub use store::{ExpireReport, JobStore};
