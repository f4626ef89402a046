//! Background job scheduling and execution.
//!
//! The scheduler triggers the three fetch pipelines at independent cadences
//! plus a daily retention sweep; one job's failure never cascades to its
//! siblings.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use scheduler::JobScheduler;
