use super::context::JobContext;
use async_trait::async_trait;
use std::time::Duration;

/// When a job should run.
#[derive(Debug, Clone, Copy)]
pub struct JobSchedule {
    /// Fixed interval between runs.
    pub interval: Duration,
    /// Whether the first run happens immediately at scheduler startup
    /// instead of after the first interval.
    pub run_at_startup: bool,
}

impl JobSchedule {
    /// Run every `interval`, waiting a full interval before the first run.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            run_at_startup: false,
        }
    }

    /// Run once at startup, then every `interval`.
    pub fn every_from_startup(interval: Duration) -> Self {
        Self {
            interval,
            run_at_startup: true,
        }
    }
}

/// Errors that can occur during job execution.
#[derive(Debug)]
pub enum JobError {
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for background jobs.
///
/// One job type never runs twice concurrently; the scheduler skips a due
/// run while a previous one is still in flight. A failing run is isolated:
/// it is recorded and the sibling jobs are unaffected.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// Execute the job. Long-running implementations should periodically
    /// check `ctx.is_cancelled()` and return `JobError::Cancelled` early.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
