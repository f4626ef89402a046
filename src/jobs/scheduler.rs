use super::context::JobContext;
use super::job::{BackgroundJob, JobError};
use crate::metrics;
use crate::store::{EnergyStore, JobRunStatus, JobScheduleState};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Manages background job scheduling and execution.
///
/// The scheduler is an explicit service instance: it is created at startup,
/// driven by [`JobScheduler::run`], and stopped through its shutdown token.
/// Next-run times are persisted in the `job_schedules` table so restarts
/// do not reset every cadence.
pub struct JobScheduler {
    /// Registered jobs by ID.
    jobs: HashMap<String, Arc<dyn BackgroundJob>>,

    /// IDs of jobs currently executing. A job type never runs twice
    /// concurrently.
    running: Arc<RwLock<HashSet<String>>>,

    /// Task handles of in-flight jobs.
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Store used for job history and schedule state.
    store: Arc<dyn EnergyStore>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn EnergyStore>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
    ) -> Self {
        Self {
            jobs: HashMap::new(),
            running: Arc::new(RwLock::new(HashSet::new())),
            running_handles: HashMap::new(),
            store,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.jobs.insert(job.id().to_string(), job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        info!(
            "Starting job scheduler with {} registered jobs",
            self.jobs.len()
        );

        // On startup: mark any runs left over from a previous process.
        match self.store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale job runs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale job runs: {}", e);
            }
        }

        // Jobs that don't run at startup wait out their first interval
        // instead of firing because no schedule state exists yet.
        let mut startup_jobs = Vec::new();
        for (job_id, job) in &self.jobs {
            let schedule = job.schedule();
            if schedule.run_at_startup {
                startup_jobs.push(job_id.clone());
            } else if matches!(self.store.get_schedule_state(job_id), Ok(None)) {
                let next_run = Utc::now()
                    + chrono::Duration::from_std(schedule.interval).unwrap_or_default();
                let state = JobScheduleState {
                    job_id: job_id.clone(),
                    next_run_at: next_run,
                    last_run_at: None,
                };
                if let Err(e) = self.store.update_schedule_state(&state) {
                    warn!("Failed to seed schedule state for {}: {}", job_id, e);
                }
            }
        }
        startup_jobs.sort();
        for job_id in startup_jobs {
            self.spawn_job(&job_id, "startup").await;
        }

        loop {
            // Clean up completed job handles
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = Duration::from_secs(60); // Default check interval

        let running = self.running.read().await;
        for job_id in self.jobs.keys() {
            if running.contains(job_id) {
                continue;
            }

            let next_run = self.get_next_run_time(job_id);
            let now = Utc::now();
            if next_run > now {
                let duration = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
                if duration < min_duration {
                    min_duration = duration;
                }
            } else {
                return Duration::from_secs(0);
            }
        }

        min_duration
    }

    /// Next run time for a job; a job without persisted schedule state is
    /// due immediately.
    fn get_next_run_time(&self, job_id: &str) -> chrono::DateTime<Utc> {
        if let Ok(Some(state)) = self.store.get_schedule_state(job_id) {
            state.next_run_at
        } else {
            Utc::now()
        }
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let mut jobs_to_run = Vec::new();

        {
            let running = self.running.read().await;
            for job_id in self.jobs.keys() {
                if running.contains(job_id) {
                    continue;
                }
                if self.get_next_run_time(job_id) <= now {
                    jobs_to_run.push(job_id.clone());
                }
            }
        }

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = match self.jobs.get(job_id) {
            Some(job) => Arc::clone(job),
            None => {
                error!("Attempted to spawn unknown job: {}", job_id);
                return;
            }
        };

        {
            let running = self.running.read().await;
            if running.contains(job_id) {
                debug!("Job {} already running, skipping spawn", job_id);
                return;
            }
        }

        let run_id = match self.store.record_job_start(job_id, triggered_by) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to record job start for {}: {}", job_id, e);
                return;
            }
        };

        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_id, run_id, triggered_by
        );
        self.running.write().await.insert(job_id.to_string());

        // Push next_run_at past the interval before execution so a slow job
        // cannot come due again mid-flight.
        let next_run =
            Utc::now() + chrono::Duration::from_std(job.schedule().interval).unwrap_or_default();
        let schedule_state = JobScheduleState {
            job_id: job_id.to_string(),
            next_run_at: next_run,
            last_run_at: None,
        };
        if let Err(e) = self.store.update_schedule_state(&schedule_state) {
            warn!("Failed to update schedule state for {}: {}", job_id, e);
        }

        metrics::set_job_running(job_id, true);

        let ctx = JobContext::new(
            self.job_context.cancellation_token.child_token(),
            Arc::clone(&self.job_context.store),
        );
        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            // Inner spawn isolates a panicking job from the bookkeeping.
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None, "success")
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed")
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        JobRunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                    )
                }
            };

            metrics::record_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_job_running(&job_id_owned, false);

            if let Err(e) = store.record_job_finish(run_id, status, error_msg) {
                error!("Failed to record job finish for {}: {}", job_id_owned, e);
            }

            running.write().await.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Update schedule state after a job completes.
    async fn update_schedule_after_run(&self, job_id: &str) {
        let Some(job) = self.jobs.get(job_id) else {
            return;
        };

        let now = Utc::now();
        let state = JobScheduleState {
            job_id: job_id.to_string(),
            next_run_at: now
                + chrono::Duration::from_std(job.schedule().interval).unwrap_or_default(),
            last_run_at: Some(now),
        };
        if let Err(e) = self.store.update_schedule_state(&state) {
            error!("Failed to update schedule state for {}: {}", job_id, e);
        }
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let mut completed = Vec::new();

        for (job_id, handle) in &self.running_handles {
            if handle.is_finished() {
                completed.push(job_id.clone());
            }
        }

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.update_schedule_after_run(&job_id).await;
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for (job_id, handle) in self.running_handles.drain() {
            if !handle.is_finished() {
                info!("Waiting for job {} to complete...", job_id);
            }
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }

        info!("Scheduler shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobSchedule;
    use crate::store::SqliteEnergyStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
    }

    impl TestJob {
        fn startup(id: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
            let count = Arc::new(AtomicUsize::new(0));
            let job = Arc::new(Self {
                id,
                schedule: JobSchedule::every_from_startup(Duration::from_secs(3600)),
                execution_count: Arc::clone(&count),
                should_fail: Arc::new(AtomicBool::new(false)),
            });
            (job, count)
        }
    }

    #[async_trait]
    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn create_test_scheduler() -> (JobScheduler, Arc<SqliteEnergyStore>, CancellationToken) {
        let store = Arc::new(SqliteEnergyStore::open_in_memory().unwrap());
        let shutdown_token = CancellationToken::new();
        let ctx = JobContext::new(shutdown_token.child_token(), store.clone());
        let scheduler = JobScheduler::new(store.clone(), shutdown_token.clone(), ctx);
        (scheduler, store, shutdown_token)
    }

    #[tokio::test]
    async fn test_register_job() {
        let (mut scheduler, _store, _token) = create_test_scheduler();
        assert_eq!(scheduler.job_count(), 0);

        let (job, _) = TestJob::startup("test_job");
        scheduler.register_job(job);
        assert_eq!(scheduler.job_count(), 1);
    }

    #[tokio::test]
    async fn test_startup_job_executes_and_records_history() {
        let (mut scheduler, store, token) = create_test_scheduler();
        let (job, exec_count) = TestJob::startup("startup_job");
        scheduler.register_job(job);

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(
            exec_count.load(Ordering::SeqCst) >= 1,
            "Job should have executed on startup"
        );

        let history = store.get_job_history("startup_job", 10).unwrap();
        assert!(!history.is_empty());
        assert_eq!(history[0].status, JobRunStatus::Completed);
        assert_eq!(history[0].triggered_by, "startup");

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_failed_job_records_error() {
        let (mut scheduler, store, token) = create_test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(TestJob {
            id: "failing_job",
            schedule: JobSchedule::every_from_startup(Duration::from_secs(3600)),
            execution_count: Arc::clone(&count),
            should_fail: Arc::new(AtomicBool::new(true)),
        });
        scheduler.register_job(job);

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(count.load(Ordering::SeqCst) >= 1);
        let history = store.get_job_history("failing_job", 10).unwrap();
        assert!(!history.is_empty());
        assert_eq!(history[0].status, JobRunStatus::Failed);
        assert!(history[0]
            .error_message
            .as_ref()
            .unwrap()
            .contains("Test failure"));

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_failing_job_does_not_affect_siblings() {
        let (mut scheduler, store, token) = create_test_scheduler();

        let failing = Arc::new(TestJob {
            id: "bad_job",
            schedule: JobSchedule::every_from_startup(Duration::from_secs(3600)),
            execution_count: Arc::new(AtomicUsize::new(0)),
            should_fail: Arc::new(AtomicBool::new(true)),
        });
        let (healthy, healthy_count) = TestJob::startup("good_job");
        scheduler.register_job(failing);
        scheduler.register_job(healthy);

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(
            healthy_count.load(Ordering::SeqCst) >= 1,
            "Sibling job must run despite the failing one"
        );
        let history = store.get_job_history("good_job", 10).unwrap();
        assert_eq!(history[0].status, JobRunStatus::Completed);

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_and_isolated() {
        struct PanickingJob;

        #[async_trait]
        impl BackgroundJob for PanickingJob {
            fn id(&self) -> &'static str {
                "panicking_job"
            }
            fn name(&self) -> &'static str {
                "Panicking Job"
            }
            fn description(&self) -> &'static str {
                "Panics on every run"
            }
            fn schedule(&self) -> JobSchedule {
                JobSchedule::every_from_startup(Duration::from_secs(3600))
            }
            async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
                panic!("boom");
            }
        }

        let (mut scheduler, store, token) = create_test_scheduler();
        scheduler.register_job(Arc::new(PanickingJob));
        let (healthy, healthy_count) = TestJob::startup("survivor_job");
        scheduler.register_job(healthy);

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let history = store.get_job_history("panicking_job", 10).unwrap();
        assert!(!history.is_empty());
        assert_eq!(history[0].status, JobRunStatus::Failed);
        assert!(history[0].error_message.as_ref().unwrap().contains("panic"));
        assert!(healthy_count.load(Ordering::SeqCst) >= 1);

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_interval_job_waits_out_first_interval() {
        let (mut scheduler, store, token) = create_test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(TestJob {
            id: "interval_job",
            schedule: JobSchedule::every(Duration::from_secs(3600)),
            execution_count: Arc::clone(&count),
            should_fail: Arc::new(AtomicBool::new(false)),
        });
        scheduler.register_job(job);

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            count.load(Ordering::SeqCst),
            0,
            "Job without startup run must wait for its first interval"
        );
        let state = store.get_schedule_state("interval_job").unwrap().unwrap();
        assert!(state.next_run_at > Utc::now());

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_stale_runs_marked_failed_on_startup() {
        let (mut scheduler, store, token) = create_test_scheduler();
        // Simulate a run left behind by a crashed process.
        store.record_job_start("ghost_job", "schedule").unwrap();

        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let last = store.get_last_run("ghost_job").unwrap().unwrap();
        assert_eq!(last.status, JobRunStatus::Failed);

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }
}
