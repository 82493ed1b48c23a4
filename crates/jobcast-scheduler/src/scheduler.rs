//! Due-time scheduler and dispatch loop.
//!
//! The scheduler owns the job queue behind a single lock. Producers insert
//! through [`Scheduler::schedule`], which signals the dispatch loop. The loop
//! pops due entries, hands them to the task executor outside the lock,
//! persists the outcome and publishes a status event.

use chrono::{DateTime, Utc};
use jobcast_config::SchedulerConfig;
use jobcast_core::{
    Job, JobId, JobStatus, Priority, StatusEvent, StatusNotifier, TaskExecutor, TaskSubmission,
};
use jobcast_db::{DbResult, JobRepo, StatusStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{JobQueue, ScheduleEntry};

/// What the dispatch loop should do next.
enum NextDue {
    /// An entry is due and has been removed from the queue.
    Ready(ScheduleEntry),
    /// The earliest entry is due after this long.
    Wait(Duration),
    /// The queue is empty.
    Idle,
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    /// Requeued for another attempt.
    Retrying,
    /// Retry ceiling reached.
    Failed,
}

/// Priority scheduler feeding the external task executor.
pub struct Scheduler {
    queue: Mutex<JobQueue>,
    wakeup: Notify,
    executor: Arc<dyn TaskExecutor>,
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn StatusNotifier>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            queue: Mutex::new(JobQueue::new()),
            wakeup: Notify::new(),
            executor,
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue an entry and wake the dispatch loop.
    pub async fn schedule(&self, entry: ScheduleEntry) {
        {
            let mut queue = self.queue.lock().await;
            queue.insert(entry);
        }
        self.wakeup.notify_one();
    }

    /// Queue a stored job. Returns `false` if the job is already terminal.
    pub async fn schedule_job(&self, job: &Job) -> bool {
        match ScheduleEntry::from_job(job) {
            Some(entry) => {
                debug!(job_id = %entry.id, rank = entry.rank, due = %entry.due, "Scheduling job");
                self.schedule(entry).await;
                true
            }
            None => {
                debug!(job_id = %job.id, status = %job.status, "Job already terminal, not scheduling");
                false
            }
        }
    }

    /// Load every outstanding job from the database into the queue.
    pub async fn recover(&self, repo: &dyn JobRepo) -> DbResult<usize> {
        let jobs = repo.list_outstanding().await?;
        let mut scheduled = 0;
        for job in &jobs {
            if self.schedule_job(job).await {
                scheduled += 1;
            }
        }
        info!(count = scheduled, "Recovered outstanding jobs");
        Ok(scheduled)
    }

    /// Number of queued entries.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Whether an entry for the job is queued.
    pub async fn contains(&self, id: JobId) -> bool {
        self.queue.lock().await.contains(&id)
    }

    /// Run the dispatch loop until cancelled.
    ///
    /// A dispatch that has started is finished before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            max_attempts = self.config.max_attempts,
            executor = self.executor.name(),
            "Starting dispatch loop"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.next_due(Utc::now()).await {
                NextDue::Ready(entry) => {
                    self.dispatch(entry).await;
                }
                NextDue::Wait(remaining) => {
                    debug!(?remaining, "Earliest job not yet due");
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {}
                        _ = self.wakeup.notified() => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                NextDue::Idle => {
                    debug!("Job queue is empty, waiting for jobs");
                    tokio::select! {
                        _ = self.wakeup.notified() => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }

        info!("Dispatch loop stopped");
    }

    async fn next_due(&self, now: DateTime<Utc>) -> NextDue {
        let mut queue = self.queue.lock().await;
        let Some(earliest) = queue.peek_earliest() else {
            return NextDue::Idle;
        };

        match (earliest.due - now).to_std() {
            Ok(remaining) if !remaining.is_zero() => NextDue::Wait(remaining),
            // Due now or in the past.
            _ => match queue.pop_earliest() {
                Some(entry) => NextDue::Ready(entry),
                None => NextDue::Idle,
            },
        }
    }

    /// Execute one due entry and apply the retry policy.
    pub async fn dispatch(&self, mut entry: ScheduleEntry) -> DispatchOutcome {
        if entry.attempts >= self.config.max_attempts {
            warn!(job_id = %entry.id, attempts = entry.attempts, "Job already exhausted its attempts");
            self.finish(&mut entry, JobStatus::Failed).await;
            return DispatchOutcome::Failed;
        }

        entry.attempts += 1;
        info!(job_id = %entry.id, job_type = %entry.job_type, attempt = entry.attempts, "Dispatching job");

        let submission = TaskSubmission {
            job_id: entry.id,
            job_type: entry.job_type.clone(),
            payload: entry.payload.clone(),
        };

        match self.executor.submit(&submission).await {
            Ok(()) => {
                info!(job_id = %entry.id, attempts = entry.attempts, "Job executed successfully");
                self.finish(&mut entry, JobStatus::Completed).await;
                DispatchOutcome::Completed
            }
            Err(e) if entry.attempts >= self.config.max_attempts => {
                error!(job_id = %entry.id, attempts = entry.attempts, error = %e, "Job failed, giving up");
                self.finish(&mut entry, JobStatus::Failed).await;
                DispatchOutcome::Failed
            }
            Err(e) => {
                let delay = self.backoff(entry.attempts);
                warn!(
                    job_id = %entry.id,
                    attempts = entry.attempts,
                    error = %e,
                    retry_in = ?delay,
                    "Job failed, retrying"
                );
                self.finish(&mut entry, JobStatus::Processing).await;

                let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
                entry.due = Utc::now()
                    .checked_add_signed(delay)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                entry.rank = Priority::HIGHEST_RANK;
                self.schedule(entry).await;
                DispatchOutcome::Retrying
            }
        }
    }

    /// Linear backoff: one step per attempt already made.
    fn backoff(&self, attempts: u32) -> Duration {
        self.config.backoff_step.saturating_mul(attempts)
    }

    /// Record a status transition: persist it, then publish it.
    ///
    /// A persistence failure is logged and does not stop the transition; the
    /// in-memory entry stays authoritative for retry scheduling.
    async fn finish(&self, entry: &mut ScheduleEntry, status: JobStatus) {
        entry.status = status;

        let attempts = i32::try_from(entry.attempts).unwrap_or(i32::MAX);
        if let Err(e) = self.store.update_status(entry.id, status, attempts).await {
            error!(job_id = %entry.id, status = %status, error = %e, "Failed to update job status");
        }

        self.notifier
            .publish(StatusEvent::new(entry.id, entry.job_type.clone(), status));
    }
}
