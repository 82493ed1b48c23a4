//! Database change listener.
//!
//! Subscribes to the jobs notification channel with `LISTEN`, resolves each
//! notified job id into a stored job and hands it to the scheduler.

use jobcast_core::JobId;
use jobcast_db::{JOB_NOTIFY_CHANNEL, JobRepo};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Scheduler;

/// Pause after a failed receive before trying again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fatal listener failures. Once returned, no new job is ingested.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to connect listener: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to LISTEN on channel {channel}: {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Bridges database notifications into scheduling entries.
pub struct ChangeListener {
    listener: PgListener,
    repo: Arc<dyn JobRepo>,
    scheduler: Arc<Scheduler>,
}

impl ChangeListener {
    /// Connect and `LISTEN` on the jobs channel.
    ///
    /// Notifications sent once this returns are held on the connection until
    /// [`ChangeListener::run`] reads them, so a startup scan of outstanding
    /// jobs made after subscribing cannot miss an insert. Failing to connect
    /// or subscribe is fatal.
    pub async fn subscribe(
        pool: &PgPool,
        repo: Arc<dyn JobRepo>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self, ListenerError> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(ListenerError::Connect)?;
        listener
            .listen(JOB_NOTIFY_CHANNEL)
            .await
            .map_err(|source| ListenerError::Subscribe {
                channel: JOB_NOTIFY_CHANNEL.to_string(),
                source,
            })?;

        info!(channel = JOB_NOTIFY_CHANNEL, "Listening for job notifications");

        Ok(Self {
            listener,
            repo,
            scheduler,
        })
    }

    /// Ingest notifications until cancelled.
    ///
    /// Errors while receiving are logged; the connection is re-established
    /// and re-subscribed by the next receive.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.listener.recv() => match received {
                    Ok(notification) => {
                        ingest_notification(
                            self.repo.as_ref(),
                            &self.scheduler,
                            notification.payload(),
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(channel = JOB_NOTIFY_CHANNEL, error = %e, "Error while waiting for notification");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                        }
                    }
                },
            }
        }

        info!(channel = JOB_NOTIFY_CHANNEL, "Listener stopped");
    }
}

/// Resolve one notification payload and schedule the job it names.
///
/// Malformed ids, missing rows and terminal jobs are logged and dropped.
/// Returns the id of the job that was scheduled, if any.
pub async fn ingest_notification(
    repo: &dyn JobRepo,
    scheduler: &Scheduler,
    payload: &str,
) -> Option<JobId> {
    debug!(payload = %payload, "Received job notification");

    let id: JobId = match payload.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!(payload = %payload, error = %e, "Invalid job ID in notification");
            return None;
        }
    };

    let job = match repo.get_by_id(id).await {
        Ok(job) => job,
        Err(e) => {
            error!(job_id = %id, error = %e, "Failed to fetch notified job");
            return None;
        }
    };

    if scheduler.schedule_job(&job).await {
        info!(job_id = %id, priority = %job.priority, run_at = %job.run_at, "Enqueued job");
        Some(id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryJobStore, RecordingNotifier, ScriptedExecutor};
    use jobcast_config::SchedulerConfig;

    fn scheduler(store: Arc<MemoryJobStore>) -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(ScriptedExecutor::always_ok()),
            store,
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[tokio::test]
    async fn test_notification_schedules_job() {
        let store = Arc::new(MemoryJobStore::default());
        let id = store.insert_job("pending", "high");
        let scheduler = scheduler(store.clone());

        let scheduled = ingest_notification(store.as_ref(), &scheduler, &id.to_string()).await;

        assert_eq!(scheduled, Some(id));
        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_id_is_dropped() {
        let store = Arc::new(MemoryJobStore::default());
        let scheduler = scheduler(store.clone());

        let scheduled = ingest_notification(store.as_ref(), &scheduler, "not-a-uuid").await;

        assert!(scheduled.is_none());
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_row_is_dropped() {
        let store = Arc::new(MemoryJobStore::default());
        let scheduler = scheduler(store.clone());
        let existing = store.insert_job("pending", "low");
        ingest_notification(store.as_ref(), &scheduler, &existing.to_string()).await;

        let deleted = JobId::new();
        let scheduled = ingest_notification(store.as_ref(), &scheduler, &deleted.to_string()).await;

        assert!(scheduled.is_none());
        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_scheduled() {
        let store = Arc::new(MemoryJobStore::default());
        let id = store.insert_job("completed", "high");
        let scheduler = scheduler(store.clone());

        let scheduled = ingest_notification(store.as_ref(), &scheduler, &id.to_string()).await;

        assert!(scheduled.is_none());
        assert!(scheduler.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_notification_queues_once() {
        let store = Arc::new(MemoryJobStore::default());
        let id = store.insert_job("pending", "medium");
        let scheduler = scheduler(store.clone());

        ingest_notification(store.as_ref(), &scheduler, &id.to_string()).await;
        ingest_notification(store.as_ref(), &scheduler, &id.to_string()).await;

        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn test_job_inserted_after_recovery_scan_is_scheduled_from_notification() {
        let store = Arc::new(MemoryJobStore::default());
        let existing = store.insert_job("pending", "low");
        let scheduler = scheduler(store.clone());

        assert_eq!(scheduler.recover(store.as_ref()).await.unwrap(), 1);
        let late = store.insert_job("pending", "high");
        ingest_notification(store.as_ref(), &scheduler, &late.to_string()).await;

        assert!(scheduler.contains(existing).await);
        assert!(scheduler.contains(late).await);
        assert_eq!(scheduler.len().await, 2);
    }

    #[tokio::test]
    async fn test_job_seen_by_recovery_and_notification_queues_once() {
        let store = Arc::new(MemoryJobStore::default());
        let id = store.insert_job("pending", "medium");
        let scheduler = scheduler(store.clone());

        // Inserted after LISTEN but before the scan: both paths see it.
        scheduler.recover(store.as_ref()).await.unwrap();
        ingest_notification(store.as_ref(), &scheduler, &id.to_string()).await;

        assert_eq!(scheduler.len().await, 1);
    }

    /// Requires PostgreSQL. Run with: DATABASE_URL=... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_insert_between_subscribe_and_run_is_ingested() {
        use jobcast_core::Priority;
        use jobcast_db::{NewJob, PgJobRepo, create_pool, run_migrations};

        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url, 4).await.expect("Should connect");
        run_migrations(&pool).await.expect("Should migrate");
        let repo = Arc::new(PgJobRepo::new(pool.clone()));
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(ScriptedExecutor::always_ok()),
            repo.clone(),
            Arc::new(RecordingNotifier::default()),
        ));

        let listener = ChangeListener::subscribe(&pool, repo.clone(), scheduler.clone())
            .await
            .expect("Should subscribe");

        let job = repo
            .create(NewJob {
                user_id: None,
                job_type: "send_email".to_string(),
                payload: serde_json::json!({}),
                priority: Priority::High,
                run_at: chrono::Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.run(cancel.clone()));

        let mut queued = false;
        for _ in 0..500 {
            if scheduler.contains(job.id).await {
                queued = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();
        assert!(queued, "notification sent before run() was lost");
    }
}
