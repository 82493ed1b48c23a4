//! Fakes shared by the scheduler and listener tests.

use async_trait::async_trait;
use chrono::Utc;
use jobcast_core::{
    Error, Job, JobId, JobStatus, StatusEvent, StatusNotifier, TaskExecutor, TaskSubmission,
};
use jobcast_db::{DbError, DbResult, JobRepo, JobStatusView, NewJob, StatusStore};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Poll `cond` until it holds, panicking after five seconds.
pub async fn eventually(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within 5s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

enum Script {
    AlwaysOk,
    AlwaysErr,
    FailOnce(JobId),
}

/// Executor whose answers follow a fixed script and which records the
/// order of submissions.
pub struct ScriptedExecutor {
    script: Script,
    submitted: Mutex<Vec<JobId>>,
}

impl ScriptedExecutor {
    fn with(script: Script) -> Self {
        Self {
            script,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::with(Script::AlwaysOk)
    }

    pub fn always_err() -> Self {
        Self::with(Script::AlwaysErr)
    }

    /// Fails the first submission of `id`, accepts everything else.
    pub fn failing_once(id: JobId) -> Self {
        Self::with(Script::FailOnce(id))
    }

    pub fn submitted(&self) -> Vec<JobId> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, submission: &TaskSubmission) -> jobcast_core::Result<()> {
        let previous = {
            let mut submitted = self.submitted.lock().unwrap();
            let previous = submitted.iter().filter(|id| **id == submission.job_id).count();
            submitted.push(submission.job_id);
            previous
        };

        match self.script {
            Script::AlwaysOk => Ok(()),
            Script::AlwaysErr => Err(Error::ExecutionFailed("scripted failure".to_string())),
            Script::FailOnce(id) if id == submission.job_id && previous == 0 => {
                Err(Error::ExecutionFailed("scripted failure".to_string()))
            }
            Script::FailOnce(_) => Ok(()),
        }
    }
}

/// Notifier that keeps every published event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn publish(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory job table implementing both repository traits.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    updates: Mutex<Vec<(JobId, JobStatus, i32)>>,
    fail_updates: Mutex<bool>,
}

impl MemoryJobStore {
    pub fn insert_job(&self, status: &str, priority: &str) -> JobId {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            user_id: None,
            job_type: "send_email".to_string(),
            payload: serde_json::json!({"recipient": "a@example.com"}),
            status: status.to_string(),
            priority: priority.to_string(),
            attempts: 0,
            run_at: now,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        self.jobs.lock().unwrap().insert(id, job);
        id
    }

    /// Make every subsequent status update fail.
    pub fn fail_updates(&self, fail: bool) {
        *self.fail_updates.lock().unwrap() = fail;
    }

    /// Status updates recorded for a job, in order.
    pub fn updates_for(&self, id: JobId) -> Vec<(JobStatus, i32)> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _, _)| *job_id == id)
            .map(|(_, status, attempts)| (*status, *attempts))
            .collect()
    }
}

#[async_trait]
impl JobRepo for MemoryJobStore {
    async fn create(&self, new: NewJob) -> DbResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            user_id: new.user_id,
            job_type: new.job_type,
            payload: new.payload,
            status: JobStatus::Pending.to_string(),
            priority: new.priority.to_string(),
            attempts: 0,
            run_at: new.run_at,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_by_id(&self, id: JobId) -> DbResult<Job> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }

    async fn get_status(&self, id: JobId) -> DbResult<JobStatusView> {
        let job = self.get_by_id(id).await?;
        Ok(JobStatusView {
            job_type: job.job_type,
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            run_at: job.run_at,
        })
    }

    async fn list_outstanding(&self) -> DbResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == "pending" || j.status == "processing")
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.run_at);
        Ok(jobs)
    }
}

#[async_trait]
impl StatusStore for MemoryJobStore {
    async fn update_status(&self, id: JobId, status: JobStatus, attempts: i32) -> DbResult<Job> {
        self.updates.lock().unwrap().push((id, status, attempts));

        if *self.fail_updates.lock().unwrap() {
            return Err(DbError::NotFound(format!("job {}", id)));
        }

        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        job.status = status.to_string();
        job.attempts = attempts;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}
