//! Task executor trait and submission type.
//!
//! A task executor hands a unit of work to an external durable
//! task-execution service and reports only whether the hand-off worked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{JobId, Result};

/// A unit of work submitted to the external task service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// The job this task belongs to.
    pub job_id: JobId,
    /// Job type tag, used by the task service to route the payload.
    pub job_type: String,
    /// Opaque payload, interpreted only by the downstream handler.
    pub payload: serde_json::Value,
}

/// Trait for task executors.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Enqueue a task with the external service.
    ///
    /// Implementations apply their own fixed retry budget and timeout to the
    /// hand-off; the scheduler's retry policy sits on top of that.
    ///
    /// `Ok(())` means the service accepted the task. Any error is treated by
    /// the scheduler as a failed attempt.
    async fn submit(&self, submission: &TaskSubmission) -> Result<()>;
}
