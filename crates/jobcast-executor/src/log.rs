//! Logging executor for local development.

use async_trait::async_trait;
use jobcast_core::Result;
use jobcast_core::executor::{TaskExecutor, TaskSubmission};
use tracing::info;

/// Accepts every task and logs it instead of handing it off.
#[derive(Debug, Default)]
pub struct LogTaskExecutor;

impl LogTaskExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for LogTaskExecutor {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn submit(&self, submission: &TaskSubmission) -> Result<()> {
        info!(
            job_id = %submission.job_id,
            job_type = %submission.job_type,
            payload = %submission.payload,
            "Task accepted (log executor)"
        );
        Ok(())
    }
}
