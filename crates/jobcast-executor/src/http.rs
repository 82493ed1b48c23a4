//! HTTP client for the external durable task service.

use async_trait::async_trait;
use jobcast_core::executor::{TaskExecutor, TaskSubmission};
use jobcast_core::{Error, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Body posted to the task service.
#[derive(Debug, Serialize)]
struct EnqueueRequest<'a> {
    job_id: String,
    #[serde(rename = "type")]
    job_type: &'a str,
    payload: &'a serde_json::Value,
    max_retry: u32,
    timeout_secs: u64,
}

/// Enqueues tasks with an external service over HTTP.
///
/// The service owns at-least-once delivery to its downstream handler; this
/// client hands it a fixed retry budget and timeout with every task and
/// bounds the enqueue request itself by the same timeout.
pub struct HttpTaskExecutor {
    client: reqwest::Client,
    endpoint: String,
    max_retry: u32,
    timeout: Duration,
}

impl HttpTaskExecutor {
    pub fn new(endpoint: impl Into<String>, max_retry: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_retry,
            timeout,
        })
    }
}

#[async_trait]
impl TaskExecutor for HttpTaskExecutor {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, submission: &TaskSubmission) -> Result<()> {
        let body = EnqueueRequest {
            job_id: submission.job_id.to_string(),
            job_type: &submission.job_type,
            payload: &submission.payload,
            max_retry: self.max_retry,
            timeout_secs: self.timeout.as_secs(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("task service did not answer: {}", e))
                } else {
                    Error::ExecutionFailed(format!("task service unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(job_id = %submission.job_id, status = %status, body = %text, "Task service rejected task");
            return Err(Error::ExecutionFailed(format!(
                "task service returned {}",
                status
            )));
        }

        debug!(job_id = %submission.job_id, "Task accepted by task service");
        Ok(())
    }
}
