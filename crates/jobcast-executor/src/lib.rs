//! Task executor backends for the jobcast scheduler.
//!
//! Provides executor implementations for handing jobs off:
//! - HTTP client to the external durable task service (production)
//! - Logging executor (development)

pub mod http;
pub mod log;

pub use http::HttpTaskExecutor;
pub use jobcast_core::executor::{TaskExecutor, TaskSubmission};
pub use log::LogTaskExecutor;

use jobcast_config::ExecutorConfig;
use std::sync::Arc;

/// Build the executor selected by configuration.
pub fn from_config(config: &ExecutorConfig) -> jobcast_core::Result<Arc<dyn TaskExecutor>> {
    match config {
        ExecutorConfig::Http {
            endpoint,
            max_retry,
            timeout,
        } => Ok(Arc::new(HttpTaskExecutor::new(
            endpoint.clone(),
            *max_retry,
            *timeout,
        )?)),
        ExecutorConfig::Log => Ok(Arc::new(LogTaskExecutor::new())),
    }
}

