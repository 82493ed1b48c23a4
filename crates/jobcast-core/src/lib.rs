//! Core domain types and traits for the jobcast scheduler.
//!
//! This crate contains:
//! - Job identifiers and the durable job record
//! - Status and priority enums with their wire/database encodings
//! - The task executor trait used to hand work to the external service
//! - The status notifier trait used to publish status-change events

pub mod error;
pub mod executor;
pub mod id;
pub mod job;
pub mod notify;

pub use error::{Error, Result};
pub use executor::{TaskExecutor, TaskSubmission};
pub use id::JobId;
pub use job::{Job, JobStatus, Priority, StatusEvent};
pub use notify::StatusNotifier;
