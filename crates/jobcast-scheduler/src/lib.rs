//! Due-time job scheduling for the jobcast scheduler.
//!
//! Keeps pending jobs in an in-memory priority queue ordered by due time
//! then priority, dispatches due jobs to the task executor with bounded
//! retries, and ingests new jobs from PostgreSQL change notifications.

pub mod listener;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use listener::{ChangeListener, ListenerError, ingest_notification};
pub use queue::{JobQueue, ScheduleEntry};
pub use scheduler::{DispatchOutcome, Scheduler};
