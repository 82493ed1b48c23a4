//! API server for the jobcast scheduler.
//!
//! Provides the job submission REST API, the live status WebSocket and the
//! broadcast hub that feeds it.

pub mod error;
pub mod hub;
pub mod routes;
pub mod state;
pub mod ws;

pub use hub::{BroadcastHub, HubCoordinator, ObserverId};
pub use state::AppState;
