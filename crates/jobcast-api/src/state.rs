//! Application state.

use jobcast_db::JobRepo;
use sqlx::PgPool;
use std::sync::Arc;

use crate::BroadcastHub;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub job_repo: Arc<dyn JobRepo>,
    pub hub: BroadcastHub,
}

impl AppState {
    pub fn new(pool: PgPool, job_repo: Arc<dyn JobRepo>, hub: BroadcastHub) -> Self {
        Self {
            pool,
            job_repo,
            hub,
        }
    }
}
