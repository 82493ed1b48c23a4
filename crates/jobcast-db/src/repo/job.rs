//! Job repository and status store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobcast_core::{Job, JobId, JobStatus, Priority};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::{DbError, DbResult};

/// A job row as stored in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: uuid::Uuid,
    user_id: Option<uuid::Uuid>,
    #[sqlx(rename = "type")]
    job_type: String,
    payload: serde_json::Value,
    status: String,
    priority: String,
    attempts: i32,
    run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: JobId::from_uuid(row.id),
            user_id: row.user_id,
            job_type: row.job_type,
            payload: row.payload,
            status: row.status,
            priority: row.priority,
            attempts: row.attempts,
            run_at: row.run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields supplied by the submission path when creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: Option<uuid::Uuid>,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub run_at: DateTime<Utc>,
}

/// Read-only status projection of a job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobStatusView {
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub priority: String,
    pub attempts: i32,
    pub run_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Insert a pending job. The insert trigger announces it to listeners.
    async fn create(&self, job: NewJob) -> DbResult<Job>;
    async fn get_by_id(&self, id: JobId) -> DbResult<Job>;
    async fn get_status(&self, id: JobId) -> DbResult<JobStatusView>;
    /// Jobs that are neither completed nor failed, earliest due first.
    async fn list_outstanding(&self) -> DbResult<Vec<Job>>;
}

/// Transactional persistence of dispatch outcomes.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Set status and attempt count of a job in a single transaction.
    ///
    /// The transaction is committed only if the row exists; otherwise it is
    /// rolled back and `DbError::NotFound` is returned.
    async fn update_status(&self, id: JobId, status: JobStatus, attempts: i32) -> DbResult<Job>;
}

/// PostgreSQL implementation of JobRepo and StatusStore.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn create(&self, job: NewJob) -> DbResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, user_id, type, payload, status, priority, attempts, run_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, 0, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(job.user_id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.priority.as_str())
        .bind(job.run_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: JobId) -> DbResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        Ok(row.into())
    }

    async fn get_status(&self, id: JobId) -> DbResult<JobStatusView> {
        let view = sqlx::query_as::<_, JobStatusView>(
            "SELECT type, status, priority, attempts, run_at FROM jobs WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        Ok(view)
    }

    async fn list_outstanding(&self) -> DbResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('pending', 'processing')
            ORDER BY run_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }
}

#[async_trait]
impl StatusStore for PgJobRepo {
    async fn update_status(&self, id: JobId, status: JobStatus, attempts: i32) -> DbResult<Job> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = $2, attempts = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(attempts)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping an uncommitted transaction rolls it back.
        let row = row.ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        tx.commit().await?;

        debug!(job_id = %id, status = %status, attempts, "Job status updated");
        Ok(row.into())
    }
}
