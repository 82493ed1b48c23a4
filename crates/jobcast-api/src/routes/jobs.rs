//! Job submission and status endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use jobcast_core::{Job, JobId, Priority};
use jobcast_db::{JobRepo, JobStatusView, NewJob};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/{id}", get(get_job))
        .route("/{id}/status", get(get_job_status))
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: String,
    #[serde(rename = "type")]
    job_type: String,
    payload: serde_json::Value,
    status: String,
    priority: String,
    attempts: i32,
    run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type,
            payload: job.payload,
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            run_at: job.run_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    #[serde(rename = "type")]
    job_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    priority: Option<String>,
    run_at: Option<String>,
}

impl CreateJobRequest {
    fn into_new_job(self, now: DateTime<Utc>) -> Result<NewJob, ApiError> {
        let job_type = self.job_type.trim().to_string();
        if job_type.is_empty() {
            return Err(ApiError::BadRequest("type must not be empty".to_string()));
        }

        let priority = match self.priority.as_deref() {
            Some(p) => p.parse::<Priority>()?,
            None => Priority::default(),
        };

        let run_at = match self.run_at.as_deref() {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map_err(|e| ApiError::BadRequest(format!("invalid run_at '{}': {}", s, e)))?
                .with_timezone(&Utc),
            None => now,
        };

        Ok(NewJob {
            user_id: None,
            job_type,
            payload: self.payload,
            priority,
            run_at,
        })
    }
}

fn parse_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id '{}'", raw)))
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let new_job = req.into_new_job(Utc::now())?;
    let job = state.job_repo.create(new_job).await?;
    info!(job_id = %job.id, job_type = %job.job_type, priority = %job.priority, "Job submitted");
    Ok(Json(job.into()))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id = parse_id(&id)?;
    let job = state.job_repo.get_by_id(id).await?;
    Ok(Json(job.into()))
}

async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let id = parse_id(&id)?;
    let view = state.job_repo.get_status(id).await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BroadcastHub;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use jobcast_config::HubConfig;
    use jobcast_core::JobStatus;
    use jobcast_db::{DbError, DbResult};
    use serde_json::{Value, json};
    use sqlx::postgres::PgPoolOptions;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryRepo {
        jobs: Mutex<HashMap<JobId, Job>>,
    }

    #[async_trait]
    impl JobRepo for MemoryRepo {
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
            Ok(Vec::new())
        }
    }

    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://jobcast@localhost/jobcast")
            .unwrap();
        let (hub, _coordinator) = BroadcastHub::new(&HubConfig::default());
        let state = AppState::new(pool, Arc::new(MemoryRepo::default()), hub);
        crate::routes::router(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_job(body: Value) -> Request<Body> {
        Request::post("/api/v1/jobs")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_job_defaults() {
        let app = app();

        let (status, body) = send(
            &app,
            post_job(json!({"type": "send_email", "payload": {"recipient": "a@example.com"}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "send_email");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["priority"], "medium");
        assert_eq!(body["attempts"], 0);
        assert_eq!(body["payload"]["recipient"], "a@example.com");
    }

    #[tokio::test]
    async fn test_create_job_rejects_empty_type() {
        let (status, body) = send(&app(), post_job(json!({"type": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("type"));
    }

    #[tokio::test]
    async fn test_create_job_rejects_unknown_priority() {
        let (status, _) = send(&app(), post_job(json!({"type": "x", "priority": "urgent"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_job_rejects_bad_run_at() {
        let (status, body) =
            send(&app(), post_job(json!({"type": "x", "run_at": "tomorrow"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("run_at"));
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let app = app();
        let (_, created) = send(
            &app,
            post_job(json!({
                "type": "report",
                "priority": "high",
                "run_at": "2030-01-01T00:00:00Z"
            })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = send(&app, get_request(&format!("/api/v1/jobs/{}/status", id))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "report");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["priority"], "high");
        assert_eq!(body["attempts"], 0);
        assert_eq!(body["run_at"], "2030-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let uri = format!("/api/v1/jobs/{}", JobId::new());
        let (status, _) = send(&app(), get_request(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_id_is_400() {
        let (status, _) = send(&app(), get_request("/api/v1/jobs/not-a-uuid/status")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
