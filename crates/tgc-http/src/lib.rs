//! HTTP control surface for clone jobs.
//!
//! - `GET /` liveness
//! - `POST /start-clone` starts a job and returns its id at once
//! - `POST /stop-clone?jobId=` cancels it
//! - `GET /status?jobId=` and `GET /jobs` observe jobs

pub mod errors;

use std::{future::Future, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use tgc_core::{
    config::CloneDefaults,
    domain::{AccountId, ChannelId, JobId, MessageId},
    job::{CloneRequest, JobState, JobSummary},
    registry::JobRegistry,
};

pub use errors::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub defaults: CloneDefaults,
    pub default_account: Option<AccountId>,
}

/// Body of `POST /start-clone`. Snake-case names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCloneBody {
    #[serde(default, alias = "phone")]
    pub account: Option<String>,
    #[serde(alias = "source_chat_id", alias = "source_channel_id")]
    pub source_channel_id: i64,
    #[serde(alias = "target_chat_id", alias = "target_channel_id")]
    pub target_channel_id: i64,
    #[serde(alias = "clone_start_id", alias = "clone_floor_id")]
    pub clone_floor_id: i64,
    #[serde(default, alias = "delay_seconds")]
    pub delay_seconds: Option<f64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, alias = "cooldown_every")]
    pub cooldown_every: Option<u64>,
    #[serde(default, alias = "cooldown_seconds")]
    pub cooldown_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCloneResponse {
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    #[serde(alias = "job_id", alias = "runner_id")]
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCloneResponse {
    pub status: &'static str,
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub total_jobs: usize,
    pub jobs: Vec<JobSummary>,
}

impl StartCloneBody {
    /// Validate and merge with the service defaults.
    pub fn into_request(
        self,
        defaults: &CloneDefaults,
        default_account: Option<&AccountId>,
    ) -> Result<CloneRequest, ApiError> {
        let account = match self.account.map(|a| a.trim().to_string()) {
            Some(a) if !a.is_empty() => AccountId(a),
            _ => default_account.cloned().ok_or_else(|| {
                ApiError::BadRequest(
                    "account is required (no default account configured)".to_string(),
                )
            })?,
        };

        if self.source_channel_id == self.target_channel_id {
            return Err(ApiError::BadRequest(
                "sourceChannelId and targetChannelId must differ".to_string(),
            ));
        }
        if self.clone_floor_id < 0 {
            return Err(ApiError::BadRequest(
                "cloneFloorId must be >= 0".to_string(),
            ));
        }

        let mut req = CloneRequest::new(
            account,
            ChannelId(self.source_channel_id),
            ChannelId(self.target_channel_id),
            MessageId(self.clone_floor_id),
            defaults,
        );

        if let Some(secs) = self.delay_seconds {
            req.per_message_delay = Duration::try_from_secs_f64(secs).map_err(|_| {
                ApiError::BadRequest(format!("delaySeconds must be a non-negative number, got {secs}"))
            })?;
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > defaults.max_page_size {
                return Err(ApiError::BadRequest(format!(
                    "limit must be between 1 and {}",
                    defaults.max_page_size
                )));
            }
            req.page_size = limit;
        }
        if let Some(every) = self.cooldown_every {
            req.cooldown_every = every;
        }
        if let Some(secs) = self.cooldown_seconds {
            req.cooldown = Duration::from_secs(secs);
        }

        Ok(req)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/start-clone", post(start_clone))
        .route("/stop-clone", post(stop_clone))
        .route("/status", get(job_status))
        .route("/jobs", get(list_jobs))
        .with_state(state)
}

/// Serve the control surface until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "control surface listening");
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "working" }))
}

async fn start_clone(
    State(state): State<AppState>,
    body: Result<Json<StartCloneBody>, JsonRejection>,
) -> Result<Json<StartCloneResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let req = body.into_request(&state.defaults, state.default_account.as_ref())?;
    let job_id = state.registry.create(req).await;
    Ok(Json(StartCloneResponse { job_id }))
}

async fn stop_clone(
    State(state): State<AppState>,
    query: Result<Query<JobQuery>, QueryRejection>,
) -> Result<Json<StopCloneResponse>, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let job_id = JobId(q.job_id);
    state.registry.cancel(&job_id).await?;
    Ok(Json(StopCloneResponse {
        status: "stopped",
        job_id,
    }))
}

async fn job_status(
    State(state): State<AppState>,
    query: Result<Query<JobQuery>, QueryRejection>,
) -> Result<Json<JobState>, ApiError> {
    let Query(q) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let snapshot = state.registry.status(&JobId(q.job_id)).await?;
    Ok(Json(snapshot))
}

async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs = state.registry.list().await;
    Json(JobListResponse {
        total_jobs: jobs.len(),
        jobs,
    })
}
