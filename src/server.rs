use crate::{
    backends::{BackendAvailability, BackendKind, BackendRegistry},
    jobs::{Job, JobStatus, JobStatusResponse, JobStore},
    timeline::{self, RenderScript},
    types::{AnimationSpecs, VideoResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: BackendRegistry,
    pub store: JobStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub backend: Option<String>,
    pub specs: AnimationSpecs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/backends", get(list_backends))
        .route("/backends/recommended", post(recommend_backend))
        .route("/timeline", post(preview_timeline))
        .route("/render", post(render))
        .route("/render/jobs", post(submit_job))
        .route("/render/jobs/:id", get(job_status).delete(cancel_job))
        .with_state(state)
}

fn resolve_backend(registry: &BackendRegistry, req: &RenderRequest) -> Result<BackendKind, (StatusCode, String)> {
    match req.backend.as_deref() {
        Some(id) => id.parse().map_err(|e: crate::backends::UnknownBackend| (StatusCode::BAD_REQUEST, e.to_string())),
        None => Ok(registry.recommended_backend(&req.specs)),
    }
}

fn parse_id(id: &str) -> Result<Uuid, (StatusCode, String)> {
    Uuid::parse_str(id).map_err(|_| (StatusCode::BAD_REQUEST, "invalid id".into()))
}

async fn list_backends(State(state): State<AppState>) -> Json<Vec<BackendAvailability>> {
    Json(state.registry.available_backends())
}

async fn recommend_backend(State(state): State<AppState>, Json(specs): Json<AnimationSpecs>) -> Json<Value> {
    Json(json!({ "backend": state.registry.recommended_backend(&specs) }))
}

async fn preview_timeline(Json(specs): Json<AnimationSpecs>) -> Json<RenderScript> {
    Json(timeline::compile(&specs))
}

async fn render(State(state): State<AppState>, Json(req): Json<RenderRequest>) -> ApiResult<VideoResult> {
    let kind = resolve_backend(&state.registry, &req)?;
    Ok(Json(state.registry.dispatch_kind(&req.specs, kind, &CancellationToken::new()).await))
}

async fn submit_job(State(state): State<AppState>, Json(req): Json<RenderRequest>) -> ApiResult<SubmitResponse> {
    let kind = resolve_backend(&state.registry, &req)?;
    let job = Job::new(kind);
    let cancel = job.cancel.clone();
    let job_id = state.store.insert(job).await;
    info!(%job_id, backend = %kind, "queued background render");

    let AppState { registry, store } = state;
    tokio::spawn(async move {
        store.update(&job_id, |j| if j.status == JobStatus::Pending { j.status = JobStatus::Running }).await;
        let result = registry.dispatch_kind(&req.specs, kind, &cancel).await;
        store.update(&job_id, |j| j.finish(result)).await;
    });

    Ok(Json(SubmitResponse { job_id }))
}

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<JobStatusResponse> {
    let uid = parse_id(&id)?;
    match state.store.get(&uid).await {
        Some(job) => Ok(Json(job.to_status_response())),
        None => Err((StatusCode::NOT_FOUND, "not found".into())),
    }
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, String)> {
    let uid = parse_id(&id)?;
    if state.store.cancel(&uid).await {
        info!(job_id = %uid, "cancelled background render");
        Ok(StatusCode::NO_CONTENT)
    } else if state.store.get(&uid).await.is_some() {
        Err((StatusCode::CONFLICT, "job already finished".into()))
    } else {
        Err((StatusCode::NOT_FOUND, "not found".into()))
    }
}
