use axum::extract::{Json, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    extraction::ExtractionMode,
    jobs::JobQueueError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub doc_id: String,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub queued: bool,
    pub doc_id: String,
    pub mode: ExtractionMode,
}

pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> AppResult<(StatusCode, Json<EnqueueResponse>)> {
    if !state.config.extraction.enabled {
        return Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "text extraction is disabled",
        ));
    }
    let mode: ExtractionMode = request
        .mode
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(AppError::bad_request)?;
    let document = state.registry.get(&request.doc_id).await?;

    let job_id = state
        .jobs
        .enqueue_extraction(&document.doc_id, mode)
        .map_err(|err| match err {
            JobQueueError::Full => AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            JobQueueError::Closed => AppError::internal(err),
        })?;
    info!(doc_id = %document.doc_id, %job_id, mode = mode.as_str(), "extraction queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            queued: true,
            doc_id: document.doc_id,
            mode,
        }),
    ))
}
