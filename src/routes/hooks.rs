use axum::extract::{Json, State};
use axum::http::StatusCode;
use tracing::{error, info};

use crate::{
    auth::HookAccess,
    error::{AppError, AppResult},
    registry::HookSubmission,
    state::AppState,
};

use super::documents::{registered, RegisteredResponse};

pub async fn ingest(
    State(state): State<AppState>,
    _access: HookAccess,
    Json(submission): Json<HookSubmission>,
) -> AppResult<(StatusCode, Json<RegisteredResponse>)> {
    let document = state
        .registry
        .ingest_hook(submission)
        .await
        .map_err(|err| {
            error!(error = %err, "hook ingest failed");
            AppError::from(err)
        })?;
    info!(doc_id = %document.doc_id, "hook document ingested");
    Ok((StatusCode::CREATED, Json(registered(&state, document))))
}
