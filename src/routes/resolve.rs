use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{
    auth::{authorize_client_read, ClientToken},
    error::AppResult,
    state::AppState,
};

pub async fn resolve_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    token: ClientToken,
) -> AppResult<Response> {
    let document = state.registry.get(&doc_id).await?;
    authorize_client_read(&state.config, &token, &document)?;
    let location = state.registry.resolve(&document).await?;
    debug!(doc_id = %doc_id, "permalink resolved");
    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response())
}
