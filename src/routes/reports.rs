use axum::extract::{Json, Query, State};

use crate::{
    audit::ReportQuery,
    error::AppResult,
    models::IntegrityRecord,
    state::AppState,
};

pub async fn integrity_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Vec<IntegrityRecord>>> {
    Ok(Json(state.integrity_log.list(&query).await?))
}
