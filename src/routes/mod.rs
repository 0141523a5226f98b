use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod documents;
pub mod extraction;
pub mod health;
pub mod hooks;
pub mod reports;
pub mod resolve;

// Largest audio upload plus multipart framing.
const BODY_LIMIT_BYTES: usize = 110 * 1024 * 1024;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let docs_routes = Router::new()
        .route("/register", post(documents::register_document))
        .route(
            "/:doc_id",
            get(documents::get_document).patch(documents::patch_document),
        )
        .route("/:doc_id/verify", post(documents::verify_document))
        .route("/:doc_id/deliver", post(documents::deliver_document))
        .route("/:doc_id/sync-sha", post(documents::sync_sha))
        .route("/:doc_id/text", get(documents::document_text));

    Router::new()
        .route("/doc/:doc_id", get(resolve::resolve_document))
        .nest("/api/docs", docs_routes)
        .route("/api/extraction/enqueue", post(extraction::enqueue))
        .route("/api/reports/integrity", get(reports::integrity_report))
        .route("/api/hooks/ingest", post(hooks::ingest))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
}
