use std::collections::BTreeSet;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::auth::{authorize_client_read, ClientToken};
use crate::error::{AppError, AppResult};
use crate::models::{Document, Origin, OriginMeta};
use crate::registry::{
    parse_origin_meta_field, parse_patch, parse_tags_field, Delivery, NewDocument, Resync, Upload,
    Verification,
};
use crate::state::AppState;

#[derive(Serialize, Debug)]
pub struct RegisteredResponse {
    pub doc_id: String,
    pub permalink: String,
    pub sha256: String,
    pub storage: String,
    pub storage_ref: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeliverRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct TextResponse {
    pub doc_id: String,
    pub text: Option<String>,
    pub ocr_info: Option<Value>,
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid {name} field: {err}")))
}

pub async fn register_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<RegisteredResponse>)> {
    let mut matter_id = String::new();
    let mut class = String::new();
    let mut title = String::new();
    let mut origin = Origin::Upload;
    let mut tags: BTreeSet<String> = BTreeSet::new();
    let mut origin_meta = OriginMeta::new();
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("failed to read file bytes: {err}")))?;
                upload = Some(Upload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some("matter_id") => matter_id = text_field(field).await?,
            Some("class") => class = text_field(field).await?,
            Some("title") => title = text_field(field).await?,
            Some("origin") => {
                let raw = text_field(field).await?;
                if !raw.trim().is_empty() {
                    origin = raw.parse().map_err(AppError::bad_request)?;
                }
            }
            Some("tags") => tags = parse_tags_field(Some(&text_field(field).await?))?,
            Some("origin_meta") => {
                origin_meta = parse_origin_meta_field(Some(&text_field(field).await?))?
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::bad_request("file field is required"))?;
    let document = state
        .registry
        .register(NewDocument {
            matter_id,
            class,
            title,
            origin,
            tags,
            origin_meta,
            upload,
        })
        .await
        .map_err(|err| {
            error!(error = %err, "document registration failed");
            AppError::from(err)
        })?;

    Ok((StatusCode::CREATED, Json(registered(&state, document))))
}

pub(crate) fn registered(state: &AppState, document: Document) -> RegisteredResponse {
    RegisteredResponse {
        permalink: state.registry.permalink(&document.doc_id),
        doc_id: document.doc_id,
        sha256: document.sha256,
        storage: document.storage,
        storage_ref: document.storage_ref,
    }
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    token: ClientToken,
) -> AppResult<Json<Document>> {
    let document = state.registry.get(&doc_id).await?;
    authorize_client_read(&state.config, &token, &document)?;
    Ok(Json(document))
}

pub async fn patch_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let patch = parse_patch(body)?;
    let document = state.registry.patch(&doc_id, patch).await?;
    info!(doc_id = %document.doc_id, "document patched");
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn verify_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> AppResult<Json<Verification>> {
    Ok(Json(state.registry.verify(&doc_id).await?))
}

pub async fn deliver_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    body: Option<Json<DeliverRequest>>,
) -> AppResult<Json<Delivery>> {
    let message = body.and_then(|Json(request)| request.message);
    Ok(Json(state.registry.deliver(&doc_id, message).await?))
}

pub async fn sync_sha(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> AppResult<Json<Resync>> {
    Ok(Json(state.registry.resync_hash(&doc_id).await?))
}

pub async fn document_text(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    token: ClientToken,
) -> AppResult<Json<TextResponse>> {
    let document = state.registry.get(&doc_id).await?;
    authorize_client_read(&state.config, &token, &document)?;
    Ok(Json(TextResponse {
        ocr_info: document.origin_meta.get(OriginMeta::OCR_INFO).cloned(),
        text: document.extracted_text,
        doc_id: document.doc_id,
    }))
}
