use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    extraction::{Extraction, Source, SourceKind},
    jobs::{ExtractTextPayload, Job, JOB_EXTRACT_TEXT, MAX_ATTEMPTS},
    models::{DocumentPatch, OriginMeta},
    registry::fetch_bytes,
    state::AppState,
};

use super::{JobExecution, JobHandler};

const RETRY_DELAY: Duration = Duration::from_secs(30);

pub struct ExtractTextJob;

impl ExtractTextJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExtractTextJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ExtractTextJob {
    fn job_type(&self) -> &'static str {
        JOB_EXTRACT_TEXT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: ExtractTextPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid extraction payload: {err}"),
                }
            }
        };
        let registry = &state.registry;

        let document = match registry.store().find(&payload.doc_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                return JobExecution::Failed {
                    error: format!("document {} not found", payload.doc_id),
                }
            }
            Err(err) => {
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error: err.to_string(),
                }
            }
        };

        let bytes = match fetch_bytes(
            registry.storage().as_ref(),
            &document.storage_ref,
            registry.storage_timeout(),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(error) if job.attempts < MAX_ATTEMPTS => {
                warn!(doc_id = %document.doc_id, %error, "could not fetch document for extraction");
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error: error.to_string(),
                };
            }
            Err(error) => {
                warn!(
                    doc_id = %document.doc_id,
                    %error,
                    attempts = job.attempts,
                    "giving up on fetching document for extraction"
                );
                let extraction = state.extractor.unreadable(
                    payload.mode,
                    error.is_timeout(),
                    error.to_string(),
                );
                return match store_extraction(&state, &document.doc_id, extraction).await {
                    JobExecution::Success => JobExecution::Failed {
                        error: error.to_string(),
                    },
                    other => other,
                };
            }
        };

        let name = document
            .origin_meta
            .original_filename()
            .unwrap_or(&document.title)
            .to_string();
        let source = Source {
            kind: SourceKind::detect(&bytes, document.origin_meta.content_type(), Some(&name)),
            bytes,
        };
        let extraction = state.extractor.extract(&source, payload.mode).await;
        store_extraction(&state, &document.doc_id, extraction).await
    }
}

async fn store_extraction(state: &AppState, doc_id: &str, extraction: Extraction) -> JobExecution {
    let info_value = match serde_json::to_value(&extraction.info) {
        Ok(value) => value,
        Err(err) => {
            return JobExecution::Failed {
                error: format!("could not encode diagnostics: {err}"),
            }
        }
    };
    let mut meta = OriginMeta::new();
    meta.insert(OriginMeta::OCR_INFO, info_value);
    let patch = DocumentPatch {
        extracted_text: Some(extraction.text),
        origin_meta: Some(meta),
        ..DocumentPatch::default()
    };

    match state.registry.store().apply_patch(doc_id, patch).await {
        Ok(Some(_)) => {
            info!(
                doc_id,
                method = extraction.info.method.map(|m| m.as_str()).unwrap_or("none"),
                pages = extraction.info.pages,
                "extracted text stored"
            );
            JobExecution::Success
        }
        Ok(None) => JobExecution::Failed {
            error: format!("document {doc_id} disappeared during extraction"),
        },
        Err(err) => JobExecution::Retry {
            delay: RETRY_DELAY,
            error: err.to_string(),
        },
    }
}
