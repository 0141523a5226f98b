use std::{collections::BTreeSet, path::Path, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{Document, DocumentPatch, DocumentStatus, Origin, OriginMeta},
    notify::{EventKind, NotificationEvent, Notifier},
    storage::{document_key, ObjectStorage},
    store::{DocumentStore, StoreError},
};

pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
pub const MAX_AUDIO_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const HOOK_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub const ALLOWED_CONTENT_TYPES: [&str; 8] = [
    "application/pdf",
    DOCX_CONTENT_TYPE,
    "text/plain",
    "image/png",
    "image/jpeg",
    "audio/wav",
    "audio/x-wav",
    "audio/mpeg",
];

pub const ALLOWED_EXTENSIONS: [&str; 8] = ["pdf", "docx", "txt", "png", "jpg", "jpeg", "wav", "mp3"];

const PATCHABLE_FIELDS: [&str; 6] = ["title", "storage", "storage_ref", "status", "tags", "origin_meta"];
const IMMUTABLE_FIELDS: [&str; 4] = ["doc_id", "sha256", "created_at", "updated_at"];

// Column widths of the `documents` table.
const MAX_MATTER_ID_CHARS: usize = 128;
const MAX_CLASS_CHARS: usize = 64;
const MAX_TITLE_CHARS: usize = 255;
const MAX_STORAGE_CHARS: usize = 32;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("file too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("unsupported file type: {0}")]
    UnsupportedMediaType(String),
    #[error("document {0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn extension(&self) -> Option<String> {
        self.filename.as_deref().and_then(extension_of)
    }

    fn size_limit(&self, title: &str) -> usize {
        if self.is_audio(title) {
            MAX_AUDIO_UPLOAD_BYTES
        } else {
            MAX_UPLOAD_BYTES
        }
    }

    fn is_audio(&self, title: &str) -> bool {
        let audio_type = self
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().starts_with("audio/"))
            .unwrap_or(false);
        let audio_ext = |ext: Option<String>| matches!(ext.as_deref(), Some("wav" | "mp3"));
        audio_type || audio_ext(self.extension()) || audio_ext(extension_of(title))
    }
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub matter_id: String,
    pub class: String,
    pub title: String,
    pub origin: Origin,
    pub tags: BTreeSet<String>,
    pub origin_meta: OriginMeta,
    pub upload: Upload,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct HookSubmission {
    #[serde(default)]
    pub matter_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "class")]
    pub class: Option<String>,
    #[serde(default)]
    pub file_base64: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub origin_meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub doc_id: String,
    #[serde(rename = "match")]
    pub matches: bool,
    pub sha256_current: Option<String>,
    pub sha256_stored: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub ok: bool,
    pub doc_id: String,
    pub permalink: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resync {
    pub doc_id: String,
    pub sha256_previous: String,
    pub sha256_updated: String,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentCheck {
    pub sha256_current: Option<String>,
    pub error: Option<String>,
}

impl ContentCheck {
    pub fn matches(&self, stored: &str) -> bool {
        self.error.is_none() && self.sha256_current.as_deref() == Some(stored)
    }
}

pub async fn check_content(
    storage: &dyn ObjectStorage,
    document: &Document,
    timeout: Duration,
) -> ContentCheck {
    match fetch_bytes(storage, &document.storage_ref, timeout).await {
        Ok(bytes) => ContentCheck {
            sha256_current: Some(sha256_hex(&bytes)),
            error: None,
        },
        Err(error) => ContentCheck {
            sha256_current: None,
            error: Some(error.to_string()),
        },
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("storage fetch timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::TimedOut(_))
    }
}

pub async fn fetch_bytes(
    storage: &dyn ObjectStorage,
    storage_ref: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    match tokio::time::timeout(timeout, storage.get_object(storage_ref)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(err)) => Err(FetchError::Failed(format!("{err:#}"))),
        Err(_) => Err(FetchError::TimedOut(timeout)),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// D-{YYYYMMDD}-{32 hex}
pub fn new_doc_id(now: DateTime<Utc>) -> String {
    format!("D-{}-{}", now.format("%Y%m%d"), Uuid::new_v4().simple())
}

pub fn is_well_formed_doc_id(doc_id: &str) -> bool {
    let mut parts = doc_id.splitn(3, '-');
    let (Some("D"), Some(date), Some(random)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && random.len() == 32
        && random.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "application/pdf" => Some("pdf"),
        DOCX_CONTENT_TYPE => Some("docx"),
        "text/plain" => Some("txt"),
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/mpeg" => Some("mp3"),
        _ => None,
    }
}

fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty())
}

pub fn validate_upload(upload: &Upload, title: &str) -> RegistryResult<()> {
    let limit = upload.size_limit(title);
    if upload.bytes.len() > limit {
        return Err(RegistryError::PayloadTooLarge {
            size: upload.bytes.len(),
            limit,
        });
    }

    if let Some(content_type) = upload.content_type.as_deref() {
        let essence = media_essence(content_type);
        if !essence.is_empty() && !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(RegistryError::UnsupportedMediaType(format!(
                "content type {essence}"
            )));
        }
    }

    if let Some(ext) = upload.extension() {
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(RegistryError::UnsupportedMediaType(format!("extension .{ext}")));
        }
    }
    Ok(())
}

pub fn parse_patch(body: Value) -> RegistryResult<DocumentPatch> {
    let Value::Object(fields) = body else {
        return Err(RegistryError::Validation(
            "patch body must be a JSON object".into(),
        ));
    };

    if let Some(field) = fields.keys().find(|k| IMMUTABLE_FIELDS.contains(&k.as_str())) {
        return Err(RegistryError::Validation(format!("{field} is immutable")));
    }
    if let Some(field) = fields.keys().find(|k| !PATCHABLE_FIELDS.contains(&k.as_str())) {
        return Err(RegistryError::Validation(format!(
            "{field} cannot be patched; allowed fields: {}",
            PATCHABLE_FIELDS.join(", ")
        )));
    }

    let mut patch = DocumentPatch::default();
    for (field, value) in fields {
        match field.as_str() {
            "title" => {
                let title = required_string(&field, value)?;
                check_length(&field, &title, MAX_TITLE_CHARS)?;
                patch.title = Some(title);
            }
            "storage" => {
                let storage = required_string(&field, value)?;
                check_length(&field, &storage, MAX_STORAGE_CHARS)?;
                patch.storage = Some(storage);
            }
            "storage_ref" => patch.storage_ref = Some(required_string(&field, value)?),
            "status" => {
                let raw = required_string(&field, value)?;
                let status = raw
                    .parse::<DocumentStatus>()
                    .map_err(|err| RegistryError::Validation(err.to_string()))?;
                patch.status = Some(status);
            }
            "tags" => patch.tags = Some(parse_tags(value)?),
            "origin_meta" => {
                patch.origin_meta =
                    Some(OriginMeta::from_value(value).map_err(RegistryError::Validation)?)
            }
            _ => {}
        }
    }
    Ok(patch)
}

fn check_length(field: &str, value: &str, max: usize) -> RegistryResult<()> {
    if value.chars().count() > max {
        return Err(RegistryError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn required_string(field: &str, value: Value) -> RegistryResult<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(RegistryError::Validation(format!(
            "{field} must be a non-empty string"
        ))),
    }
}

pub fn parse_tags(value: Value) -> RegistryResult<BTreeSet<String>> {
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag.trim().to_string()),
                other => Err(RegistryError::Validation(format!(
                    "tags must be strings, got {other}"
                ))),
            })
            .filter(|tag| !matches!(tag, Ok(t) if t.is_empty()))
            .collect(),
        other => Err(RegistryError::Validation(format!(
            "tags must be a JSON array, got {other}"
        ))),
    }
}

pub struct Registry {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    notifier: Notifier,
    http: reqwest::Client,
    base_id_url: String,
    presign_expiry: Duration,
    storage_timeout: Duration,
}

impl Registry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Notifier,
        base_id_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            http: reqwest::Client::new(),
            base_id_url: base_id_url.into().trim_end_matches('/').to_string(),
            presign_expiry: Duration::from_secs(300),
            storage_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeouts(mut self, presign_expiry: Duration, storage_timeout: Duration) -> Self {
        self.presign_expiry = presign_expiry;
        self.storage_timeout = storage_timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    pub fn permalink(&self, doc_id: &str) -> String {
        format!("{}/doc/{doc_id}", self.base_id_url)
    }

    pub async fn get(&self, doc_id: &str) -> RegistryResult<Document> {
        self.store
            .find(doc_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(doc_id.to_string()))
    }

    pub async fn register(&self, new: NewDocument) -> RegistryResult<Document> {
        let matter_id = new.matter_id.trim().to_string();
        let class = new.class.trim().to_ascii_lowercase();
        let title = new.title.trim().to_string();
        for (field, value, max) in [
            ("matter_id", &matter_id, MAX_MATTER_ID_CHARS),
            ("class", &class, MAX_CLASS_CHARS),
            ("title", &title, MAX_TITLE_CHARS),
        ] {
            if value.is_empty() {
                return Err(RegistryError::Validation(format!("{field} is required")));
            }
            check_length(field, value, max)?;
        }
        if new.upload.bytes.is_empty() {
            return Err(RegistryError::Validation("file is required".into()));
        }
        validate_upload(&new.upload, &title)?;

        let now = Utc::now();
        let doc_id = new_doc_id(now);
        let sha256 = sha256_hex(&new.upload.bytes);
        let size = new.upload.bytes.len();

        let content_type = new
            .upload
            .content_type
            .as_deref()
            .map(media_essence)
            .filter(|ct| !ct.is_empty())
            .or_else(|| {
                new.upload
                    .filename
                    .as_deref()
                    .or(Some(title.as_str()))
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|mime| mime.essence_str().to_string())
            });

        // Extension from the filename, else from the content type; skipped
        // when the title already carries it.
        let extension = new
            .upload
            .extension()
            .or_else(|| content_type.as_deref().and_then(extension_for).map(str::to_string))
            .filter(|ext| extension_of(&title).as_deref() != Some(ext.as_str()));

        let key = document_key(&matter_id, &class, &doc_id, &title, extension.as_deref());
        let storage_ref = self
            .storage
            .put_object(&key, new.upload.bytes, content_type.clone())
            .await
            .map_err(|err| RegistryError::Storage(format!("{err:#}")))?;

        let mut origin_meta = new.origin_meta;
        if let Some(content_type) = &content_type {
            origin_meta.insert(OriginMeta::CONTENT_TYPE, content_type.clone());
        }
        if let Some(filename) = &new.upload.filename {
            origin_meta.insert(OriginMeta::ORIGINAL_FILENAME, filename.clone());
        }
        origin_meta.insert(OriginMeta::SIZE_BYTES, size as u64);

        let document = Document {
            doc_id: doc_id.clone(),
            matter_id,
            class,
            title,
            sha256,
            storage: self.storage.backend().to_string(),
            storage_ref: storage_ref.clone(),
            status: new.origin.initial_status(),
            tags: new.tags,
            origin: new.origin,
            origin_meta,
            extracted_text: None,
            last_audited_at: None,
            created_at: now,
            updated_at: now,
        };

        let document = match self.store.insert(document).await {
            Ok(document) => document,
            Err(err) => {
                if let Err(cleanup) = self.storage.delete_object(&storage_ref).await {
                    tracing::warn!(
                        doc_id = %doc_id,
                        storage_ref = %storage_ref,
                        error = %cleanup,
                        "failed to remove object after rejected registration"
                    );
                }
                return Err(err.into());
            }
        };

        tracing::info!(
            doc_id = %document.doc_id,
            matter_id = %document.matter_id,
            origin = document.origin.as_str(),
            size,
            "document registered"
        );

        let event = NotificationEvent::for_document(
            EventKind::DocRegistered,
            &document,
            self.permalink(&document.doc_id),
        )
        .with("class", document.class.clone());
        self.notifier.notify(event).await;

        Ok(document)
    }

    pub async fn resolve(&self, document: &Document) -> RegistryResult<String> {
        self.storage
            .presign_get_object(&document.storage_ref, self.presign_expiry)
            .await
            .map_err(|err| RegistryError::Storage(format!("{err:#}")))
    }

    pub async fn patch(&self, doc_id: &str, patch: DocumentPatch) -> RegistryResult<Document> {
        if patch.is_empty() {
            return Err(RegistryError::Validation("patch contains no fields".into()));
        }
        let relocating = patch.relocates_storage();
        let previous = if relocating {
            Some(self.get(doc_id).await?)
        } else {
            None
        };

        let updated = self
            .store
            .apply_patch(doc_id, patch)
            .await?
            .ok_or_else(|| RegistryError::NotFound(doc_id.to_string()))?;

        if let Some(previous) = previous {
            if previous.storage != updated.storage || previous.storage_ref != updated.storage_ref {
                tracing::info!(
                    doc_id = %updated.doc_id,
                    storage_previous = %previous.storage,
                    storage_ref_previous = %previous.storage_ref,
                    storage = %updated.storage,
                    storage_ref = %updated.storage_ref,
                    "document storage relocated"
                );
                let event = NotificationEvent::for_document(
                    EventKind::StorageRelocated,
                    &updated,
                    self.permalink(&updated.doc_id),
                )
                .with("storage_previous", previous.storage)
                .with("storage_ref_previous", previous.storage_ref)
                .with("storage", updated.storage.clone())
                .with("storage_ref", updated.storage_ref.clone());
                self.notifier.notify(event).await;
            }
        }
        Ok(updated)
    }

    pub async fn verify(&self, doc_id: &str) -> RegistryResult<Verification> {
        let document = self.get(doc_id).await?;
        let check = check_content(self.storage.as_ref(), &document, self.storage_timeout).await;
        Ok(Verification {
            doc_id: document.doc_id,
            matches: check.matches(&document.sha256),
            sha256_current: check.sha256_current,
            sha256_stored: document.sha256,
            error: check.error,
        })
    }

    pub async fn deliver(&self, doc_id: &str, message: Option<String>) -> RegistryResult<Delivery> {
        let document = self.get(doc_id).await?;
        let permalink = self.permalink(&document.doc_id);
        let mut event =
            NotificationEvent::for_document(EventKind::ResultDelivered, &document, &permalink);
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            event = event.with("message", message);
        }
        self.notifier.notify(event).await;
        tracing::info!(doc_id = %document.doc_id, "result delivered");
        Ok(Delivery {
            ok: true,
            doc_id: document.doc_id,
            permalink,
        })
    }

    pub async fn resync_hash(&self, doc_id: &str) -> RegistryResult<Resync> {
        let document = self.get(doc_id).await?;
        let bytes = fetch_bytes(self.storage.as_ref(), &document.storage_ref, self.storage_timeout)
            .await
            .map_err(|err| RegistryError::Storage(err.to_string()))?;
        let current = sha256_hex(&bytes);
        let changed = current != document.sha256;
        if changed {
            self.store
                .replace_sha256(doc_id, &current)
                .await?
                .ok_or_else(|| RegistryError::NotFound(doc_id.to_string()))?;
            tracing::warn!(
                doc_id = %document.doc_id,
                sha256_previous = %document.sha256,
                sha256_updated = %current,
                "content hash re-baselined"
            );
        }
        Ok(Resync {
            doc_id: document.doc_id,
            sha256_previous: document.sha256,
            sha256_updated: current,
            changed,
        })
    }

    pub async fn ingest_hook(&self, submission: HookSubmission) -> RegistryResult<Document> {
        if submission.matter_id.trim().is_empty() || submission.title.trim().is_empty() {
            return Err(RegistryError::Validation(
                "matter_id and title are required".into(),
            ));
        }

        let mut origin_meta = match submission.origin_meta {
            Some(value) => OriginMeta::from_value(value).map_err(RegistryError::Validation)?,
            None => OriginMeta::new(),
        };

        let upload = match (submission.file_base64, submission.file_url) {
            (Some(encoded), _) => {
                let bytes = BASE64
                    .decode(encoded.trim())
                    .map_err(|err| RegistryError::Validation(format!("invalid base64: {err}")))?;
                Upload {
                    filename: None,
                    content_type: None,
                    bytes,
                }
            }
            (None, Some(url)) => {
                let upload = self.fetch_remote(&url, &submission.title).await?;
                origin_meta.insert(OriginMeta::SOURCE_URL, url);
                upload
            }
            (None, None) => {
                return Err(RegistryError::Validation(
                    "file_base64 or file_url is required".into(),
                ))
            }
        };

        let class = submission
            .class
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "generated".to_string());

        self.register(NewDocument {
            matter_id: submission.matter_id,
            class,
            title: submission.title,
            origin: Origin::Hook,
            tags: BTreeSet::new(),
            origin_meta,
            upload,
        })
        .await
    }

    async fn fetch_remote(&self, url: &str, title: &str) -> RegistryResult<Upload> {
        let parsed = url::Url::parse(url)
            .map_err(|err| RegistryError::Validation(format!("invalid file_url: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::Validation(
                "file_url must be http or https".into(),
            ));
        }

        let failed = |err: reqwest::Error| RegistryError::Validation(format!("failed to download: {err}"));
        let response = self
            .http
            .get(parsed)
            .timeout(HOOK_FETCH_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(failed)?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|v| !v.is_empty() && v != "application/octet-stream");
        let mut upload = Upload {
            filename: None,
            content_type,
            bytes: Vec::new(),
        };
        let limit = upload.size_limit(title);
        if let Some(declared) = response.content_length() {
            let size = usize::try_from(declared).unwrap_or(usize::MAX);
            if size > limit {
                return Err(RegistryError::PayloadTooLarge { size, limit });
            }
        }
        upload.bytes = read_capped(response.bytes_stream(), limit)
            .await
            .map_err(|err| match err {
                CappedRead::TooLarge { size } => RegistryError::PayloadTooLarge { size, limit },
                CappedRead::Body(err) => failed(err),
            })?;
        Ok(upload)
    }
}

#[derive(Debug)]
pub enum CappedRead<E> {
    TooLarge { size: usize },
    Body(E),
}

pub async fn read_capped<S, B, E>(stream: S, limit: usize) -> Result<Vec<u8>, CappedRead<E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CappedRead::Body)?;
        let size = bytes.len() + chunk.as_ref().len();
        if size > limit {
            return Err(CappedRead::TooLarge { size });
        }
        bytes.extend_from_slice(chunk.as_ref());
    }
    Ok(bytes)
}

pub fn parse_origin_meta_field(raw: Option<&str>) -> RegistryResult<OriginMeta> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(OriginMeta::new()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|err| RegistryError::Validation(format!("origin_meta: {err}")))?;
            OriginMeta::from_value(value).map_err(RegistryError::Validation)
        }
    }
}

pub fn parse_tags_field(raw: Option<&str>) -> RegistryResult<BTreeSet<String>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(BTreeSet::new()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|err| RegistryError::Validation(format!("tags: {err}")))?;
            parse_tags(value)
        }
    }
}
