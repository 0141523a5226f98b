use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Submitted,
    Triage,
    Registered,
    Delivered,
    Archive,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 6] = [
        DocumentStatus::Draft,
        DocumentStatus::Submitted,
        DocumentStatus::Triage,
        DocumentStatus::Registered,
        DocumentStatus::Delivered,
        DocumentStatus::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::Triage => "triage",
            DocumentStatus::Registered => "registered",
            DocumentStatus::Delivered => "delivered",
            DocumentStatus::Archive => "archive",
        }
    }

    pub fn parse_list(raw: &str) -> Result<Vec<DocumentStatus>, UnknownStatus> {
        raw.split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(DocumentStatus::from_str)
            .collect()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allowed: Vec<&str> = DocumentStatus::ALL.iter().map(|s| s.as_str()).collect();
        write!(
            f,
            "unknown status '{}'. Allowed statuses: {}",
            self.0,
            allowed.join(", ")
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Upload,
    Generated,
    Hook,
    Intake,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Upload => "upload",
            Origin::Generated => "generated",
            Origin::Hook => "hook",
            Origin::Intake => "intake",
        }
    }

    pub fn initial_status(&self) -> DocumentStatus {
        match self {
            Origin::Intake => DocumentStatus::Draft,
            _ => DocumentStatus::Registered,
        }
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" | "uploaded" => Ok(Origin::Upload),
            "generated" => Ok(Origin::Generated),
            "hook" => Ok(Origin::Hook),
            "intake" => Ok(Origin::Intake),
            other => Err(format!(
                "unknown origin '{other}'. Allowed origins: upload, generated, hook, intake"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginMeta(BTreeMap<String, Value>);

impl OriginMeta {
    pub const CONTENT_TYPE: &'static str = "content_type";
    pub const ORIGINAL_FILENAME: &'static str = "original_filename";
    pub const SIZE_BYTES: &'static str = "size_bytes";
    pub const NOTES: &'static str = "notes";
    pub const SOURCE_URL: &'static str = "source_url";
    pub const OCR_INFO: &'static str = "ocr_info";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Keys overwrite, null removes.
    pub fn merge(&mut self, update: OriginMeta) {
        for (key, value) in update.0 {
            if value.is_null() {
                self.0.remove(&key);
            } else {
                self.0.insert(key, value);
            }
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_str(Self::CONTENT_TYPE)
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.get_str(Self::ORIGINAL_FILENAME)
    }

    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(format!("origin_meta must be a JSON object, got {other}")),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub matter_id: String,
    pub class: String,
    pub title: String,
    pub sha256: String,
    pub storage: String,
    pub storage_ref: String,
    pub status: DocumentStatus,
    pub tags: BTreeSet<String>,
    pub origin: Origin,
    pub origin_meta: OriginMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub last_audited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub storage: Option<String>,
    pub storage_ref: Option<String>,
    pub status: Option<DocumentStatus>,
    pub tags: Option<BTreeSet<String>>,
    pub origin_meta: Option<OriginMeta>,
    pub extracted_text: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.storage.is_none()
            && self.storage_ref.is_none()
            && self.status.is_none()
            && self.tags.is_none()
            && self.origin_meta.is_none()
            && self.extracted_text.is_none()
    }

    pub fn relocates_storage(&self) -> bool {
        self.storage.is_some() || self.storage_ref.is_some()
    }

    pub fn apply_to(self, document: &mut Document, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            document.title = title;
        }
        if let Some(storage) = self.storage {
            document.storage = storage;
        }
        if let Some(storage_ref) = self.storage_ref {
            document.storage_ref = storage_ref;
        }
        if let Some(status) = self.status {
            document.status = status;
        }
        if let Some(tags) = self.tags {
            document.tags = tags;
        }
        if let Some(meta) = self.origin_meta {
            document.origin_meta.merge(meta);
        }
        if let Some(text) = self.extracted_text {
            document.extracted_text = Some(text);
        }
        document.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub ts: DateTime<Utc>,
    pub doc_id: String,
    pub matter_id: String,
    #[serde(rename = "status")]
    pub status_at_audit: DocumentStatus,
    #[serde(rename = "match")]
    pub matches: bool,
    pub sha256_current: Option<String>,
    pub sha256_stored: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntegrityRecord {
    pub fn is_failure(&self) -> bool {
        !self.matches || self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Document {
        let now = Utc::now();
        Document {
            doc_id: "D-20260101-abc".into(),
            matter_id: "2023-AR-0001".into(),
            class: "evidence".into(),
            title: "Lease".into(),
            sha256: "00".into(),
            storage: "s3".into(),
            storage_ref: "matters/2023/a".into(),
            status: DocumentStatus::Registered,
            tags: BTreeSet::new(),
            origin: Origin::Upload,
            origin_meta: OriginMeta::new(),
            extracted_text: None,
            last_audited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn parses_every_known_status() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>(), Ok(status));
        }
        assert_eq!(
            " Delivered ".parse::<DocumentStatus>(),
            Ok(DocumentStatus::Delivered)
        );
    }

    #[test]
    fn rejects_unknown_status() {
        let err = "published".parse::<DocumentStatus>().unwrap_err();
        assert!(err.to_string().contains("published"));
        assert!(DocumentStatus::parse_list("registered,bogus").is_err());
    }

    #[test]
    fn parses_allow_list() {
        let list = DocumentStatus::parse_list("registered, delivered,").unwrap();
        assert_eq!(
            list,
            vec![DocumentStatus::Registered, DocumentStatus::Delivered]
        );
    }

    #[test]
    fn intake_starts_as_draft() {
        assert_eq!(Origin::Intake.initial_status(), DocumentStatus::Draft);
        assert_eq!(Origin::Upload.initial_status(), DocumentStatus::Registered);
        assert_eq!(Origin::Hook.initial_status(), DocumentStatus::Registered);
    }

    #[test]
    fn origin_meta_merge_overwrites_and_removes() {
        let mut meta = OriginMeta::from_value(json!({"notes": "a", "content_type": "text/plain"}))
            .unwrap();
        let update = OriginMeta::from_value(json!({"notes": null, "reviewer": "kim"})).unwrap();
        meta.merge(update);

        assert!(meta.get("notes").is_none());
        assert_eq!(meta.get_str("reviewer"), Some("kim"));
        assert_eq!(meta.content_type(), Some("text/plain"));
    }

    #[test]
    fn origin_meta_rejects_non_objects() {
        assert!(OriginMeta::from_value(json!([1, 2])).is_err());
        assert!(OriginMeta::from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn title_patch_leaves_identity_untouched() {
        let mut document = sample_document();
        let before = document.clone();
        let patch = DocumentPatch {
            title: Some("Amended lease".into()),
            ..Default::default()
        };
        assert!(!patch.relocates_storage());
        patch.apply_to(&mut document, Utc::now());

        assert_eq!(document.title, "Amended lease");
        assert_eq!(document.doc_id, before.doc_id);
        assert_eq!(document.sha256, before.sha256);
        assert_eq!(document.storage_ref, before.storage_ref);
        assert_eq!(document.created_at, before.created_at);
    }

    #[test]
    fn integrity_record_uses_wire_names() {
        let record = IntegrityRecord {
            ts: Utc::now(),
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            status_at_audit: DocumentStatus::Registered,
            matches: false,
            sha256_current: None,
            sha256_stored: "ab".into(),
            error: Some("object missing".into()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["match"], json!(false));
        assert_eq!(value["status"], json!("registered"));
        assert!(record.is_failure());
    }
}
