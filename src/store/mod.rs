use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Document, DocumentPatch, DocumentStatus};

pub mod postgres;

pub use postgres::PgDocumentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("document {0} already exists")]
    Conflict(String),
    #[error("stored record {doc_id} is corrupt: {reason}")]
    Corrupt { doc_id: String, reason: String },
    #[error("store task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn insert(&self, document: Document) -> StoreResult<Document>;

    async fn find(&self, doc_id: &str) -> StoreResult<Option<Document>>;

    // Read-modify-write under the record's lock.
    async fn apply_patch(&self, doc_id: &str, patch: DocumentPatch)
        -> StoreResult<Option<Document>>;

    async fn replace_sha256(&self, doc_id: &str, sha256: &str) -> StoreResult<Option<Document>>;

    async fn select_for_audit(
        &self,
        statuses: &[DocumentStatus],
        limit: usize,
    ) -> StoreResult<Vec<Document>>;

    async fn mark_audited(&self, doc_id: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

// Never audited first, then oldest audit, then oldest registration.
pub fn audit_order(a: &Document, b: &Document) -> Ordering {
    // `None` sorts before any `Some`.
    a.last_audited_at
        .cmp(&b.last_audited_at)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::models::{Origin, OriginMeta};

    fn doc(id: &str, created_min: i64, audited_min: Option<i64>) -> Document {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Document {
            doc_id: id.into(),
            matter_id: "M-1".into(),
            class: "intake".into(),
            title: id.into(),
            sha256: String::new(),
            storage: "s3".into(),
            storage_ref: id.into(),
            status: DocumentStatus::Registered,
            tags: BTreeSet::new(),
            origin: Origin::Upload,
            origin_meta: OriginMeta::new(),
            extracted_text: None,
            last_audited_at: audited_min.map(|m| base + Duration::minutes(m)),
            created_at: base + Duration::minutes(created_min),
            updated_at: base,
        }
    }

    #[test]
    fn never_audited_documents_come_first() {
        let mut docs = vec![
            doc("recently-checked", 0, Some(50)),
            doc("never-new", 10, None),
            doc("long-ago", 1, Some(5)),
            doc("never-old", 2, None),
        ];
        docs.sort_by(audit_order);
        let ids: Vec<&str> = docs.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["never-old", "never-new", "long-ago", "recently-checked"]
        );
    }
}
