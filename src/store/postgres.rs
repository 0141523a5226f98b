use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{pg::PgConnection, prelude::*, result::DatabaseErrorKind};
use serde_json::Value;
use tokio::task;

use super::{DocumentStore, StoreError, StoreResult};
use crate::{
    db::PgPool,
    models::{Document, DocumentPatch, DocumentStatus, Origin, OriginMeta},
    schema::documents,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct DocumentRow {
    doc_id: String,
    matter_id: String,
    class: String,
    title: String,
    sha256: String,
    storage: String,
    storage_ref: String,
    status: String,
    tags: Value,
    origin: String,
    origin_meta: Value,
    extracted_text: Option<String>,
    last_audited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn from_document(document: &Document) -> StoreResult<Self> {
        let tags = serde_json::to_value(&document.tags).map_err(|err| StoreError::Corrupt {
            doc_id: document.doc_id.clone(),
            reason: format!("tags: {err}"),
        })?;
        Ok(Self {
            doc_id: document.doc_id.clone(),
            matter_id: document.matter_id.clone(),
            class: document.class.clone(),
            title: document.title.clone(),
            sha256: document.sha256.clone(),
            storage: document.storage.clone(),
            storage_ref: document.storage_ref.clone(),
            status: document.status.as_str().to_string(),
            tags,
            origin: document.origin.as_str().to_string(),
            origin_meta: document.origin_meta.to_value(),
            extracted_text: document.extracted_text.clone(),
            last_audited_at: document.last_audited_at,
            created_at: document.created_at,
            updated_at: document.updated_at,
        })
    }

    fn into_document(self) -> StoreResult<Document> {
        let doc_id = self.doc_id;
        let corrupt = |reason: String| StoreError::Corrupt {
            doc_id: doc_id.clone(),
            reason,
        };

        let status = self
            .status
            .parse::<DocumentStatus>()
            .map_err(|err| corrupt(err.to_string()))?;
        let origin = self.origin.parse::<Origin>().map_err(corrupt)?;
        let tags: BTreeSet<String> = match self.tags {
            Value::Null => BTreeSet::new(),
            value => serde_json::from_value(value).map_err(|err| corrupt(format!("tags: {err}")))?,
        };
        let origin_meta = OriginMeta::from_value(self.origin_meta).map_err(corrupt)?;

        Ok(Document {
            doc_id,
            matter_id: self.matter_id,
            class: self.class,
            title: self.title,
            sha256: self.sha256,
            storage: self.storage,
            storage_ref: self.storage_ref,
            status,
            tags,
            origin,
            origin_meta,
            extracted_text: self.extracted_text,
            last_audited_at: self.last_audited_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, document: Document) -> StoreResult<Document> {
        let row = DocumentRow::from_document(&document)?;
        self.with_conn(move |conn| {
            match diesel::insert_into(documents::table)
                .values(&row)
                .execute(conn)
            {
                Ok(_) => Ok(document),
                Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    Err(StoreError::Conflict(row.doc_id))
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn find(&self, doc_id: &str) -> StoreResult<Option<Document>> {
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            documents::table
                .find(doc_id.as_str())
                .select(DocumentRow::as_select())
                .first(conn)
                .optional()?
                .map(DocumentRow::into_document)
                .transpose()
        })
        .await
    }

    async fn apply_patch(
        &self,
        doc_id: &str,
        patch: DocumentPatch,
    ) -> StoreResult<Option<Document>> {
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let existing = documents::table
                    .find(doc_id.as_str())
                    .select(DocumentRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?;
                let Some(existing) = existing else {
                    return Ok(None);
                };

                let mut document = existing.into_document()?;
                patch.apply_to(&mut document, Utc::now());
                let row = DocumentRow::from_document(&document)?;

                diesel::update(documents::table.find(doc_id.as_str()))
                    .set((
                        documents::title.eq(&row.title),
                        documents::storage.eq(&row.storage),
                        documents::storage_ref.eq(&row.storage_ref),
                        documents::status.eq(&row.status),
                        documents::tags.eq(&row.tags),
                        documents::origin_meta.eq(&row.origin_meta),
                        documents::extracted_text.eq(&row.extracted_text),
                        documents::updated_at.eq(row.updated_at),
                    ))
                    .execute(conn)?;

                Ok(Some(document))
            })
        })
        .await
    }

    async fn replace_sha256(&self, doc_id: &str, sha256: &str) -> StoreResult<Option<Document>> {
        let doc_id = doc_id.to_string();
        let sha256 = sha256.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(documents::table.find(doc_id.as_str()))
                .set((
                    documents::sha256.eq(&sha256),
                    documents::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Ok(None);
            }
            documents::table
                .find(doc_id.as_str())
                .select(DocumentRow::as_select())
                .first(conn)?
                .into_document()
                .map(Some)
        })
        .await
    }

    async fn select_for_audit(
        &self,
        statuses: &[DocumentStatus],
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            documents::table
                .filter(documents::status.eq_any(statuses))
                .order((
                    documents::last_audited_at.asc().nulls_first(),
                    documents::created_at.asc(),
                    documents::doc_id.asc(),
                ))
                .limit(limit)
                .select(DocumentRow::as_select())
                .load(conn)?
                .into_iter()
                .map(DocumentRow::into_document)
                .collect()
        })
        .await
    }

    async fn mark_audited(&self, doc_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let doc_id = doc_id.to_string();
        self.with_conn(move |conn| {
            diesel::update(documents::table.find(doc_id.as_str()))
                .set(documents::last_audited_at.eq(Some(at)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
