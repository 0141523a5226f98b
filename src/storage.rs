use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{Datelike, Utc};

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    fn backend(&self) -> &'static str;

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String>;

    async fn presign_get_object(&self, storage_ref: &str, expires_in: Duration) -> Result<String>;

    async fn get_object(&self, storage_ref: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, storage_ref: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .with_context(|| format!("failed to upload {key} to bucket {}", self.bucket))?;

        Ok(key.to_string())
    }

    async fn presign_get_object(&self, storage_ref: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_ref)
            .presigned(presign_config)
            .await
            .context("failed to generate presigned download URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn get_object(&self, storage_ref: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_ref)
            .send()
            .await
            .with_context(|| format!("failed to download {storage_ref} from S3"))?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete_object(&self, storage_ref: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_ref)
            .send()
            .await
            .with_context(|| format!("failed to delete {storage_ref} from S3"))?;
        Ok(())
    }
}

pub fn class_folder(class: &str) -> &'static str {
    match class {
        "evidence" => "02_Evidence",
        "pleading" => "03_Pleadings",
        "correspondence" => "04_Correspondence",
        "court" => "05_Court",
        "archive" => "99_Archive",
        _ => "01_Intake",
    }
}

// matters/{year}/{matter_id}/{class_folder}/{doc_id}__{title}{ext}
pub fn document_key(
    matter_id: &str,
    class: &str,
    doc_id: &str,
    title: &str,
    extension: Option<&str>,
) -> String {
    let year = matter_year(matter_id).unwrap_or_else(|| Utc::now().year().to_string());
    let ext = extension
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!(
        "matters/{year}/{}/{}/{doc_id}__{}{ext}",
        sanitize_segment(matter_id),
        class_folder(class),
        sanitize_segment(title),
    )
}

fn matter_year(matter_id: &str) -> Option<String> {
    let head: String = matter_id.chars().take(4).collect();
    let boundary_ok = matter_id
        .chars()
        .nth(4)
        .map(|c| !c.is_ascii_digit())
        .unwrap_or(true);
    (head.len() == 4 && head.chars().all(|c| c.is_ascii_digit()) && boundary_ok).then_some(head)
}

fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
