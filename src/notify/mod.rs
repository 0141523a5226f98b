use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{config::NotificationConfig, jsonl::JsonlLog, models::Document};

pub mod email;
pub mod matrix;

pub use email::EmailChannel;
pub use matrix::MatrixChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DocRegistered,
    ResultDelivered,
    StorageRelocated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocRegistered => "doc_registered",
            EventKind::ResultDelivered => "result_delivered",
            EventKind::StorageRelocated => "storage_relocated",
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, EventKind::DocRegistered | EventKind::ResultDelivered)
    }

    fn headline(&self) -> &'static str {
        match self {
            EventKind::DocRegistered => "Registered",
            EventKind::ResultDelivered => "Result delivered",
            EventKind::StorageRelocated => "Storage relocated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event: EventKind,
    pub doc_id: String,
    pub matter_id: String,
    pub title: String,
    pub permalink: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NotificationEvent {
    pub fn for_document(kind: EventKind, document: &Document, permalink: impl Into<String>) -> Self {
        Self {
            event: kind,
            doc_id: document.doc_id.clone(),
            matter_id: document.matter_id.clone(),
            title: document.title.clone(),
            permalink: permalink.into(),
            ts: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn subject(&self) -> String {
        format!("[casefile] {} {}", self.event.headline(), self.doc_id)
    }

    pub fn plain_text(&self) -> String {
        let mut body = format!(
            "{}\nMatter: {}\nTitle: {}\nDocID: {}\nLink: {}\n",
            self.event.headline(),
            self.matter_id,
            self.title,
            self.doc_id,
            self.permalink
        );
        if let Some(message) = self.extra.get("message").and_then(Value::as_str) {
            body.push_str(&format!("Message: {message}\n"));
        }
        body
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
    #[error("message could not be built: {0}")]
    Message(String),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("rejected by server ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait NotificationChannel: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &NotificationEvent) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: &'static str,
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn is_sent(&self) -> bool {
        self.error.is_none()
    }

    pub fn log_event(&self) -> String {
        let suffix = if self.is_sent() { "sent" } else { "error" };
        format!("{}_{suffix}", self.channel)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OutcomeLine {
    ts: DateTime<Utc>,
    event: String,
    doc_id: String,
    source_event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug)]
pub struct Dispatch {
    logged: bool,
    delivery: Option<JoinHandle<Vec<ChannelOutcome>>>,
}

impl Dispatch {
    pub fn event_logged(&self) -> bool {
        self.logged
    }

    pub async fn outcomes(self) -> Vec<ChannelOutcome> {
        match self.delivery {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "notification delivery task aborted");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}

struct NotifierInner {
    log: JsonlLog,
    channels: Vec<Arc<dyn NotificationChannel>>,
    channel_timeout: Duration,
}

#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    pub fn new(
        log_path: impl Into<PathBuf>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        channel_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                log: JsonlLog::new(log_path),
                channels,
                channel_timeout,
            }),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
        if let Some(smtp) = &config.email {
            channels.push(Arc::new(EmailChannel::new(smtp)?));
        }
        if let Some(matrix) = &config.matrix {
            channels.push(Arc::new(MatrixChannel::new(matrix, config.channel_timeout)?));
        }
        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        tracing::info!(
            log = %config.log_path.display(),
            channels = ?names,
            "notifications configured"
        );
        Ok(Self::new(
            config.log_path.clone(),
            channels,
            config.channel_timeout,
        ))
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.inner.log.path()
    }

    pub async fn notify(&self, event: NotificationEvent) -> Dispatch {
        let logged = match self.inner.log.append(&event).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    event = event.event.as_str(),
                    doc_id = %event.doc_id,
                    error = %err,
                    "failed to append notification log line"
                );
                false
            }
        };

        if !event.event.is_broadcast() || self.inner.channels.is_empty() {
            return Dispatch {
                logged,
                delivery: None,
            };
        }

        let inner = Arc::clone(&self.inner);
        let delivery = tokio::spawn(async move { deliver(&inner, &event).await });
        Dispatch {
            logged,
            delivery: Some(delivery),
        }
    }
}

async fn deliver(inner: &NotifierInner, event: &NotificationEvent) -> Vec<ChannelOutcome> {
    let attempts = inner.channels.iter().map(|channel| async move {
        let result = match tokio::time::timeout(inner.channel_timeout, channel.send(event)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::TimedOut(inner.channel_timeout)),
        };
        ChannelOutcome {
            channel: channel.name(),
            error: result.err().map(|err| err.to_string()),
        }
    });
    let outcomes = join_all(attempts).await;

    for outcome in &outcomes {
        match &outcome.error {
            None => tracing::info!(
                channel = outcome.channel,
                event = event.event.as_str(),
                doc_id = %event.doc_id,
                "notification sent"
            ),
            Some(error) => tracing::warn!(
                channel = outcome.channel,
                event = event.event.as_str(),
                doc_id = %event.doc_id,
                error = %error,
                "notification channel failed"
            ),
        }
        let line = OutcomeLine {
            ts: Utc::now(),
            event: outcome.log_event(),
            doc_id: event.doc_id.clone(),
            source_event: event.event,
            error: outcome.error.clone(),
        };
        if let Err(err) = inner.log.append(&line).await {
            tracing::error!(error = %err, "failed to append channel outcome line");
        }
    }

    outcomes
}
