use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::{
    config::AuditConfig,
    models::{Document, IntegrityRecord},
    registry::check_content,
    storage::ObjectStorage,
    store::{DocumentStore, StoreResult},
};

pub mod log;

pub use log::{IntegrityLog, ReportQuery};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub checked: usize,
    pub mismatched: usize,
    pub errored: usize,
}

pub struct IntegrityAuditor {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    log: Arc<IntegrityLog>,
    config: AuditConfig,
    storage_timeout: Duration,
}

impl IntegrityAuditor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        log: Arc<IntegrityLog>,
        config: AuditConfig,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            log,
            config,
            storage_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub async fn run_batch(&self) -> StoreResult<BatchSummary> {
        let documents = self
            .store
            .select_for_audit(&self.config.statuses, self.config.batch_size)
            .await?;
        if documents.is_empty() {
            return Ok(BatchSummary::default());
        }

        let records: Vec<IntegrityRecord> = stream::iter(documents)
            .map(|document| self.audit_document(document))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let summary = BatchSummary {
            checked: records.len(),
            mismatched: records.iter().filter(|r| !r.matches).count(),
            errored: records.iter().filter(|r| r.error.is_some()).count(),
        };
        info!(
            checked = summary.checked,
            mismatched = summary.mismatched,
            errored = summary.errored,
            "integrity batch finished"
        );
        Ok(summary)
    }

    async fn audit_document(&self, document: Document) -> IntegrityRecord {
        let check = check_content(self.storage.as_ref(), &document, self.storage_timeout).await;
        let record = IntegrityRecord {
            ts: Utc::now(),
            matches: check.matches(&document.sha256),
            doc_id: document.doc_id,
            matter_id: document.matter_id,
            status_at_audit: document.status,
            sha256_current: check.sha256_current,
            sha256_stored: document.sha256,
            error: check.error,
        };

        if !record.matches {
            warn!(
                doc_id = %record.doc_id,
                sha256_stored = %record.sha256_stored,
                sha256_current = record.sha256_current.as_deref().unwrap_or("-"),
                error = record.error.as_deref().unwrap_or("-"),
                "integrity check failed"
            );
        }
        // Unrecorded checks keep their place at the front of the queue.
        if let Err(err) = self.log.append(&record).await {
            error!(doc_id = %record.doc_id, error = %err, "failed to append integrity record");
            return record;
        }
        if let Err(err) = self.store.mark_audited(&record.doc_id, record.ts).await {
            warn!(doc_id = %record.doc_id, error = %err, "failed to stamp last audit time");
        }
        record
    }
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "integrity scheduler task ended abnormally");
        }
    }
}

pub struct AuditScheduler;

impl AuditScheduler {
    // First batch runs one interval after start.
    pub fn start(auditor: Arc<IntegrityAuditor>) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let period = auditor.interval();

        let task = tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "integrity scheduler started");
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = auditor.run_batch().await {
                            error!(error = %err, "integrity batch failed");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("integrity scheduler stopped");
        });

        SchedulerHandle { stop, task }
    }
}
