use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    audit::{IntegrityAuditor, IntegrityLog},
    config::AppConfig,
    extraction::{ExtractionSettings, Extractor, Toolchain},
    jobs::{job_queue, Job, JobQueue, DEFAULT_QUEUE_CAPACITY},
    notify::Notifier,
    registry::Registry,
    storage::ObjectStorage,
    store::DocumentStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<Registry>,
    pub integrity_log: Arc<IntegrityLog>,
    pub auditor: Arc<IntegrityAuditor>,
    pub extractor: Arc<Extractor>,
    pub jobs: JobQueue,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Notifier,
        toolchain: Arc<dyn Toolchain>,
    ) -> (Self, mpsc::Receiver<Job>) {
        let registry = Registry::new(
            store.clone(),
            storage.clone(),
            notifier,
            config.base_id_url.clone(),
        )
        .with_timeouts(config.presign_expiry, config.storage_timeout);

        let integrity_log = Arc::new(IntegrityLog::new(config.audit.log_path.clone()));
        let auditor = IntegrityAuditor::new(
            store,
            storage,
            integrity_log.clone(),
            config.audit.clone(),
            config.storage_timeout,
        );
        let extractor = Extractor::new(toolchain, ExtractionSettings::from(&config.extraction));
        let (jobs, receiver) = job_queue(DEFAULT_QUEUE_CAPACITY);

        let state = Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            integrity_log,
            auditor: Arc::new(auditor),
            extractor: Arc::new(extractor),
            jobs,
        };
        (state, receiver)
    }
}
