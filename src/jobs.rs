use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::extraction::ExtractionMode;

pub const JOB_EXTRACT_TEXT: &str = "extract-text";

pub const MAX_ATTEMPTS: u32 = 3;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub attempts: u32,
}

impl Job {
    pub fn new(job_type: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractTextPayload {
    pub doc_id: String,
    #[serde(default)]
    pub mode: ExtractionMode,
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

pub fn job_queue(capacity: usize) -> (JobQueue, mpsc::Receiver<Job>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (JobQueue { sender }, receiver)
}

impl JobQueue {
    pub fn enqueue(&self, job: Job) -> JobQueueResult<Uuid> {
        let id = job.id;
        self.sender.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => JobQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => JobQueueError::Closed,
        })?;
        Ok(id)
    }

    pub fn enqueue_extraction(&self, doc_id: &str, mode: ExtractionMode) -> JobQueueResult<Uuid> {
        let payload = json!({ "doc_id": doc_id, "mode": mode });
        self.enqueue(Job::new(JOB_EXTRACT_TEXT, payload))
    }

    pub fn requeue_after(&self, job: Job, delay: Duration) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let id = job.id;
            if sender.send(job).await.is_err() {
                warn!(job_id = %id, "job queue closed before retry");
            }
        });
    }
}
