use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    jobs::{Job, MAX_ATTEMPTS},
    state::AppState,
};

pub mod extract;

#[derive(Debug, PartialEq)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl Worker {
    pub fn new(state: Arc<AppState>, handlers: Vec<Arc<dyn JobHandler>>) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
        }
    }

    pub async fn run(&self, mut receiver: mpsc::Receiver<Job>) {
        info!("worker started");
        while let Some(job) = receiver.recv().await {
            self.process(job).await;
        }
        info!("worker stopped: job queue closed");
    }

    pub async fn process(&self, mut job: Job) -> JobExecution {
        job.attempts += 1;
        let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
            error!(job_id = %job.id, job_type = %job.job_type, "no handler registered for job type");
            return JobExecution::Failed {
                error: "no handler registered".into(),
            };
        };

        let result = handler.handle(self.state.clone(), job.clone()).await;
        match &result {
            JobExecution::Success => {
                info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
            }
            JobExecution::Retry { delay, error } if job.attempts < MAX_ATTEMPTS => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempts,
                    %error,
                    "job will retry"
                );
                self.state.jobs.requeue_after(job, *delay);
            }
            JobExecution::Retry { error, .. } => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    %error,
                    "job failed after final attempt"
                );
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
            }
        }
        result
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(extract::ExtractTextJob::new())]
}
