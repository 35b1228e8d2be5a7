use crate::models::{Job, JobId, JobSpec, ModelError};
use crate::notify::Notifier;
use crate::scheduling::create_job;
use sqlx::sqlite::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error)]
pub enum SchedulerClientError {
    #[error("{0}")]
    InvalidJob(String),
    #[error("{0}")]
    Storage(ModelError),
    #[error("the scheduler is not running")]
    SchedulerStopped,
}

impl From<ModelError> for SchedulerClientError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::InvalidJob(reason) => Self::InvalidJob(reason),
            error => Self::Storage(error),
        }
    }
}

/// Handle the front end uses to talk to the scheduler loop.
///
/// New jobs are inserted straight into the store, the loop picks them up
/// on its next cycle. Cancellations go through a channel, the loop
/// honors them at the top of a cycle.
pub struct SchedulerClient {
    pool: SqlitePool,
    cancellations: UnboundedSender<JobId>,
    notifier: Notifier,
    try_build_template: String,
}

impl SchedulerClient {
    pub fn new(
        pool: SqlitePool,
        cancellations: UnboundedSender<JobId>,
        notifier: Notifier,
        try_build_template: &str,
    ) -> Self {
        Self {
            pool,
            cancellations,
            notifier,
            try_build_template: try_build_template.to_string(),
        }
    }

    pub async fn submit_job(&self, spec: JobSpec) -> Result<Job<JobId>, SchedulerClientError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SchedulerClientError::Storage(e.into()))?;
        Ok(create_job(spec, &self.try_build_template, &mut conn, &self.notifier).await?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job<JobId>>, SchedulerClientError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SchedulerClientError::Storage(e.into()))?;
        Ok(Job::select_all(&mut conn).await?)
    }

    /// Queue the cancellation of `ids`.
    pub fn cancel_jobs(&self, ids: &[JobId]) -> Result<(), SchedulerClientError> {
        for id in ids {
            self.cancellations
                .send(*id)
                .map_err(|_| SchedulerClientError::SchedulerStopped)?;
        }
        Ok(())
    }
}
