use crate::build::{BuildInstaller, BuildResolver};
use crate::error::JobError;
use crate::models::{now, Job, JobId, JobSpec, JobStatus, ModelError};
use crate::notify::Notifier;
use crate::scheduling::{BatchEngine, JobContext, ResultAggregator};
use sqlx::SqliteConnection;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Validate and store a new job, then tell its submitter.
pub async fn create_job(
    spec: JobSpec,
    try_build_template: &str,
    conn: &mut SqliteConnection,
    notifier: &Notifier,
) -> Result<Job<JobId>, ModelError> {
    let job = spec.into_job(try_build_template)?.save(conn).await?;
    info!("job {} created for {} ({})", job.id, job.email, job.build);
    notifier.user_info(&job, "job submitted", "").await;
    Ok(job)
}

/// The stages a running job goes through.
pub struct Stages {
    pub resolver: BuildResolver,
    pub installer: BuildInstaller,
    pub engine: BatchEngine,
    pub aggregator: ResultAggregator,
}

/// Drives jobs through their lifecycle.
///
/// Every method returning an error only does so for failures of the
/// store itself; failures of a job abort that job and are reported.
pub struct JobManager {
    conn: SqliteConnection,
    stages: Stages,
    notifier: Notifier,
    cancellations: UnboundedReceiver<JobId>,
    /// waiting jobs are checked at most once per interval
    check_interval: chrono::Duration,
    try_build_template: String,
}

impl JobManager {
    pub fn new(
        conn: SqliteConnection,
        stages: Stages,
        notifier: Notifier,
        cancellations: UnboundedReceiver<JobId>,
        check_minutes: i64,
        try_build_template: &str,
    ) -> Self {
        Self {
            conn,
            stages,
            notifier,
            cancellations,
            check_interval: chrono::Duration::minutes(check_minutes),
            try_build_template: try_build_template.to_string(),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub async fn create_job(&mut self, spec: JobSpec) -> Result<Job<JobId>, ModelError> {
        create_job(spec, &self.try_build_template, &mut self.conn, &self.notifier).await
    }

    /// Delete the job and its rows, storage failures are only reported.
    pub async fn purge_job(&mut self, context: JobContext) {
        let JobContext { job, .. } = context;
        match Job::purge(job.id, &mut self.conn).await {
            Ok(()) => info!("job {} purged", job.id),
            Err(e) => {
                self.notifier
                    .admin_error(Some(&job), &format!("Error purging job {}", job.id), &e.to_string())
                    .await
            }
        }
    }

    /// Report a failed job to its submitter and the administrators,
    /// then purge it.
    pub async fn abort_job(&mut self, context: JobContext, subject: &str, error: &JobError) {
        warn!("job {} aborted: {}: {}", context.job.id, subject, error);
        self.notifier
            .user_error(&context.job, subject, &error.to_string())
            .await;
        let mut detail = format!("{:?}", error);
        if let Some(build_info) = &context.build_info {
            detail.push_str(&format!("\n\nBuild: {}", build_info));
        }
        self.notifier
            .admin_error(Some(&context.job), subject, &detail)
            .await;
        self.purge_job(context).await;
    }

    /// Purge the jobs the front end asked to cancel.
    pub async fn process_cancellations(&mut self) -> Result<(), JobError> {
        while let Ok(id) = self.cancellations.try_recv() {
            match Job::get_by_id(id, &mut self.conn).await {
                Ok(job) => {
                    self.notifier.user_info(&job, "job cancelled", "").await;
                    self.purge_job(JobContext::new(job)).await;
                }
                Err(ModelError::ModelNotFound) => warn!("cannot cancel job {}: no such job", id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Switch the waiting jobs whose build became available to pending.
    ///
    /// Jobs checked less than `check_interval` ago are skipped.
    pub async fn check_waiting_jobs(&mut self) -> Result<(), JobError> {
        let cutoff = now() - self.check_interval;
        let jobs = Job::select_by_status(JobStatus::Waiting, Some(cutoff), &mut self.conn).await?;
        for mut job in jobs {
            let resolved = self.stages.resolver.resolve(&job.build).await;
            let status = match resolved {
                Some(build) => {
                    job.build = build;
                    JobStatus::Pending
                }
                None => JobStatus::Waiting,
            };
            if let Err(e) = job.update_status(status, &mut self.conn).await {
                self.abort_job(JobContext::new(job), "Error updating job", &e.into())
                    .await;
                continue;
            }
            if status == JobStatus::Pending {
                info!("job {}: build {} is available", job.id, job.build);
                self.notifier
                    .user_info(&job, "build is available, job is pending.", "")
                    .await;
            }
        }
        Ok(())
    }

    /// Running jobs left over by a previous process cannot be resumed.
    pub async fn reap_running_jobs(&mut self) -> Result<(), JobError> {
        let jobs = Job::select_by_status(JobStatus::Running, None, &mut self.conn).await?;
        for job in jobs {
            warn!("job {} was interrupted", job.id);
            self.notifier
                .user_error(
                    &job,
                    "job lost",
                    "The job was interrupted before it completed, please submit it again.",
                )
                .await;
            self.purge_job(JobContext::new(job)).await;
        }
        Ok(())
    }

    async fn run_job(&mut self, context: &mut JobContext) -> Result<(), (&'static str, JobError)> {
        context.build_info = self
            .stages
            .installer
            .install(&context.job.build)
            .await
            .map_err(|e| ("Error downloading build", e))?;

        for location in context.job.locations.clone() {
            info!("job {}: processing location {}", context.job.id, location);
            let batch = self
                .stages
                .engine
                .run(context, &location)
                .await
                .map_err(|e| ("Error running tests", e))?;
            self.stages.aggregator.report(context, &batch).await;
        }
        Ok(())
    }

    /// Run the oldest pending job, if no job is running.
    pub async fn process_next_job(&mut self) -> Result<(), JobError> {
        let job = match Job::promote_oldest_pending(&mut self.conn).await? {
            Some(job) => job,
            None => {
                let waiting = Job::count_by_status(JobStatus::Waiting, &mut self.conn).await?;
                debug!("no job to run, {} waiting for their build", waiting);
                return Ok(());
            }
        };
        info!("job {} is running", job.id);
        let mut context = JobContext::new(job);
        self.notifier
            .user_info(&context.job, "job is running", "")
            .await;

        match self.run_job(&mut context).await {
            Ok(()) => {
                self.notifier
                    .user_info(&context.job, "job completed.", "")
                    .await;
                self.purge_job(context).await;
            }
            Err((subject, error)) => self.abort_job(context, subject, &error).await,
        }
        Ok(())
    }
}
