use crate::error::JobError;
use crate::scheduling::{AutomaticJobs, JobManager};
use chrono::Local;
use std::time::Duration;
use tracing::{error, info};

/// The scheduler loop.
pub struct Scheduler {
    manager: JobManager,
    automatic_jobs: AutomaticJobs,
    idle_sleep: Duration,
}

impl Scheduler {
    pub fn new(manager: JobManager, automatic_jobs: AutomaticJobs, idle_sleep: Duration) -> Self {
        Self {
            manager,
            automatic_jobs,
            idle_sleep,
        }
    }

    /// One pass over every job.
    pub async fn cycle(&mut self) -> Result<(), JobError> {
        self.manager.process_cancellations().await?;
        self.automatic_jobs
            .submit_due(&mut self.manager, Local::now().naive_local())
            .await;
        self.manager.check_waiting_jobs().await?;
        self.manager.reap_running_jobs().await?;
        self.manager.process_next_job().await?;
        Ok(())
    }

    /// Loop until the job store fails.
    pub async fn run(mut self) -> Result<(), JobError> {
        info!("scheduler started");
        loop {
            if let Err(e) = self.cycle().await {
                error!("scheduler failure: {}", e);
                self.manager
                    .notifier()
                    .admin_error(
                        None,
                        "Error in scheduler",
                        &format!("Terminating the scheduler due to unhandled error: {}", e),
                    )
                    .await;
                return Err(e);
            }
            tokio::time::sleep(self.idle_sleep).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::FakeArtifactHost;
    use crate::models::test::build_spec;
    use crate::models::Job;
    use crate::scheduling::batch::test::FakeTestService;
    use crate::scheduling::manager::test::{harness, host_with_build, install_config};

    #[tokio::test]
    async fn test_cycle_runs_a_job_to_completion() {
        let directory = tempfile::tempdir().unwrap();
        let mut h = harness(
            host_with_build(),
            FakeTestService::default(),
            install_config(directory.path()),
        )
        .await;
        h.manager.create_job(build_spec("first")).await.unwrap();
        let mut scheduler = Scheduler::new(h.manager, AutomaticJobs::default(), Duration::ZERO);

        scheduler.cycle().await.unwrap();
        let remaining = Job::select_all(scheduler.manager.connection()).await.unwrap();
        assert!(remaining.is_empty());
        assert_eq!(h.service.submitted.lock().unwrap().len(), 2);
        let subjects: Vec<String> = h
            .mailer
            .sent_to("user@example.org")
            .into_iter()
            .map(|n| n.subject)
            .collect();
        assert!(subjects.last().unwrap().ends_with("job completed."));
    }

    #[tokio::test]
    async fn test_cycle_cancels_before_running() {
        let directory = tempfile::tempdir().unwrap();
        let mut h = harness(
            host_with_build(),
            FakeTestService::default(),
            install_config(directory.path()),
        )
        .await;
        let job = h.manager.create_job(build_spec("cancel")).await.unwrap();
        h.cancel.send(job.id).unwrap();
        let mut scheduler = Scheduler::new(h.manager, AutomaticJobs::default(), Duration::ZERO);

        scheduler.cycle().await.unwrap();
        assert!(h.service.submitted.lock().unwrap().is_empty());
        assert!(h.host.head_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let directory = tempfile::tempdir().unwrap();
        let mut h = harness(
            FakeArtifactHost::default(),
            FakeTestService::default(),
            install_config(directory.path()),
        )
        .await;
        h.manager.create_job(build_spec("doomed")).await.unwrap();
        for table in ["urls", "speeds", "locations", "jobs"] {
            sqlx::query(&format!("DROP TABLE {}", table))
                .execute(&mut *h.manager.connection())
                .await
                .unwrap();
        }
        let scheduler = Scheduler::new(h.manager, AutomaticJobs::default(), Duration::ZERO);

        assert!(matches!(scheduler.run().await, Err(JobError::Storage(_))));
        let admin = h.mailer.sent_to("admin@example.org");
        assert_eq!(admin.len(), 1);
        assert_eq!(admin[0].subject, "[WebPagetest] Error in scheduler");
    }
}
