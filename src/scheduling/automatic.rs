use crate::config::AutomaticJobConfig;
use crate::scheduling::JobManager;
use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::info;

/// A configured job, with the last time it was submitted.
#[derive(Debug, Clone)]
struct AutomaticJob {
    config: AutomaticJobConfig,
    last_submitted: NaiveDateTime,
}

impl AutomaticJob {
    /// Due once per calendar day, after the configured hour.
    fn is_due(&self, now: NaiveDateTime) -> bool {
        now > self.last_submitted
            && now.date() != self.last_submitted.date()
            && now.hour() >= self.config.hour
    }
}

/// Jobs submitted every day by the scheduler itself.
#[derive(Debug, Clone, Default)]
pub struct AutomaticJobs {
    jobs: Vec<AutomaticJob>,
}

impl AutomaticJobs {
    /// `started` counts as the last submission, moved back one day for
    /// jobs whose hour is not past yet so they still run today.
    pub fn new(configs: Vec<AutomaticJobConfig>, started: NaiveDateTime) -> Self {
        Self {
            jobs: configs
                .into_iter()
                .map(|config| {
                    let last_submitted = if started.hour() <= config.hour {
                        started - Duration::days(1)
                    } else {
                        started
                    };
                    AutomaticJob {
                        config,
                        last_submitted,
                    }
                })
                .collect(),
        }
    }

    /// Create the jobs due at `now`.
    pub async fn submit_due(&mut self, manager: &mut JobManager, now: NaiveDateTime) {
        for automatic in self.jobs.iter_mut().filter(|job| job.is_due(now)) {
            automatic.last_submitted = now;
            match manager.create_job(automatic.config.job.clone()).await {
                Ok(job) => info!("automatic job {} submitted", job.id),
                Err(e) => {
                    manager
                        .notifier()
                        .admin_error(
                            None,
                            "Error submitting automatic job",
                            &format!("{}: {}", automatic.config.job.label, e),
                        )
                        .await
                }
            }
        }
    }
}
