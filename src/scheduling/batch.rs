use crate::error::JobError;
use crate::scheduling::JobContext;
use crate::wpt::{TestRequest, TestService, TestStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A test accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTest {
    pub url: String,
    pub speed: String,
    /// terminal status, `None` while pending or once abandoned
    pub status: Option<TestStatus>,
    pub messages: Vec<String>,
}

impl TrackedTest {
    fn new(url: &str, speed: &str) -> Self {
        Self {
            url: url.to_string(),
            speed: speed.to_string(),
            status: None,
            messages: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == Some(TestStatus::Complete)
    }

    /// messages, comma separated
    pub fn message_line(&self) -> Option<String> {
        if self.messages.is_empty() {
            None
        } else {
            Some(self.messages.join(", "))
        }
    }
}

/// Every test of one location.
#[derive(Debug, Clone, Default)]
pub struct LocationBatch {
    pub location: String,
    /// test id -> test
    pub tests: BTreeMap<String, TrackedTest>,
    /// (url, speed) the service refused
    pub rejected: Vec<(String, String)>,
}

/// Submits the tests of a location and follows them until they
/// are all done or the time limit is over.
pub struct BatchEngine {
    service: Arc<dyn TestService>,
    poll_interval: Duration,
    /// time allowed to one load of one url
    time_limit: Duration,
}

impl BatchEngine {
    pub fn new(service: Arc<dyn TestService>, poll_interval: Duration, time_limit: Duration) -> Self {
        Self {
            service,
            poll_interval,
            time_limit,
        }
    }

    /// Each accepted url is loaded 3 times per run:
    /// priming, first view and repeat view.
    pub fn time_budget(&self, accepted_urls: usize, runs: u32) -> Duration {
        let loads = (accepted_urls as u64)
            .saturating_mul(3)
            .saturating_mul(runs as u64);
        self.time_limit
            .saturating_mul(u32::try_from(loads).unwrap_or(u32::MAX))
    }

    pub async fn run(&self, context: &JobContext, location: &str) -> Result<LocationBatch, JobError> {
        let mut batch = self.submit(context, location).await?;
        self.poll(&mut batch, context.job.runs).await?;
        Ok(batch)
    }

    async fn submit(&self, context: &JobContext, location: &str) -> Result<LocationBatch, JobError> {
        let job = &context.job;
        debug!("job {}: submitting {} tests for {}", job.id, job.tests_per_location(), location);
        let mut batch = LocationBatch {
            location: location.to_string(),
            ..Default::default()
        };
        for speed in &job.speeds {
            for url in &job.urls {
                let request = TestRequest {
                    label: job.label.clone(),
                    runs: job.runs,
                    tcpdump: job.tcpdump,
                    video: job.video,
                    location: format!("{}.{}", location, speed),
                    url: url.clone(),
                    script: job.script_for(url),
                };
                match self.service.submit_test(&request).await? {
                    Some(test_id) => {
                        debug!("job {}: {} {} is test {}", job.id, url, request.location, test_id);
                        batch.tests.insert(test_id, TrackedTest::new(url, speed));
                    }
                    None => {
                        warn!("job {}: {} {} was not accepted", job.id, url, request.location);
                        batch.rejected.push((url.clone(), speed.clone()));
                    }
                }
            }
        }
        info!(
            "job {}: {} tests submitted for {}, {} refused",
            job.id,
            batch.tests.len(),
            location,
            batch.rejected.len()
        );
        Ok(batch)
    }

    async fn poll(&self, batch: &mut LocationBatch, runs: u32) -> Result<(), JobError> {
        // counted once whatever the number of speeds
        let accepted_urls: BTreeSet<&str> =
            batch.tests.values().map(|test| test.url.as_str()).collect();
        let deadline = Instant::now() + self.time_budget(accepted_urls.len(), runs);
        let mut pending: Vec<String> = batch.tests.keys().cloned().collect();

        while !pending.is_empty() {
            if Instant::now() >= deadline {
                for test_id in pending.drain(..) {
                    warn!("test {} abandoned", test_id);
                    if let Some(test) = batch.tests.get_mut(&test_id) {
                        test.messages.push("abandoned due to time limit.".to_string());
                    }
                }
                break;
            }

            let mut still_pending = Vec::with_capacity(pending.len());
            for test_id in pending {
                let status = TestStatus::from_code(self.service.test_status(&test_id).await?);
                debug!("test {} is {}", test_id, status);
                if status.is_pending() {
                    still_pending.push(test_id);
                    continue;
                }
                if let Some(test) = batch.tests.get_mut(&test_id) {
                    test.status = Some(status);
                    test.messages.extend(status.message());
                }
            }
            pending = still_pending;

            if !pending.is_empty() {
                let left = deadline.saturating_duration_since(Instant::now());
                debug!("{} tests pending, next check in {:?}", pending.len(), self.poll_interval.min(left));
                tokio::time::sleep(self.poll_interval.min(left)).await;
            }
        }
        Ok(())
    }
}
