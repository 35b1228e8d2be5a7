use crate::metrics::{DatasetBuilder, MetricsWarehouse};
use crate::notify::Notifier;
use crate::scheduling::{JobContext, LocationBatch, TrackedTest};
use crate::wpt::TestService;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const FETCH_FAILED: &str = "Failed to retrieve results from Webpagetest";
const PROCESSING_FAILED: &str = "Error processing test result";

/// Results of one location, as mailed to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub subject: String,
    pub body: String,
}

/// Fetches the results of a finished batch, forwards them to the
/// warehouse and reports them to the submitter.
pub struct ResultAggregator {
    service: Arc<dyn TestService>,
    datasets: DatasetBuilder,
    warehouse: Option<Arc<dyn MetricsWarehouse>>,
    notifier: Notifier,
    /// host of the result links
    results_server: String,
    dump_directory: Option<PathBuf>,
}

impl ResultAggregator {
    pub fn new(
        service: Arc<dyn TestService>,
        datasets: DatasetBuilder,
        warehouse: Option<Arc<dyn MetricsWarehouse>>,
        notifier: Notifier,
        results_server: &str,
        dump_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            service,
            datasets,
            warehouse,
            notifier,
            results_server: results_server.to_string(),
            dump_directory,
        }
    }

    fn entry_header(&self, test_id: &str, test: &TrackedTest) -> String {
        let mut entry = format!(
            "Url: {}\nSpeed: {}\nResult: http://{}/result/{}/\n\n",
            test.url, test.speed, self.results_server, test_id
        );
        if let Some(messages) = test.message_line() {
            entry.push_str(&format!("Messages: {}\n\n", messages));
        }
        entry
    }

    /// Metrics of a completed test, pushes the dataset to the warehouse
    /// when the job asks for it.
    async fn test_metrics(&self, context: &JobContext, test_id: &str) -> Result<String, &'static str> {
        let job = &context.job;
        let result = match self.service.test_result(test_id).await {
            Ok(result) => result,
            Err(e) => {
                self.notifier
                    .admin_error(Some(job), FETCH_FAILED, &format!("test {}: {}", test_id, e))
                    .await;
                return Err(FETCH_FAILED);
            }
        };
        self.dump_raw(test_id, &result).await;

        if let Some(code) = result.get("statusCode").and_then(Value::as_i64) {
            if code != 200 {
                self.notifier
                    .admin_error(
                        Some(job),
                        FETCH_FAILED,
                        &format!("test {}: result has status {}", test_id, code),
                    )
                    .await;
                return Err(FETCH_FAILED);
            }
        }

        let dataset = match self.datasets.build(&result, context.build_info.as_ref()) {
            Ok(dataset) => dataset,
            Err(e) => {
                self.notifier
                    .admin_error(Some(job), PROCESSING_FAILED, &format!("test {}: {}", test_id, e))
                    .await;
                return Err(PROCESSING_FAILED);
            }
        };

        if job.warehouse {
            if let Some(warehouse) = &self.warehouse {
                if let Err(e) = warehouse.submit(&dataset).await {
                    warn!("job {}: test {} not stored in the warehouse: {}", job.id, test_id, e);
                }
            }
        }

        let mut text = String::new();
        for (view, metrics) in dataset.wpt_data.views() {
            text.push_str(&format!("  {}:\n", view));
            for (metric, values) in metrics {
                let values = serde_json::to_string(values).unwrap_or_default();
                text.push_str(&format!("    {}: {}\n", metric, values));
            }
        }
        text.push('\n');
        Ok(text)
    }

    /// Build the report of `batch`.
    pub async fn build_report(&self, context: &JobContext, batch: &LocationBatch) -> Report {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        for (test_id, test) in &batch.tests {
            let mut entry = self.entry_header(test_id, test);
            if test.is_complete() {
                match self.test_metrics(context, test_id).await {
                    Ok(metrics) => entry.push_str(&metrics),
                    Err(message) => entry.push_str(&format!("{}\n\n", message)),
                }
            }
            entries.insert(format!("{}{}", test.url, test.speed), entry);
        }

        let mut body = format!("Results for location {}\n\n", batch.location);
        if let Some(build_info) = &context.build_info {
            body.push_str(&format!("{}\n\n", build_info));
        }
        let mut messages = String::new();
        for (url, speed) in &batch.rejected {
            messages.push_str(&format!("url {} was not accepted at speed {}\n", url, speed));
        }
        if entries.is_empty() {
            messages.push_str("No results were found.");
        }
        for entry in entries.values() {
            body.push_str(entry);
        }
        if !messages.is_empty() {
            body.push_str(&format!("\n\n{}\n", messages));
        }

        Report {
            subject: format!("Results for location {}.", batch.location),
            body,
        }
    }

    /// Build the report of `batch` and send it to the submitter.
    pub async fn report(&self, context: &JobContext, batch: &LocationBatch) -> Report {
        let report = self.build_report(context, batch).await;
        self.dump_report(context, &report).await;
        self.notifier
            .user_info(&context.job, &report.subject, &report.body)
            .await;
        report
    }

    async fn dump_raw(&self, test_id: &str, result: &Value) {
        if let Some(directory) = &self.dump_directory {
            match serde_json::to_string_pretty(result) {
                Ok(json) => {
                    append(&directory.join(format!("results-{}.json", test_id)), &json).await
                }
                Err(e) => warn!("failed to serialize result of test {}: {}", test_id, e),
            }
        }
    }

    async fn dump_report(&self, context: &JobContext, report: &Report) {
        if let Some(directory) = &self.dump_directory {
            let path = directory.join(format!("results-{}.txt", context.job.id));
            append(&path, &report.body).await;
        }
    }
}

/// Append `content` and a new line to `path`, failures are only logged.
async fn append(path: &Path, content: &str) {
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await;
    let result = match file {
        Ok(mut file) => file.write_all(format!("{}\n", content).as_bytes()).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!("dumped results to {:?}", path),
        Err(e) => warn!("failed to dump results to {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test::RecordingWarehouse;
    use crate::notify::recording_notifier;
    use crate::scheduling::batch::test::{context, FakeTestService};
    use crate::scheduling::BatchEngine;
    use std::collections::HashMap;
    use std::time::Duration;

    fn aggregator(
        service: Arc<FakeTestService>,
        warehouse: Option<Arc<RecordingWarehouse>>,
        notifier: Notifier,
        dump_directory: Option<PathBuf>,
    ) -> ResultAggregator {
        ResultAggregator::new(
            service,
            DatasetBuilder::new().unwrap(),
            warehouse.map(|w| w as Arc<dyn MetricsWarehouse>),
            notifier,
            "results.example.org",
            dump_directory,
        )
    }

    async fn run_batch(service: &Arc<FakeTestService>, context: &JobContext) -> LocationBatch {
        BatchEngine::new(
            service.clone(),
            Duration::from_secs(60),
            Duration::from_secs(240),
        )
        .run(context, "loc1")
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_and_cancelled_tests_report() {
        let service = Arc::new(FakeTestService {
            statuses: HashMap::from([("b.com".to_string(), 402)]),
            ..Default::default()
        });
        // urls are submitted in reverse order, the report is still sorted
        let context = context(&["Cable"], &["b.com", "a.com"]);
        let batch = run_batch(&service, &context).await;
        assert_eq!(batch.tests["T1"].url, "b.com");
        assert_eq!(batch.tests["T2"].url, "a.com");

        let (notifier, mailer) = recording_notifier();
        let report = aggregator(service, None, notifier, None)
            .report(&context, &batch)
            .await;

        assert_eq!(report.subject, "Results for location loc1.");
        let body = &report.body;
        assert!(body.starts_with("Results for location loc1\n\n"));
        let a = body.find("Url: a.com\nSpeed: Cable\n").unwrap();
        let b = body.find("Url: b.com\nSpeed: Cable\n").unwrap();
        assert!(a < b);
        assert!(body.contains(
            "Url: a.com\nSpeed: Cable\nResult: http://results.example.org/result/T2/\n\n  firstView:\n"
        ));
        assert!(body.contains(
            "Url: b.com\nSpeed: Cable\nResult: http://results.example.org/result/T1/\n\nMessages: cancelled\n\n"
        ));
        assert!(body.contains("    SpeedIndex: [1500,1600]\n"));
        assert!(!body.contains("No results were found."));

        let sent = mailer.sent_to("user@example.org");
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].subject,
            "[WebPagetest] Job 1 Label batch Results for location loc1."
        );
    }

    #[tokio::test]
    async fn test_rejected_urls_and_no_results() {
        let service = Arc::new(FakeTestService {
            refused: vec!["a.com".to_string()],
            ..Default::default()
        });
        let context = context(&["Cable", "DSL"], &["a.com"]);
        let batch = run_batch(&service, &context).await;
        let (notifier, _) = recording_notifier();
        let report = aggregator(service, None, notifier, None)
            .build_report(&context, &batch)
            .await;
        assert!(report
            .body
            .ends_with(
                "\n\nurl a.com was not accepted at speed Cable\n\
                 url a.com was not accepted at speed DSL\n\
                 No results were found.\n"
            ));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_reported_to_admins() {
        let service = Arc::new(FakeTestService {
            broken_results: vec!["a.com".to_string()],
            ..Default::default()
        });
        let context = context(&["Cable"], &["a.com"]);
        let batch = run_batch(&service, &context).await;
        let (notifier, mailer) = recording_notifier();
        let report = aggregator(service, None, notifier, None)
            .build_report(&context, &batch)
            .await;
        assert!(report
            .body
            .contains("Result: http://results.example.org/result/T1/\n\nFailed to retrieve results from Webpagetest\n"));
        let sent = mailer.sent_to("admin@example.org");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.ends_with(FETCH_FAILED));
    }

    #[tokio::test]
    async fn test_warehouse_only_when_requested() {
        let service = Arc::new(FakeTestService::default());
        let warehouse = Arc::new(RecordingWarehouse::default());
        let mut context = context(&["Cable"], &["a.com", "b.com"]);
        let batch = run_batch(&service, &context).await;

        let (notifier, _) = recording_notifier();
        let aggregator = aggregator(service, Some(warehouse.clone()), notifier, None);
        aggregator.build_report(&context, &batch).await;
        assert!(warehouse.datasets.lock().unwrap().is_empty());

        context.job.warehouse = true;
        aggregator.build_report(&context, &batch).await;
        let datasets = warehouse.datasets.lock().unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].machine, "loc1");
        assert_eq!(datasets[0].suite, "loc1.Cable");
    }

    #[tokio::test]
    async fn test_results_are_dumped() {
        let directory = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeTestService::default());
        let context = context(&["Cable"], &["a.com"]);
        let batch = run_batch(&service, &context).await;
        let (notifier, _) = recording_notifier();
        aggregator(service, None, notifier, Some(directory.path().to_path_buf()))
            .report(&context, &batch)
            .await;

        let text = std::fs::read_to_string(directory.path().join("results-1.txt")).unwrap();
        assert!(text.starts_with("Results for location loc1"));
        let json = std::fs::read_to_string(directory.path().join("results-T1.json")).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["data"]["url"], "a.com");
    }
}
