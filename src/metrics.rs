use crate::build::BuildInfo;
use crate::error::JobError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics kept from each view of each run.
pub const METRIC_KEYS: [&str; 10] = [
    "TTFB",
    "render",
    "docTime",
    "fullyLoaded",
    "SpeedIndex",
    "SpeedIndexDT",
    "bytesInDoc",
    "requestsDoc",
    "domContentLoadedEventStart",
    "visualComplete",
];

const VIEWS: [&str; 2] = ["firstView", "repeatView"];

/// metric name -> one value per run
pub type ViewMetrics = BTreeMap<String, Vec<Value>>;

/// Raw test data attached to a dataset.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestData {
    pub label: String,
    pub url: String,
    pub location: String,
    pub connectivity: String,
    #[serde(rename = "firstView")]
    pub first_view: ViewMetrics,
    #[serde(rename = "repeatView")]
    pub repeat_view: ViewMetrics,
}

impl TestData {
    pub fn views(&self) -> [(&'static str, &ViewMetrics); 2] {
        [
            ("firstView", &self.first_view),
            ("repeatView", &self.repeat_view),
        ]
    }
}

/// What the warehouse receives for one test.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dataset {
    pub machine: String,
    pub os: String,
    pub os_version: String,
    pub platform: String,
    pub build: Option<BuildInfo>,
    pub suite: String,
    /// test name -> SpeedIndex values
    pub results: BTreeMap<String, Vec<Value>>,
    pub wpt_data: TestData,
}

fn truncated(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn text(data: &Value, key: &str) -> Result<String, JobError> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| JobError::Parse(format!("test result has no data.{}", key)))
}

/// Turns `jsonResult.php` payloads into warehouse datasets.
pub struct DatasetBuilder {
    user_agent: Regex,
}

impl DatasetBuilder {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            user_agent: Regex::new(r"^User-Agent: Mozilla/5.0 \(Windows NT ([^;]*);.*")?,
        })
    }

    /// Windows version from the request headers of a view.
    fn detect_os(&self, view: &Value) -> Option<String> {
        view.pointer("/requests/0/headers/request")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter(|header| header.contains("User-Agent"))
            .find_map(|header| self.user_agent.captures(header))
            .and_then(|captures| captures.get(1))
            .map(|version| version.as_str().to_string())
    }

    pub fn build(&self, result: &Value, build: Option<&BuildInfo>) -> Result<Dataset, JobError> {
        let data = result
            .get("data")
            .ok_or_else(|| JobError::Parse("test result has no data".to_string()))?;
        let location = text(data, "location")?;
        let connectivity = text(data, "connectivity")?;
        let url = text(data, "url")?;
        let label = data
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // runs are either an array whose first entry is a placeholder,
        // or an object keyed by run number
        let runs: Vec<&Value> = match data.get("runs") {
            Some(Value::Array(runs)) if runs.len() > 1 => runs.iter().collect(),
            Some(Value::Object(runs)) if !runs.is_empty() => runs.values().collect(),
            _ => return Err(JobError::Parse("no runs".to_string())),
        };

        let mut metrics: [ViewMetrics; 2] = Default::default();
        for view in metrics.iter_mut() {
            for key in METRIC_KEYS {
                view.insert(key.to_string(), Vec::new());
            }
        }
        let mut os_version = None;
        for run in runs {
            for (index, view_name) in VIEWS.iter().enumerate() {
                let view = match run.get(*view_name) {
                    Some(view) if is_set(view) => view,
                    _ => continue,
                };
                for key in METRIC_KEYS {
                    if let Some(value) = view.get(key).filter(|value| is_set(value)) {
                        if let Some(values) = metrics[index].get_mut(key) {
                            values.push(value.clone());
                        }
                    }
                }
                if os_version.is_none() {
                    os_version = self.detect_os(view);
                }
            }
        }
        let [first_view, repeat_view] = metrics;

        let suite = truncated(&format!("{}.{}", location, connectivity), 128);
        let url_name = truncated(&url, 252);
        let mut results = BTreeMap::new();
        results.insert(
            format!("{}:fv", url_name),
            first_view.get("SpeedIndex").cloned().unwrap_or_default(),
        );
        results.insert(
            format!("{}:rv", url_name),
            repeat_view.get("SpeedIndex").cloned().unwrap_or_default(),
        );

        let (os, os_version) = match os_version {
            Some(version) => ("WINNT".to_string(), version),
            None => ("unknown".to_string(), "unknown".to_string()),
        };
        Ok(Dataset {
            machine: location.split(':').next().unwrap_or_default().to_string(),
            os,
            os_version,
            platform: "x86".to_string(),
            build: build.cloned(),
            suite,
            results,
            wpt_data: TestData {
                label,
                url,
                location,
                connectivity,
                first_view,
                repeat_view,
            },
        })
    }
}

/// Long term storage of test metrics.
#[async_trait]
pub trait MetricsWarehouse: Send + Sync {
    async fn submit(&self, dataset: &Dataset) -> Result<(), JobError>;
}

/// Posts datasets as JSON.
pub struct HttpWarehouse {
    client: Client,
    url: String,
}

impl HttpWarehouse {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, JobError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl MetricsWarehouse for HttpWarehouse {
    async fn submit(&self, dataset: &Dataset) -> Result<(), JobError> {
        let response = self.client.post(&self.url).json(dataset).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                "warehouse refused {} {}: {}",
                dataset.wpt_data.url,
                dataset.suite,
                status.as_str()
            );
            return Err(JobError::Network(format!("warehouse answered {}", status)));
        }
        debug!(
            "warehouse accepted {} {}: {}",
            dataset.wpt_data.url,
            dataset.suite,
            response.text().await.unwrap_or_default().to_lowercase()
        );
        Ok(())
    }
}
