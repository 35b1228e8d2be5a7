use crate::error::JobError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// One test submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub label: String,
    pub runs: u32,
    pub tcpdump: bool,
    pub video: bool,
    /// `location.speed`
    pub location: String,
    pub url: String,
    /// when set, submitted instead of `url`
    pub script: Option<String>,
}

/// The remote test-execution service.
#[async_trait]
pub trait TestService: Send + Sync {
    /// Submit one test, returns its id, or `None` if the service refused it.
    async fn submit_test(&self, request: &TestRequest) -> Result<Option<String>, JobError>;

    /// Raw status code of a test.
    async fn test_status(&self, test_id: &str) -> Result<i64, JobError>;

    /// Raw JSON result of a completed test.
    async fn test_result(&self, test_id: &str) -> Result<Value, JobError>;
}

/// `TestService` talking to a WebPagetest server over HTTP.
pub struct WptClient {
    client: Client,
    server: String,
    api_key: String,
}

fn status_code(payload: &Value) -> Option<i64> {
    payload.get("statusCode").and_then(Value::as_i64)
}

impl WptClient {
    pub fn new(server: &str, api_key: &str, timeout: Duration) -> Result<Self, JobError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, page: &str) -> String {
        format!("http://{}/{}", self.server, page)
    }

    /// Query parameters of `runtest.php`.
    pub fn submission_form(&self, request: &TestRequest) -> Vec<(&'static str, String)> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();
        let mut form = vec![
            ("f", "json".to_string()),
            ("private", "0".to_string()),
            ("priority", "6".to_string()),
            ("fvonly", "0".to_string()),
            ("mv", "0".to_string()),
            ("label", request.label.clone()),
            ("runs", request.runs.to_string()),
            ("tcpdump", flag(request.tcpdump)),
            ("video", flag(request.video)),
            ("location", request.location.clone()),
        ];
        match &request.script {
            Some(script) => form.push(("script", script.clone())),
            None => form.push(("url", request.url.clone())),
        }
        form.push(("k", self.api_key.clone()));
        form
    }
}

#[async_trait]
impl TestService for WptClient {
    async fn submit_test(&self, request: &TestRequest) -> Result<Option<String>, JobError> {
        let response = self
            .client
            .post(self.endpoint("runtest.php"))
            .form(&self.submission_form(request))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            warn!(
                "runtest.php answered {} for {} {}",
                response.status(),
                request.url,
                request.location
            );
            return Ok(None);
        }
        let payload: Value = response.json().await?;
        if status_code(&payload) != Some(200) {
            warn!(
                "test {} {} refused: {}",
                request.url,
                request.location,
                payload.get("statusText").unwrap_or(&serde_json::Value::Null)
            );
            return Ok(None);
        }
        let test_id = payload
            .pointer("/data/testId")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::Parse("runtest.php response has no testId".to_string()))?;
        debug!("submitted {} {} as {}", request.url, request.location, test_id);
        Ok(Some(test_id.to_string()))
    }

    async fn test_status(&self, test_id: &str) -> Result<i64, JobError> {
        let response = self
            .client
            .get(self.endpoint("testStatus.php"))
            .query(&[("f", "json"), ("test", test_id)])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(JobError::Network(format!(
                "testStatus.php answered {} for test {}",
                response.status(),
                test_id
            )));
        }
        let payload: Value = response.json().await?;
        status_code(&payload).ok_or_else(|| {
            JobError::Parse(format!("status of test {} has no statusCode", test_id))
        })
    }

    async fn test_result(&self, test_id: &str) -> Result<Value, JobError> {
        let response = self
            .client
            .get(self.endpoint("jsonResult.php"))
            .query(&[("test", test_id)])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(JobError::Network(format!(
                "jsonResult.php answered {} for test {}",
                response.status(),
                test_id
            )));
        }
        Ok(response.json().await?)
    }
}
