use crate::models::ModelError;
use thiserror::Error;

/// Failures aborting a job.
///
/// None of them is retried: the job is purged and both its submitter
/// and the administrators are notified.
#[derive(Debug, Error)]
pub enum JobError {
    /// persistence operation failed
    #[error("storage error: {0}")]
    Storage(#[from] ModelError),
    /// a remote call failed, or the service answered with a failure status
    #[error("network error: {0}")]
    Network(String),
    /// malformed remote response
    #[error("parse error: {0}")]
    Parse(String),
    /// build download or install descriptor write failed
    #[error("artifact error: {0}")]
    Artifact(String),
    /// a remote call did not answer in time
    #[error("timeout: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for JobError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}
