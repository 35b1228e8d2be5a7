use crate::build::BuildInfo;
use crate::models::{Job, JobId};

/// State of the job being processed, handed from stage to stage.
///
/// It only lives while the job runs: purging the job consumes it.
#[derive(Debug)]
pub struct JobContext {
    pub job: Job<JobId>,
    /// identity of the installed build, once known
    pub build_info: Option<BuildInfo>,
}

impl JobContext {
    pub fn new(job: Job<JobId>) -> Self {
        Self {
            job,
            build_info: None,
        }
    }
}
