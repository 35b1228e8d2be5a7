mod automatic;
mod batch;
mod client;
mod context;
mod manager;
mod report;
mod scheduler;

pub use crate::scheduling::automatic::AutomaticJobs;
pub use crate::scheduling::batch::{BatchEngine, LocationBatch, TrackedTest};
pub use crate::scheduling::client::{SchedulerClient, SchedulerClientError};
pub use crate::scheduling::context::JobContext;
pub use crate::scheduling::manager::{create_job, JobManager, Stages};
pub use crate::scheduling::report::ResultAggregator;
pub use crate::scheduling::scheduler::Scheduler;

#[cfg(test)]
pub use crate::scheduling::client::test::in_memory_client;
