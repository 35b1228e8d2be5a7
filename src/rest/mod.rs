mod jobs;

pub use crate::rest::jobs::{cancel_jobs, list_jobs, submit_job};

/// Front end routes, mounted under `/wpt`.
pub fn routes() -> Vec<rocket::Route> {
    routes![submit_job, list_jobs, cancel_jobs]
}
