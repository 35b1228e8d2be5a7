use crate::models::{JobId, JobSpec};
use crate::scheduling::{SchedulerClient, SchedulerClientError};
use rocket::{
    http::Status as HttpStatus,
    response::status::Custom,
    serde::json::{json, Json, Value as JsonValue},
    State,
};

fn error_status(error: SchedulerClientError) -> Custom<String> {
    let status = match error {
        SchedulerClientError::InvalidJob(_) => HttpStatus::BadRequest,
        SchedulerClientError::Storage(_) | SchedulerClientError::SchedulerStopped => {
            HttpStatus::InternalServerError
        }
    };
    Custom(status, error.to_string())
}

/// job ids listed under `canceljobs`
fn cancel_ids(submission: &JsonValue) -> Result<Vec<JobId>, Custom<String>> {
    match submission.get("canceljobs") {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(ids) => serde_json::from_value(ids.clone()).map_err(|e| {
            Custom(
                HttpStatus::BadRequest,
                format!("canceljobs must be a list of job ids: {}", e),
            )
        }),
    }
}

/// Submit a job, and/or cancel jobs.
///
/// A job is created when the submission carries a build,
/// jobs listed in `canceljobs` are cancelled.
#[post("/jobs", format = "json", data = "<submission>")]
pub async fn submit_job(
    scheduler: &State<SchedulerClient>,
    submission: Json<JsonValue>,
) -> Result<JsonValue, Custom<String>> {
    let scheduler = scheduler.inner();
    let submission = submission.into_inner();
    let cancelled = cancel_ids(&submission)?;

    let job_id = if submission.get("build").is_some() {
        let spec: JobSpec = serde_json::from_value(submission)
            .map_err(|e| Custom(HttpStatus::BadRequest, e.to_string()))?;
        let job = scheduler.submit_job(spec).await.map_err(error_status)?;
        Some(job.id)
    } else {
        None
    };

    scheduler.cancel_jobs(&cancelled).map_err(error_status)?;
    Ok(json!({
        "id": job_id,
        "cancelled": cancelled,
    }))
}

/// Every job, with its locations, speeds and urls.
#[get("/jobs")]
pub async fn list_jobs(scheduler: &State<SchedulerClient>) -> Result<JsonValue, Custom<String>> {
    let jobs = scheduler.inner().list_jobs().await.map_err(error_status)?;
    Ok(json!({ "jobs": jobs }))
}

/// Queue the cancellation of jobs.
#[post("/jobs/cancel", format = "json", data = "<ids>")]
pub async fn cancel_jobs(
    scheduler: &State<SchedulerClient>,
    ids: Json<Vec<JobId>>,
) -> Result<JsonValue, Custom<String>> {
    scheduler.inner().cancel_jobs(&ids).map_err(error_status)?;
    Ok(json!({ "cancelled": ids.into_inner() }))
}
