use crate::commands::build_notifier;
use crate::config::Config;
use crate::models::{create_schema, JobId, JobSpec};
use crate::scheduling::create_job;
use std::path::Path;

/// Store the job described by the JSON file at `path`.
pub async fn submit_job(path: &Path, config: &Config) -> Result<JobId, String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {:?}: {}", path, e))?;
    let spec: JobSpec =
        serde_json::from_str(&content).map_err(|e| format!("invalid job {:?}: {}", path, e))?;

    let conn = &mut config
        .database_connection()
        .await
        .map_err(|e| format!("failed to open database: {:?}", e))?;
    create_schema(conn)
        .await
        .map_err(|e| format!("failed to create tables: {}", e))?;
    let job = create_job(
        spec,
        &config.scheduler.try_build_template,
        conn,
        &build_notifier(config),
    )
    .await
    .map_err(|e| format!("failed to submit job: {}", e))?;
    Ok(job.id)
}
