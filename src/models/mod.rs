mod common;
mod jobs;
mod parameters;
mod status;

pub use crate::models::common::ModelError;
pub use crate::models::jobs::{now, Job, JobId, JobSpec, NewJob};
pub use crate::models::parameters::ParameterKind;
pub use crate::models::status::JobStatus;

use sqlx::SqliteConnection;

/// Statements creating the `jobs`, `locations`, `speeds` and `urls` tables.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Create the tables (if missing).
pub async fn create_schema(conn: &mut SqliteConnection) -> Result<(), ModelError> {
    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(SCHEMA))
        .await
        .map_err(|e| ModelError::DbError(format!("failed to create schema: {:?}", e)))?;
    Ok(())
}

#[cfg(test)]
pub mod test {
    use crate::models::{create_schema, Job, JobId, JobSpec, JobStatus, ModelError, NewJob};
    use chrono::Duration;
    use sqlx::{Connection, SqliteConnection};

    pub const TRY_TEMPLATE: &str =
        "http://ftp.example.org/try-builds/{email}-{revision}/try-win32/";

    /// create an in-memory database, and create the schema.
    pub async fn setup_in_memory_database() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory database");
        create_schema(&mut conn)
            .await
            .expect("failed to create schema");
        conn
    }

    pub fn build_spec(label: &str) -> JobSpec {
        JobSpec {
            email: "user@example.org".to_string(),
            build: "http://builds.example.org/firefox.exe".to_string(),
            label: label.to_string(),
            runs: 1,
            tcpdump: false,
            video: true,
            warehouse: false,
            prescript: None,
            postscript: None,
            locations: vec!["loc1".to_string()],
            speeds: vec!["Cable".to_string()],
            urls: vec!["a.com".to_string(), "b.com".to_string()],
        }
    }

    pub fn build_job(label: &str) -> Job<NewJob> {
        build_spec(label)
            .into_job(TRY_TEMPLATE)
            .expect("valid job spec")
    }

    async fn count(table: &str, job: JobId, conn: &mut SqliteConnection) -> i64 {
        let column = if table == "jobs" { "id" } else { "jobid" };
        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT count(*) FROM {} WHERE {} = ?", table, column))
                .bind(job)
                .fetch_one(conn)
                .await
                .expect("failed to count rows");
        count
    }

    #[tokio::test]
    async fn test_job_persistence() {
        let mut conn = setup_in_memory_database().await;
        let mut spec = build_spec("persisted");
        spec.speeds = vec!["DSL".to_string(), "Cable".to_string(), "3G".to_string()];
        let job = spec.into_job(TRY_TEMPLATE).unwrap().save(&mut conn).await.unwrap();

        let loaded = Job::get_by_id(job.id, &mut conn).await.unwrap();
        assert_eq!(loaded.label, "persisted");
        assert_eq!(loaded.status, JobStatus::Waiting);
        assert_eq!(loaded.timestamp, None);
        assert_eq!(loaded.runs, 1);
        assert!(loaded.video);
        // insertion order is kept
        assert_eq!(loaded.speeds, vec!["DSL", "Cable", "3G"]);
        assert_eq!(loaded.urls, vec!["a.com", "b.com"]);
        assert_eq!(loaded.tests_per_location(), 6);
    }

    #[tokio::test]
    async fn test_purge_only_touches_its_own_rows() {
        let mut conn = setup_in_memory_database().await;
        let first = build_job("first").save(&mut conn).await.unwrap();
        let second = build_job("second").save(&mut conn).await.unwrap();

        Job::purge(first.id, &mut conn).await.unwrap();

        for table in ["jobs", "locations", "speeds", "urls"] {
            assert_eq!(count(table, first.id, &mut conn).await, 0, "{}", table);
        }
        assert_eq!(count("jobs", second.id, &mut conn).await, 1);
        assert_eq!(count("locations", second.id, &mut conn).await, 1);
        assert_eq!(count("speeds", second.id, &mut conn).await, 1);
        assert_eq!(count("urls", second.id, &mut conn).await, 2);
        let second = Job::get_by_id(second.id, &mut conn).await.unwrap();
        assert_eq!(second.urls, vec!["a.com", "b.com"]);
    }

    #[tokio::test]
    async fn test_purge_unknown_job_is_harmless() {
        let mut conn = setup_in_memory_database().await;
        assert!(Job::purge(42, &mut conn).await.is_ok());
        assert!(matches!(
            Job::get_by_id(42, &mut conn).await,
            Err(ModelError::ModelNotFound)
        ));
    }

    #[tokio::test]
    async fn test_select_waiting_jobs_with_cutoff() {
        let mut conn = setup_in_memory_database().await;
        let unchecked = build_job("unchecked").save(&mut conn).await.unwrap();
        let mut checked = build_job("checked").save(&mut conn).await.unwrap();
        checked
            .update_status(JobStatus::Waiting, &mut conn)
            .await
            .unwrap();

        // a cutoff in the past only sees the never checked job
        let cutoff = crate::models::now() - Duration::minutes(5);
        let jobs = Job::select_by_status(JobStatus::Waiting, Some(cutoff), &mut conn)
            .await
            .unwrap();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![unchecked.id]);

        // without cutoff, both are waiting
        let jobs = Job::select_by_status(JobStatus::Waiting, None, &mut conn)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_stores_resolved_build() {
        let mut conn = setup_in_memory_database().await;
        let mut job = build_job("resolved").save(&mut conn).await.unwrap();
        job.build = "http://builds.example.org/firefox-100.win32.installer.exe".to_string();
        job.update_status(JobStatus::Pending, &mut conn).await.unwrap();

        let loaded = Job::get_by_id(job.id, &mut conn).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.build, job.build);
        assert!(loaded.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_at_most_one_running_job() {
        let mut conn = setup_in_memory_database().await;
        let mut ids = Vec::new();
        for (idx, label) in ["a", "b", "c"].iter().enumerate() {
            let mut job = build_job(label);
            // the last one is the oldest
            job.started = job.started - Duration::minutes(idx as i64);
            let mut job = job.save(&mut conn).await.unwrap();
            job.update_status(JobStatus::Pending, &mut conn).await.unwrap();
            ids.push(job.id);
        }

        let promoted = Job::promote_oldest_pending(&mut conn)
            .await
            .unwrap()
            .expect("one job should be promoted");
        assert_eq!(promoted.id, ids[2]);
        assert_eq!(promoted.status, JobStatus::Running);

        // any further promotion is refused while it runs
        for _ in 0..3 {
            assert!(Job::promote_oldest_pending(&mut conn).await.unwrap().is_none());
            assert_eq!(
                Job::count_by_status(JobStatus::Running, &mut conn).await.unwrap(),
                1
            );
        }

        // once purged, the next oldest one is promoted
        Job::purge(promoted.id, &mut conn).await.unwrap();
        let promoted = Job::promote_oldest_pending(&mut conn).await.unwrap().unwrap();
        assert_eq!(promoted.id, ids[1]);
        assert_eq!(
            Job::count_by_status(JobStatus::Running, &mut conn).await.unwrap(),
            1
        );
    }

    #[test]
    fn test_spec_validation() {
        let mut spec = build_spec("invalid");
        spec.runs = 0;
        assert!(matches!(
            spec.into_job(TRY_TEMPLATE),
            Err(ModelError::InvalidJob(_))
        ));

        let mut spec = build_spec("invalid");
        spec.urls = vec!["  ".to_string()];
        assert!(spec.into_job(TRY_TEMPLATE).is_err());

        let mut spec = build_spec("invalid");
        spec.email = String::new();
        assert!(spec.into_job(TRY_TEMPLATE).is_err());
    }

    #[test]
    fn test_revision_is_rewritten_into_try_build() {
        let mut spec = build_spec("try");
        spec.build = "a1b2c3d4e5f6".to_string();
        let job = spec.into_job(TRY_TEMPLATE).unwrap();
        assert_eq!(
            job.build,
            "http://ftp.example.org/try-builds/user@example.org-a1b2c3d4e5f6/try-win32/"
        );

        // urls are left untouched
        let job = build_job("url");
        assert_eq!(job.build, "http://builds.example.org/firefox.exe");
    }

    #[test]
    fn test_script_for_url() {
        let job = build_job("no script");
        assert_eq!(job.script_for("a.com"), None);

        let mut spec = build_spec("scripted");
        spec.prescript = Some("setPref\\tfoo\\tbar".to_string());
        spec.postscript = Some("   ".to_string());
        let job = spec.into_job(TRY_TEMPLATE).unwrap();
        assert_eq!(job.postscript, None);
        assert_eq!(
            job.script_for("a.com").unwrap(),
            "setPref\tfoo\tbar\nnavigate\ta.com\n"
        );
    }
}
