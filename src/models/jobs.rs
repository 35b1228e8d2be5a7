use crate::models::{JobStatus, ModelError, ParameterKind};
use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};

/// newly created job, not existing in db yet
#[derive(Debug, Clone)]
pub struct NewJob;
/// id (primary key) of a job
pub type JobId = i64;

/// Current time, as stored in the database.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

/// The `Job` struct implements abstraction over the `jobs` SQL table,
/// defined as such:
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS jobs (
///       id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
///       email TEXT NOT NULL,
///       build TEXT NOT NULL,
///       label TEXT NOT NULL DEFAULT '',
///       runs INTEGER NOT NULL CHECK (runs > 0),
///       tcpdump BOOLEAN NOT NULL DEFAULT 0,
///       video BOOLEAN NOT NULL DEFAULT 0,
///       warehouse BOOLEAN NOT NULL DEFAULT 0,
///       prescript TEXT DEFAULT NULL,
///       postscript TEXT DEFAULT NULL,
///       status TINYINT NOT NULL DEFAULT 0 CHECK (status in (0, 1, 2)),
///       started DATETIME NOT NULL,
///       timestamp DATETIME DEFAULT NULL
/// );
/// ```
///
/// A job also owns the rows of the `locations`, `speeds` and `urls` tables
/// referencing it (see `crate::models::ParameterKind`), they are loaded along
/// with it. The cross product of those three lists is the set of tests
/// the job submits.
#[derive(Debug, Clone, Serialize)]
pub struct Job<Id> {
    pub id: Id,
    /// submitter address, all notifications about the job go there
    pub email: String,
    /// build locator, replaced by the concrete build url once resolved
    pub build: String,
    pub label: String,
    /// number of runs per test
    pub runs: u32,
    /// capture network traffic
    pub tcpdump: bool,
    /// capture video
    pub video: bool,
    /// deliver results to the metrics warehouse
    pub warehouse: bool,
    /// script executed before navigating to the url
    pub prescript: Option<String>,
    /// script executed after the page load
    pub postscript: Option<String>,
    pub status: JobStatus,
    /// When the user submitted it
    pub started: NaiveDateTime,
    /// last update (build check or state change), None if never checked
    pub timestamp: Option<NaiveDateTime>,
    pub locations: Vec<String>,
    pub speeds: Vec<String>,
    pub urls: Vec<String>,
}

/// A job submission, as accepted from the front end,
/// the command line or the automatic jobs configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobSpec {
    pub email: String,
    pub build: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default)]
    pub tcpdump: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default, alias = "datazilla")]
    pub warehouse: bool,
    #[serde(default)]
    pub prescript: Option<String>,
    #[serde(default)]
    pub postscript: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub speeds: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

fn default_runs() -> u32 {
    1
}

/// Build locators made only of alphanumeric characters are revisions
/// pushed to the try server.
fn is_revision(build: &str) -> bool {
    !build.is_empty() && build.chars().all(|c| c.is_ascii_alphanumeric())
}

fn non_empty(script: Option<String>) -> Option<String> {
    script
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

impl JobSpec {
    /// Validate the submission and build an unsaved `Job`.
    ///
    /// `try_build_template` is used to rewrite bare revisions into the
    /// try-build directory url, its `{email}` and `{revision}` placeholders
    /// are substituted.
    pub fn into_job(self, try_build_template: &str) -> Result<Job<NewJob>, ModelError> {
        let email = self.email.trim().to_string();
        let mut build = self.build.trim().to_string();
        let locations = clean_list(self.locations);
        let speeds = clean_list(self.speeds);
        let urls = clean_list(self.urls);

        if email.is_empty() {
            return Err(ModelError::InvalidJob("missing email".to_string()));
        }
        if build.is_empty() {
            return Err(ModelError::InvalidJob("missing build".to_string()));
        }
        if self.runs == 0 {
            return Err(ModelError::InvalidJob("runs must be positive".to_string()));
        }
        if locations.is_empty() || speeds.is_empty() || urls.is_empty() {
            return Err(ModelError::InvalidJob(
                "locations, speeds and urls are required".to_string(),
            ));
        }
        if is_revision(&build) {
            build = try_build_template
                .replace("{email}", &email)
                .replace("{revision}", &build);
        }

        Ok(Job {
            id: NewJob,
            email,
            build,
            label: self.label.trim().to_string(),
            runs: self.runs,
            tcpdump: self.tcpdump,
            video: self.video,
            warehouse: self.warehouse,
            prescript: non_empty(self.prescript),
            postscript: non_empty(self.postscript),
            status: JobStatus::Waiting,
            started: now(),
            timestamp: None,
            locations,
            speeds,
            urls,
        })
    }
}

/// Scripts are typed in single line inputs, `\t` and `\n` stand
/// for tabs and new lines.
fn expand_escapes(script: &str) -> String {
    script.replace("\\t", "\t").replace("\\n", "\n")
}

impl<Id> Job<Id> {
    /// Same job, with another id type.
    pub fn with_id<T>(self, id: T) -> Job<T> {
        Job {
            id,
            email: self.email,
            build: self.build,
            label: self.label,
            runs: self.runs,
            tcpdump: self.tcpdump,
            video: self.video,
            warehouse: self.warehouse,
            prescript: self.prescript,
            postscript: self.postscript,
            status: self.status,
            started: self.started,
            timestamp: self.timestamp,
            locations: self.locations,
            speeds: self.speeds,
            urls: self.urls,
        }
    }

    /// Number of tests one location of this job produces.
    pub fn tests_per_location(&self) -> usize {
        self.speeds.len() * self.urls.len()
    }

    /// Script submitted for `url`, if the job carries any script.
    /// The page load itself is a `navigate` command between the
    /// pre and post scripts.
    pub fn script_for(&self, url: &str) -> Option<String> {
        if self.prescript.is_none() && self.postscript.is_none() {
            return None;
        }
        let mut script = String::new();
        if let Some(prescript) = &self.prescript {
            script.push_str(&expand_escapes(prescript));
            script.push('\n');
        }
        script.push_str(&format!("navigate\t{}\n", url));
        if let Some(postscript) = &self.postscript {
            script.push_str(&expand_escapes(postscript));
            script.push('\n');
        }
        Some(script)
    }
}

impl Job<NewJob> {
    /// Insert the job and its locations, speeds and urls,
    /// in one transaction.
    pub async fn save(self, conn: &mut SqliteConnection) -> Result<Job<JobId>, ModelError> {
        let mut transaction = conn
            .begin()
            .await
            .map_err(|e| ModelError::DbError(e.to_string()))?;
        let query_result = sqlx::query(
            "INSERT INTO jobs (email, build, label, runs, tcpdump, video, warehouse, \
            prescript, postscript, status, started) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.email)
        .bind(&self.build)
        .bind(&self.label)
        .bind(self.runs)
        .bind(self.tcpdump)
        .bind(self.video)
        .bind(self.warehouse)
        .bind(&self.prescript)
        .bind(&self.postscript)
        .bind(self.status.as_u8())
        .bind(self.started)
        .execute(&mut *transaction)
        .await
        .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;
        let id: JobId = query_result.last_insert_rowid();

        ParameterKind::Location
            .insert_all(id, &self.locations, &mut transaction)
            .await?;
        ParameterKind::Speed
            .insert_all(id, &self.speeds, &mut transaction)
            .await?;
        ParameterKind::Url
            .insert_all(id, &self.urls, &mut transaction)
            .await?;
        transaction
            .commit()
            .await
            .map_err(|e| ModelError::DbError(e.to_string()))?;

        Ok(self.with_id(id))
    }
}

const JOB_COLUMNS: &str = "id, email, build, label, runs, tcpdump, video, warehouse, \
    prescript, postscript, status, started, timestamp";

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, ModelError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|_| ModelError::ColumnError(name.to_string()))
}

impl Job<JobId> {
    /// Build a job from a `jobs` row, then load its locations, speeds and urls.
    async fn from_row(row: &SqliteRow, conn: &mut SqliteConnection) -> Result<Self, ModelError> {
        let id: JobId = column(row, "id")?;
        let status_code: u8 = column(row, "status")?;
        let status = JobStatus::from_u8(status_code)
            .map_err(|_| ModelError::ColumnError("status".to_string()))?;
        Ok(Self {
            id,
            email: column(row, "email")?,
            build: column(row, "build")?,
            label: column(row, "label")?,
            runs: column(row, "runs")?,
            tcpdump: column(row, "tcpdump")?,
            video: column(row, "video")?,
            warehouse: column(row, "warehouse")?,
            prescript: column(row, "prescript")?,
            postscript: column(row, "postscript")?,
            status,
            started: column(row, "started")?,
            timestamp: column(row, "timestamp")?,
            locations: ParameterKind::Location.select_by_job(id, conn).await?,
            speeds: ParameterKind::Speed.select_by_job(id, conn).await?,
            urls: ParameterKind::Url.select_by_job(id, conn).await?,
        })
    }

    async fn from_rows(
        rows: Vec<SqliteRow>,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, ModelError> {
        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(Self::from_row(row, conn).await?);
        }
        Ok(jobs)
    }

    /// Select a Job by its id
    pub async fn get_by_id(id: JobId, conn: &mut SqliteConnection) -> Result<Self, ModelError> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Self::from_row(&row, conn).await
    }

    /// query database and return all jobs with a status set to `status`,
    /// oldest first.
    ///
    /// With a `cutoff`, only the jobs never updated, or last updated
    /// before `cutoff` are returned.
    pub async fn select_by_status(
        status: JobStatus,
        cutoff: Option<NaiveDateTime>,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, ModelError> {
        let rows = match cutoff {
            Some(cutoff) => {
                sqlx::query(&format!(
                    "SELECT {} FROM jobs WHERE status = ? \
                    AND (timestamp IS NULL OR timestamp < ?) ORDER BY started, id",
                    JOB_COLUMNS
                ))
                .bind(status.as_u8())
                .bind(cutoff)
                .fetch_all(&mut *conn)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM jobs WHERE status = ? ORDER BY started, id",
                    JOB_COLUMNS
                ))
                .bind(status.as_u8())
                .fetch_all(&mut *conn)
                .await
            }
        }
        .map_err(|e| ModelError::DbError(e.to_string()))?;
        Self::from_rows(rows, conn).await
    }

    /// every stored job, oldest first
    pub async fn select_all(conn: &mut SqliteConnection) -> Result<Vec<Self>, ModelError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs ORDER BY started, id",
            JOB_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| ModelError::DbError(e.to_string()))?;
        Self::from_rows(rows, conn).await
    }

    pub async fn count_by_status(
        status: JobStatus,
        conn: &mut SqliteConnection,
    ) -> Result<usize, ModelError> {
        let (count,): (i64,) = sqlx::query_as("SELECT count(id) FROM jobs WHERE status = ?")
            .bind(status.as_u8())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| ModelError::DbError(e.to_string()))?;
        Ok(count as usize)
    }

    /// Mark the oldest pending job as running, and return it.
    ///
    /// Nothing is promoted while another job is running: this single
    /// statement is what keeps at most one job running.
    pub async fn promote_oldest_pending(
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, ModelError> {
        let promoted: Option<(JobId,)> = sqlx::query_as(
            "UPDATE jobs SET status = ?, timestamp = ? \
            WHERE id = (SELECT id FROM jobs WHERE status = ? ORDER BY started, id LIMIT 1) \
            AND NOT EXISTS (SELECT 1 FROM jobs WHERE status = ?) \
            RETURNING id",
        )
        .bind(JobStatus::Running.as_u8())
        .bind(now())
        .bind(JobStatus::Pending.as_u8())
        .bind(JobStatus::Running.as_u8())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;

        match promoted {
            Some((id,)) => Ok(Some(Self::get_by_id(id, conn).await?)),
            None => Ok(None),
        }
    }

    /// Store `status` and the current build locator,
    /// and set the last update time to now.
    pub async fn update_status(
        &mut self,
        status: JobStatus,
        conn: &mut SqliteConnection,
    ) -> Result<(), ModelError> {
        let timestamp = now();
        let query_result =
            sqlx::query("UPDATE jobs SET build = ?, status = ?, timestamp = ? WHERE id = ?")
                .bind(&self.build)
                .bind(status.as_u8())
                .bind(timestamp)
                .bind(self.id)
                .execute(&mut *conn)
                .await
                .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;
        if query_result.rows_affected() == 0 {
            return Err(ModelError::ModelNotFound);
        }
        self.status = status;
        self.timestamp = Some(timestamp);
        Ok(())
    }

    /// Delete the job `id` with its urls, speeds and locations
    /// (in that order, children first).
    pub async fn purge(id: JobId, conn: &mut SqliteConnection) -> Result<(), ModelError> {
        for kind in ParameterKind::PURGE_ORDER {
            kind.delete_by_job(id, conn).await?;
        }
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;
        Ok(())
    }
}
