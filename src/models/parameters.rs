use crate::models::{JobId, ModelError};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

/// The three child tables of a job.
///
/// Each of them is defined as such (`<table>` / `<column>` being
/// `locations` / `location`, `speeds` / `speed` or `urls` / `url`):
/// ```sql
/// CREATE TABLE IF NOT EXISTS <table> (
///       id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
///       <column> TEXT NOT NULL,
///       jobid INTEGER NOT NULL,
///       FOREIGN KEY(jobid) REFERENCES jobs(id)
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Location,
    Speed,
    Url,
}

impl ParameterKind {
    /// Deletion order: children are removed before their job,
    /// urls first.
    pub const PURGE_ORDER: [ParameterKind; 3] = [Self::Url, Self::Speed, Self::Location];

    fn table(&self) -> &'static str {
        match *self {
            Self::Location => "locations",
            Self::Speed => "speeds",
            Self::Url => "urls",
        }
    }

    fn column(&self) -> &'static str {
        match *self {
            Self::Location => "location",
            Self::Speed => "speed",
            Self::Url => "url",
        }
    }

    /// Insert `values` for the job `job`, keeping their order.
    pub async fn insert_all(
        &self,
        job: JobId,
        values: &[String],
        conn: &mut SqliteConnection,
    ) -> Result<(), ModelError> {
        let statement = format!(
            "INSERT INTO {} ({}, jobid) VALUES (?, ?)",
            self.table(),
            self.column()
        );
        for value in values {
            sqlx::query(&statement)
                .bind(value)
                .bind(job)
                .execute(&mut *conn)
                .await
                .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;
        }
        Ok(())
    }

    /// Select the values of job `job`, in insertion order.
    pub async fn select_by_job(
        &self,
        job: JobId,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<String>, ModelError> {
        let statement = format!(
            "SELECT {} FROM {} WHERE jobid = ? ORDER BY id",
            self.column(),
            self.table()
        );
        let rows = sqlx::query(&statement)
            .bind(job)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| ModelError::DbError(e.to_string()))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(self.column())
                    .map_err(|_| ModelError::ColumnError(self.column().to_string()))
            })
            .collect()
    }

    pub async fn delete_by_job(
        &self,
        job: JobId,
        conn: &mut SqliteConnection,
    ) -> Result<(), ModelError> {
        let statement = format!("DELETE FROM {} WHERE jobid = ?", self.table());
        sqlx::query(&statement)
            .bind(job)
            .execute(&mut *conn)
            .await
            .map_err(|e| ModelError::DbError(format!("{:?}", e)))?;
        Ok(())
    }
}
