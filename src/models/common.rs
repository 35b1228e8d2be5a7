use thiserror::Error;

/// Errors raised by the job store.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid job submission: {0}")]
    InvalidJob(String),
    #[error("no such model")]
    ModelNotFound,
    #[error("database error: {0}")]
    DbError(String),
    #[error("bad column '{0}'")]
    ColumnError(String),
}

impl From<sqlx::Error> for ModelError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::ModelNotFound,
            sqlx::Error::ColumnNotFound(column) => Self::ColumnError(column),
            error => Self::DbError(error.to_string()),
        }
    }
}
