use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("invalid date {input:?}: {source}")]
    InvalidDate {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("week starting {week_start} is not open for new reports")]
    WeekNotReportable { week_start: NaiveDate },

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no authenticated user")]
    Unauthenticated,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for failures that came from the persistence collaborator rather
    /// than from the caller's input.
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Migration(_) | Self::Csv(_) | Self::Io(_)
        )
    }
}
