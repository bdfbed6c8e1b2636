use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Bad cron syntax, ambiguous one-time spec, or a trigger that can never fire.
    #[error("invalid trigger: {message}")]
    InvalidTrigger { message: String },

    /// The outbound request description is unusable (bad URL or method).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("job already exists: {job_id}")]
    Conflict { job_id: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_trigger(message: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(job_id: impl Into<String>) -> Self {
        Self::Conflict {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
