use thiserror::Error;

/// Faults raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// SQLSTATE class for integrity constraint violations.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let integrity = matches!(
            &err,
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| code.starts_with(INTEGRITY_CONSTRAINT_CLASS))
        );
        let connectivity = matches!(
            &err,
            sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
        );

        if integrity {
            Self::ConstraintViolation(err.to_string())
        } else if connectivity {
            Self::Unavailable(err.to_string())
        } else {
            Self::Database(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("specified item does not exist: {0}")]
    NotFound(String),

    #[error("specified item already exists: {0}")]
    AlreadyExists(String),

    #[error("internal configuration is invalid: {0}")]
    Initialization(String),

    #[error("could not publish event: {0}")]
    EventPublish(String),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("record identifier should already have been set")]
    MissingIdentifier,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("request was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn unspecified_id() -> Self {
        Self::InvalidArgument("no id was supplied".to_string())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Only storage faults are worth redelivering; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) | Self::InvalidPayload(_) | Self::MissingIdentifier => {
                "invalid_argument"
            }
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::Cancelled => "cancelled",
            Self::EventPublish(_) => "unavailable",
            Self::Initialization(_) | Self::Persistence(_) => "internal",
        }
    }
}
