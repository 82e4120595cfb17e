use storage::error::StorageError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ContestError>;

#[derive(Error, Debug)]
pub enum ContestError {
    /// The request cannot be carried out as sent; the caller has to fix it
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    NotFound(String),

    /// Storage failure; the message is not meant for end users
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Rejected,
    NotFound,
    Internal,
}

impl ContestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message without the variant's prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected(msg) | Self::NotFound(msg) | Self::Internal(msg) => msg,
        }
    }

    pub fn contest_not_found(competition_id: &str) -> Self {
        Self::NotFound(format!("Competition with id {} not found", competition_id))
    }
}

impl From<StorageError> for ContestError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound => Self::NotFound("Resource not found".to_string()),
            StorageError::ConstraintViolation(msg) => Self::Rejected(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ContestError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Rejected(format!("Validation failed: {}", errors))
    }
}
