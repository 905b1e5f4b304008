use crate::domain::model::{ListingId, ListingKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("At most {capacity} listings can be featured")]
    CapacityExceeded { capacity: usize },

    #[error("{kind} {id} not found")]
    NotFound { kind: ListingKind, id: ListingId },

    #[error("Featured rank must be between 1 and 3, got {value}")]
    InvalidRank { value: i64 },

    #[error("Listing {id} is not featured")]
    NotFeatured { id: ListingId },

    #[error("Listing {id} is already featured")]
    AlreadyFeatured { id: ListingId },

    #[error("Listing {id} is not published and cannot be featured")]
    NotPublished { id: ListingId },

    #[error("Slot invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Transaction conflict: {message}")]
    TransactionConflict { message: String },

    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Background task failed: {message}")]
    TaskError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Concurrency,
    Storage,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<rusqlite::Error> for SlotError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                SlotError::TransactionConflict {
                    message: err.to_string(),
                }
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                SlotError::TransactionConflict {
                    message: err.to_string(),
                }
            }
            _ => SlotError::Storage(err),
        }
    }
}

impl From<tokio::task::JoinError> for SlotError {
    fn from(err: tokio::task::JoinError) -> Self {
        SlotError::TaskError {
            message: err.to_string(),
        }
    }
}

impl SlotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SlotError::CapacityExceeded { .. }
            | SlotError::InvalidRank { .. }
            | SlotError::NotFeatured { .. }
            | SlotError::AlreadyFeatured { .. }
            | SlotError::NotPublished { .. } => ErrorCategory::Validation,
            SlotError::NotFound { .. } => ErrorCategory::NotFound,
            SlotError::TransactionConflict { .. } => ErrorCategory::Concurrency,
            SlotError::Storage(_) | SlotError::IoError(_) => ErrorCategory::Storage,
            SlotError::ConfigError { .. }
            | SlotError::InvalidConfigValueError { .. }
            | SlotError::MissingConfigError { .. }
            | SlotError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            SlotError::InvariantViolation { .. }
            | SlotError::SerializationError(_)
            | SlotError::TaskError { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::NotFound => ErrorSeverity::Low,
            ErrorCategory::Concurrency => ErrorSeverity::Medium,
            ErrorCategory::Storage | ErrorCategory::Internal => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    /// Whether re-running the whole operation with fresh reads may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SlotError::TransactionConflict { .. })
    }

    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            _ => 500,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SlotError::CapacityExceeded { .. } => "Release a featured listing before featuring another",
            SlotError::NotFound { .. } => "Check the listing id and kind",
            SlotError::InvalidRank { .. } => "Use a featured order of 1, 2 or 3",
            SlotError::NotFeatured { .. } => "Feature the listing before reordering it",
            SlotError::AlreadyFeatured { .. } => "Send a featured order to reorder instead",
            SlotError::NotPublished { .. } => "Publish the listing before featuring it",
            SlotError::TransactionConflict { .. } => "Retry the request",
            SlotError::InvariantViolation { .. } => "Inspect the featured rows of this kind",
            SlotError::Storage(_) | SlotError::IoError(_) => {
                "Check that the database file is reachable and writable"
            }
            SlotError::ConfigError { .. }
            | SlotError::InvalidConfigValueError { .. }
            | SlotError::MissingConfigError { .. }
            | SlotError::ConfigValidationError { .. } => "Fix the configuration file or CLI flags",
            SlotError::SerializationError(_) | SlotError::TaskError { .. } => {
                "Check the server logs"
            }
        }
    }

    /// Message shown to admin users.
    pub fn user_friendly_message(&self) -> String {
        match self {
            SlotError::CapacityExceeded { capacity } => {
                format!("En fazla {} ilan öne çıkarılabilir", capacity)
            }
            SlotError::NotFound { .. } => "Kayıt bulunamadı".to_string(),
            SlotError::InvalidRank { .. } => "Öne çıkarma sırası 1, 2 veya 3 olmalıdır".to_string(),
            SlotError::NotFeatured { .. } => "İlan öne çıkarılmamış".to_string(),
            SlotError::AlreadyFeatured { .. } => "İlan zaten öne çıkarılmış".to_string(),
            SlotError::NotPublished { .. } => {
                "Yayında olmayan ilan öne çıkarılamaz".to_string()
            }
            SlotError::ConfigError { .. }
            | SlotError::InvalidConfigValueError { .. }
            | SlotError::MissingConfigError { .. }
            | SlotError::ConfigValidationError { .. } => self.to_string(),
            _ => "Sunucu hatası".to_string(),
        }
    }

    /// Like `user_friendly_message`, with the kind's label for capacity errors.
    pub fn message_for(&self, kind: ListingKind) -> String {
        match self {
            SlotError::CapacityExceeded { capacity } => {
                format!("En fazla {} {} öne çıkarılabilir", capacity, kind.label())
            }
            _ => self.user_friendly_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SlotError>;
