//! Error types for the Places frecency subsystem

use thiserror::Error;

/// Main error type for history store and recalculation operations
#[derive(Debug, Error)]
pub enum PlacesError {
    /// SQLite errors from the history store
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// A page URL that cannot be parsed into an origin
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Recalculator-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A blocking database task panicked or was cancelled
    #[error("recalculation task failed: {0}")]
    TaskJoin(String),
    /// The shared connection mutex was poisoned by a panicking writer
    #[error("history connection lock poisoned")]
    LockPoisoned,
    /// An observer topic this service does not handle
    #[error("unknown observer topic: {0}")]
    UnknownTopic(String),
    /// The service was shut down
    #[error("recalculator has been shut down")]
    ShutDown,
}

impl From<tokio::task::JoinError> for PlacesError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Scheduler(SchedulerError::TaskJoin(err.to_string()))
    }
}

/// Convenience Result type for Places operations
pub type Result<T> = std::result::Result<T, PlacesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlacesError::InvalidUrl {
            url: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid URL not a url: relative URL without a base"
        );
    }

    #[test]
    fn test_scheduler_error_wraps() {
        let err: PlacesError = SchedulerError::LockPoisoned.into();
        assert!(matches!(
            err,
            PlacesError::Scheduler(SchedulerError::LockPoisoned)
        ));
        assert_eq!(
            err.to_string(),
            "Scheduler error: history connection lock poisoned"
        );
    }
}
