use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row holds a value the domain model does not recognize.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] DomainError),

    /// The stall timeout cannot be represented as a point in time.
    #[error("Invalid stall timeout: {0:?}")]
    InvalidTimeout(std::time::Duration),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
