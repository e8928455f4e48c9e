//! Maintenance error types.

use thiserror::Error;

/// Result type for maintenance operations.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Errors that can occur in the batch maintenance engines.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// The caller failed the environment/role gate. Raised before any row
    /// access.
    #[error("maintenance operations require admin access in a development or testing environment")]
    Unauthorized,

    #[error("crypto error: {0}")]
    Crypto(#[from] daybook_crypto::CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] daybook_store::StorageError),
}
