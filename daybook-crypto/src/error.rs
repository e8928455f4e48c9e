//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the envelope encryption layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key ring construction found a missing or malformed key, or a missing
    /// primary/recovery designation. Fatal at startup, never recoverable at
    /// runtime.
    #[error("invalid encryption configuration: {0}")]
    Configuration(String),

    /// A wrap operation referenced a key id that is not in the ring.
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    /// Cryptographic library failure on the seal path. Unexpected.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrap map malformed, no KEK could unwrap the DEK, or GCM
    /// authentication failed on the payload. Indicates corruption or
    /// tampering; always surfaced to the caller.
    #[error("decryption failed: {0}")]
    Decryption(String),
}
