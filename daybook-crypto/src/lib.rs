//! Envelope encryption layer for Daybook.
//!
//! Protects journal entry text at rest using:
//! - AES-256-GCM for authenticated encryption
//! - A fresh random data encryption key (DEK) per record
//! - Multi-key DEK wrapping for non-disruptive root-key rotation
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **KEKs (key-encryption keys)**: long-lived 32-byte keys provisioned
//!    through configuration and held in an immutable [`KeyRing`] for the
//!    process lifetime. One is designated primary (used for new wraps), one
//!    recovery (an always-present fallback wrap).
//!
//! 2. **DEKs (data-encryption keys)**: ephemeral per-record keys. Each
//!    record's DEK is wrapped under one or more KEKs and stored in the
//!    record's wrap map; the DEK itself is never persisted in plaintext.
//!
//! This architecture allows rotating the root key without re-encrypting
//! bulk data: the rotation engine only rewraps DEKs, and any surviving wrap
//! a ring KEK can authenticate is enough to decrypt a record.

pub mod config;
pub mod envelope;
mod error;
pub mod keyring;
pub mod wrap_map;

pub use config::EncryptionConfig;
pub use envelope::{
    Dek, EncryptedRecord, EnvelopeCipher, ALG_VERSION, DEK_SIZE, NONCE_SIZE, TAG_SIZE,
    WRAP_BLOB_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use keyring::{KeyRing, KEK_SIZE};
pub use wrap_map::WrapMap;
