//! Encryption configuration.
//!
//! Loaded once at process start from the deployment's configuration source
//! and turned into a [`KeyRing`]. KEKs are provisioned externally; rotating
//! which id is primary or recovery is a configuration change picked up on
//! the next deployment.

use crate::error::CryptoResult;
use crate::keyring::KeyRing;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for the envelope encryption subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Key id used to wrap DEKs on new writes.
    pub active_primary_key_id: String,

    /// Key id every record stays wrapped under as a fallback.
    pub active_recovery_key_id: String,

    /// Key id → base64-encoded 32-byte KEK.
    pub keys: HashMap<String, String>,
}

impl EncryptionConfig {
    /// Builds the process-lifetime key ring, failing fast on a missing
    /// primary/recovery id or malformed key material.
    pub fn build_key_ring(&self) -> CryptoResult<KeyRing> {
        KeyRing::from_base64_keys(
            &self.keys,
            &self.active_primary_key_id,
            &self.active_recovery_key_id,
        )
    }
}
