//! Key ring: the set of key-encryption keys (KEKs) known to this process.
//!
//! Constructed once at startup from configuration and shared read-only for
//! the process lifetime. Membership never changes at runtime — new KEKs are
//! provisioned externally and picked up on the next deployment, at which
//! point the primary/recovery designations may move to them.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a KEK in bytes (AES-256).
pub const KEK_SIZE: usize = 32;

/// A single 32-byte key-encryption key. Zeroed on drop.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
struct Kek([u8; KEK_SIZE]);

/// Immutable set of KEKs, keyed by externally provisioned key ids, with
/// designated primary (used for new wraps) and recovery (always-present
/// fallback wrap) ids.
#[derive(Debug)]
pub struct KeyRing {
    keys: HashMap<String, Kek>,
    primary_key_id: String,
    recovery_key_id: String,
}

impl KeyRing {
    /// Builds a ring from raw 32-byte keys.
    ///
    /// Fails fast with [`CryptoError::Configuration`] if the primary or
    /// recovery id is absent from the key set or any key has the wrong length.
    pub fn new(
        keys: HashMap<String, Vec<u8>>,
        primary_key_id: impl Into<String>,
        recovery_key_id: impl Into<String>,
    ) -> CryptoResult<Self> {
        let primary_key_id = primary_key_id.into();
        let recovery_key_id = recovery_key_id.into();

        let mut ring = HashMap::with_capacity(keys.len());
        for (key_id, mut bytes) in keys {
            if bytes.len() != KEK_SIZE {
                bytes.zeroize();
                return Err(CryptoError::Configuration(format!(
                    "key '{key_id}' must be {KEK_SIZE} bytes, got {}",
                    bytes.len()
                )));
            }
            let mut kek = [0u8; KEK_SIZE];
            kek.copy_from_slice(&bytes);
            bytes.zeroize();
            ring.insert(key_id, Kek(kek));
        }

        if !ring.contains_key(&primary_key_id) {
            return Err(CryptoError::Configuration(format!(
                "primary key id '{primary_key_id}' not present in key set"
            )));
        }
        if !ring.contains_key(&recovery_key_id) {
            return Err(CryptoError::Configuration(format!(
                "recovery key id '{recovery_key_id}' not present in key set"
            )));
        }

        Ok(Self {
            keys: ring,
            primary_key_id,
            recovery_key_id,
        })
    }

    /// Builds a ring from base64-encoded keys, as loaded from configuration.
    pub fn from_base64_keys(
        keys: &HashMap<String, String>,
        primary_key_id: impl Into<String>,
        recovery_key_id: impl Into<String>,
    ) -> CryptoResult<Self> {
        let mut decoded = HashMap::with_capacity(keys.len());
        for (key_id, encoded) in keys {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| {
                    CryptoError::Configuration(format!(
                        "key '{key_id}' is not valid base64: {e}"
                    ))
                })?;
            decoded.insert(key_id.clone(), bytes);
        }
        Self::new(decoded, primary_key_id, recovery_key_id)
    }

    /// Resolves a key id to its raw KEK bytes.
    pub fn resolve(&self, key_id: &str) -> Option<&[u8; KEK_SIZE]> {
        self.keys.get(key_id).map(|k| &k.0)
    }

    /// Returns true if the ring holds a KEK for this id.
    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// The key id used for new wraps by default.
    pub fn primary_key_id(&self) -> &str {
        &self.primary_key_id
    }

    /// The fallback key id every record stays wrapped under.
    pub fn recovery_key_id(&self) -> &str {
        &self.recovery_key_id
    }

    /// Number of KEKs in the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the ring is empty (never the case after construction).
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_keys(ids: &[&str]) -> HashMap<String, Vec<u8>> {
        ids.iter()
            .map(|id| (id.to_string(), vec![0x42u8; KEK_SIZE]))
            .collect()
    }

    #[test]
    fn constructs_with_valid_primary_and_recovery() {
        let ring = KeyRing::new(raw_keys(&["k1", "k2"]), "k1", "k2").unwrap();
        assert_eq!(ring.primary_key_id(), "k1");
        assert_eq!(ring.recovery_key_id(), "k2");
        assert!(ring.resolve("k1").is_some());
        assert!(ring.resolve("k3").is_none());
    }

    #[test]
    fn missing_primary_fails_fast() {
        let err = KeyRing::new(raw_keys(&["k2"]), "k1", "k2").unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }

    #[test]
    fn missing_recovery_fails_fast() {
        let err = KeyRing::new(raw_keys(&["k1"]), "k1", "k2").unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }

    #[test]
    fn wrong_key_length_rejected() {
        let mut keys = raw_keys(&["k1", "k2"]);
        keys.insert("k1".into(), vec![0u8; 16]);
        let err = KeyRing::new(keys, "k1", "k2").unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }

    #[test]
    fn invalid_base64_rejected() {
        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), "not-base64!!!".to_string());
        let err = KeyRing::from_base64_keys(&keys, "k1", "k1").unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }
}
