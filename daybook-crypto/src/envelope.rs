//! Envelope cipher: per-record authenticated encryption for journal entries.
//!
//! Every encryption generates a fresh 32-byte data encryption key (DEK),
//! seals the plaintext under it with AES-256-GCM, then wraps the DEK under
//! the ring's primary and recovery KEKs. Each wrap is an independent GCM
//! operation with its own nonce, stored as nonce(12) ‖ tag(16) ‖ wrapped
//! DEK(32) and base64-encoded into the record's wrap map.
//!
//! Decryption tolerates primary-KEK unavailability: any map entry that a
//! ring KEK can authenticate is enough to recover the DEK. This is what
//! makes root-key rotation non-disruptive — old rows keep validating
//! against whichever KEK is still in the ring.

use crate::error::{CryptoError, CryptoResult};
use crate::keyring::KeyRing;
use crate::wrap_map::{self, WrapMap};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// DEK size in bytes (AES-256).
pub const DEK_SIZE: usize = 32;
/// GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;
/// Raw wrap blob size: wrap-nonce ‖ wrap-tag ‖ wrapped DEK.
pub const WRAP_BLOB_SIZE: usize = NONCE_SIZE + TAG_SIZE + DEK_SIZE;

/// Cipher suite tag persisted with every record, for forward compatibility.
pub const ALG_VERSION: &str = "gcm.v1";

/// A per-record data encryption key. Zeroed on drop, never persisted in
/// plaintext form, never reused across records.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Dek([u8; DEK_SIZE]);

impl Dek {
    /// Generates a fresh random DEK.
    fn generate() -> Self {
        let mut bytes = [0u8; DEK_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DEK_SIZE] {
        &self.0
    }
}

/// The persisted quadruple plus algorithm version.
///
/// `cipher_text`, `nonce` and `tag` are standard base64; `wrapped_keys` is a
/// JSON object mapping key id → base64 wrap blob. Ciphertext length equals
/// plaintext length; the tag is stored separately.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub cipher_text: String,
    pub nonce: String,
    pub tag: String,
    pub wrapped_keys: String,
    pub alg_version: String,
}

/// Stateless envelope cipher over a shared, read-only key ring.
#[derive(Clone)]
pub struct EnvelopeCipher {
    ring: Arc<KeyRing>,
}

impl EnvelopeCipher {
    pub fn new(ring: Arc<KeyRing>) -> Self {
        Self { ring }
    }

    /// The key ring this cipher wraps and unwraps against.
    pub fn ring(&self) -> &KeyRing {
        &self.ring
    }

    /// Encrypts a plaintext entry under a fresh DEK, wrapping the DEK under
    /// the current primary and recovery KEKs (exactly two wrap map entries).
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedRecord> {
        let dek = Dek::generate();

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(dek.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("cipher init: {e}")))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("payload seal: {e}")))?;

        // aes-gcm appends the tag to the ciphertext; the record stores them
        // separately.
        let (cipher_text, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut map = WrapMap::new();
        map.insert(
            self.ring.primary_key_id().to_string(),
            self.wrap_dek_with_id(self.ring.primary_key_id(), &dek)?,
        );
        map.insert(
            self.ring.recovery_key_id().to_string(),
            self.wrap_dek_with_id(self.ring.recovery_key_id(), &dek)?,
        );

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(EncryptedRecord {
            cipher_text: b64.encode(cipher_text),
            nonce: b64.encode(nonce_bytes),
            tag: b64.encode(tag),
            wrapped_keys: wrap_map::serialize(&map)?,
            alg_version: ALG_VERSION.to_string(),
        })
    }

    /// Decrypts a persisted record back to its plaintext.
    pub fn decrypt(&self, record: &EncryptedRecord) -> CryptoResult<String> {
        self.decrypt_parts(
            &record.cipher_text,
            &record.nonce,
            &record.tag,
            &record.wrapped_keys,
        )
    }

    /// Decrypts from the four persisted fields.
    ///
    /// The ring's primary key id is tried first (the common case); if it is
    /// absent from the map or its KEK is missing from the ring, every entry
    /// in the map is tried in iteration order until one authenticates.
    pub fn decrypt_parts(
        &self,
        cipher_text: &str,
        nonce: &str,
        tag: &str,
        wrapped_keys_json: &str,
    ) -> CryptoResult<String> {
        let map = wrap_map::parse(wrapped_keys_json)?;
        if map.is_empty() {
            return Err(CryptoError::Decryption("empty wrap map".into()));
        }

        let dek = self
            .try_unwrap_dek(&map, self.ring.primary_key_id())
            .or_else(|| self.try_unwrap_any(&map))
            .ok_or_else(|| {
                CryptoError::Decryption("no available KEK to unwrap DEK".into())
            })?;

        let b64 = base64::engine::general_purpose::STANDARD;
        let cipher_text = b64
            .decode(cipher_text)
            .map_err(|e| CryptoError::Decryption(format!("ciphertext base64: {e}")))?;
        let nonce = b64
            .decode(nonce)
            .map_err(|e| CryptoError::Decryption(format!("nonce base64: {e}")))?;
        let tag = b64
            .decode(tag)
            .map_err(|e| CryptoError::Decryption(format!("tag base64: {e}")))?;
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::Decryption(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }

        let mut sealed = Vec::with_capacity(cipher_text.len() + TAG_SIZE);
        sealed.extend_from_slice(&cipher_text);
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new_from_slice(dek.as_bytes())
            .map_err(|e| CryptoError::Decryption(format!("cipher init: {e}")))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| {
                CryptoError::Decryption(
                    "payload authentication failed (wrong key or tampered data)".into(),
                )
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("payload is not valid UTF-8".into()))
    }

    /// Wraps an existing DEK under an arbitrary ring key id.
    ///
    /// Used by the rotation engine to add new wraps without touching the
    /// record's ciphertext.
    pub fn wrap_dek_with_id(&self, key_id: &str, dek: &Dek) -> CryptoResult<String> {
        let kek = self
            .ring
            .resolve(key_id)
            .ok_or_else(|| CryptoError::UnknownKeyId(key_id.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(kek)
            .map_err(|e| CryptoError::Encryption(format!("cipher init: {e}")))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), dek.as_bytes().as_slice())
            .map_err(|e| CryptoError::Encryption(format!("DEK wrap: {e}")))?;
        let (wrapped, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        let mut blob = Vec::with_capacity(WRAP_BLOB_SIZE);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(wrapped);

        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    /// Attempts to unwrap the DEK using one specific key id.
    ///
    /// Returns `None` if the id is absent from the map or the ring, the blob
    /// is malformed (wrong length, bad base64), or authentication fails.
    /// Corrupt blobs are unwrap failures, never a crash.
    pub fn try_unwrap_dek(&self, map: &WrapMap, key_id: &str) -> Option<Dek> {
        let blob_b64 = map.get(key_id)?;
        let kek = self.ring.resolve(key_id)?;

        let blob = base64::engine::general_purpose::STANDARD
            .decode(blob_b64)
            .ok()?;
        if blob.len() != WRAP_BLOB_SIZE {
            return None;
        }
        let (nonce, rest) = blob.split_at(NONCE_SIZE);
        let (tag, wrapped) = rest.split_at(TAG_SIZE);

        let mut sealed = Vec::with_capacity(DEK_SIZE + TAG_SIZE);
        sealed.extend_from_slice(wrapped);
        sealed.extend_from_slice(tag);

        let cipher = Aes256Gcm::new_from_slice(kek).ok()?;
        let mut dek_bytes = cipher
            .decrypt(Nonce::from_slice(nonce), sealed.as_slice())
            .ok()?;
        if dek_bytes.len() != DEK_SIZE {
            dek_bytes.zeroize();
            return None;
        }

        let mut dek = [0u8; DEK_SIZE];
        dek.copy_from_slice(&dek_bytes);
        dek_bytes.zeroize();
        Some(Dek(dek))
    }

    /// Attempts every key id in the map until one unwraps.
    ///
    /// Used by maintenance jobs that must not abort a whole batch over one
    /// bad row.
    pub fn try_unwrap_any(&self, map: &WrapMap) -> Option<Dek> {
        map.keys().find_map(|key_id| self.try_unwrap_dek(map, key_id))
    }
}
