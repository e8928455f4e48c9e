//! Ordinary write and read paths: encrypt-then-insert and fetch-then-decrypt.
//!
//! These are ungated; the access gate applies only to the batch engines.

use crate::error::MaintenanceResult;
use daybook_crypto::EnvelopeCipher;
use daybook_store::EntryStore;
use tracing::debug;

pub(crate) fn append_entry(
    store: &EntryStore,
    cipher: &EnvelopeCipher,
    plaintext: &str,
) -> MaintenanceResult<i64> {
    let record = cipher.encrypt(plaintext)?;
    let id = store.insert_record(&record)?;
    debug!(id, "appended encrypted entry");
    Ok(id)
}

pub(crate) fn read_entry(
    store: &EntryStore,
    cipher: &EnvelopeCipher,
    id: i64,
) -> MaintenanceResult<Option<String>> {
    let Some(row) = store.get_entry(id)? else {
        return Ok(None);
    };
    let wrapped_keys = row.wrapped_keys.as_deref().unwrap_or_default();
    let plaintext = cipher.decrypt_parts(&row.cipher_text, &row.nonce, &row.tag, wrapped_keys)?;
    Ok(Some(plaintext))
}
