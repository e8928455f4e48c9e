//! Compromise recovery: full re-encryption of every row that trusts a
//! compromised KEK.
//!
//! Unlike rotation this path replaces the DEK itself — an attacker holding
//! the compromised KEK may already know any DEK it could unwrap, so new
//! wraps alone are not enough. Candidate rows come from a substring match
//! on the persisted wrap-map text; false positives just cost one extra
//! decrypt/re-encrypt, and the decrypt step is the authority. The first
//! row that fails to decrypt aborts the whole run: partial re-encryption
//! would leave an ambiguous trust state.

use crate::access::MaintenanceContext;
use crate::error::MaintenanceResult;
use crate::CancelFlag;
use daybook_crypto::EnvelopeCipher;
use daybook_store::EntryStore;
use serde::Serialize;
use tracing::{debug, info};

/// Rows fetched and committed per transaction. Smaller than the rotation
/// page because every row here pays a full decrypt and re-encrypt.
pub const RECOVERY_PAGE_SIZE: usize = 250;

/// Outcome of a completed (or cancelled) recovery run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReencryptionReport {
    /// Rows fully re-encrypted with a fresh DEK and ciphertext.
    pub rows_reencrypted: usize,
    /// Pages scanned before completion or cancellation.
    pub pages_scanned: usize,
}

pub(crate) async fn reencrypt_after_compromise(
    store: &EntryStore,
    cipher: &EnvelopeCipher,
    ctx: &MaintenanceContext,
    compromised_key_id: &str,
    cancel: &CancelFlag,
) -> MaintenanceResult<ReencryptionReport> {
    ctx.authorize()?;

    info!(key = compromised_key_id, "starting compromise recovery");

    let mut report = ReencryptionReport::default();
    let mut last_id = 0i64;

    loop {
        if cancel.is_cancelled() {
            info!(last_id, "recovery cancelled at page boundary");
            break;
        }

        let batch = store.scan_key_ref_after(compromised_key_id, last_id, RECOVERY_PAGE_SIZE)?;
        if batch.is_empty() {
            break;
        }
        report.pages_scanned += 1;

        let mut updates = Vec::with_capacity(batch.len());
        for row in &batch {
            last_id = last_id.max(row.id);

            let wrapped_keys = row.wrapped_keys.as_deref().unwrap_or_default();
            // Fail-loud: any decryption error propagates and stops the job.
            let plaintext =
                cipher.decrypt_parts(&row.cipher_text, &row.nonce, &row.tag, wrapped_keys)?;
            let record = cipher.encrypt(&plaintext)?;
            updates.push((row.id, record));
        }

        report.rows_reencrypted += store.replace_payloads(&updates)?;
        debug!(
            page = report.pages_scanned,
            rows = updates.len(),
            last_id,
            "recovery page committed"
        );
    }

    info!(?report, "compromise recovery finished");
    Ok(report)
}
