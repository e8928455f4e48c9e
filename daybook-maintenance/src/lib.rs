//! Maintenance layer for encrypted Daybook journals.
//!
//! Owns the two batch engines that keep key trust healthy over time:
//!
//! * **rotation** (`rewrap_and_prune_primary`) — migrates every row from an
//!   old primary KEK to a new one by rewrapping DEKs, never touching
//!   ciphertext. Idempotent and resumable via a monotonic id cursor.
//! * **recovery** (`reencrypt_after_compromise`) — fully decrypts and
//!   re-encrypts every row that references a compromised KEK, producing
//!   fresh DEKs and ciphertext. Fails loudly on the first undecryptable
//!   row.
//!
//! Both engines are gated to admin callers in development or testing
//! environments, check cancellation only at page boundaries, and commit
//! one store transaction per page so cancellation or crash leaves whole
//! pages durable and a re-run resumes correctly.

mod access;
mod entries;
mod error;
mod recovery;
mod rotation;

pub use access::{AccessRole, Environment, MaintenanceContext};
pub use error::{MaintenanceError, MaintenanceResult};
pub use recovery::{ReencryptionReport, RECOVERY_PAGE_SIZE};
pub use rotation::{RotationResult, ROTATION_PAGE_SIZE};

use daybook_crypto::EnvelopeCipher;
use daybook_store::EntryStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal for the batch engines.
///
/// Checked at page boundaries only; the current page either fully commits
/// or is never started. Clone handles share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Facade over the entry store and envelope cipher.
///
/// Cheap to clone; the store and key ring are shared behind `Arc`s.
#[derive(Clone)]
pub struct MaintenanceService {
    store: EntryStore,
    cipher: EnvelopeCipher,
}

impl MaintenanceService {
    pub fn new(store: EntryStore, cipher: EnvelopeCipher) -> Self {
        Self { store, cipher }
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    /// Encrypts and persists a new journal entry, returning its id.
    pub fn append_entry(&self, plaintext: &str) -> MaintenanceResult<i64> {
        entries::append_entry(&self.store, &self.cipher, plaintext)
    }

    /// Fetches and decrypts an entry. `None` if the id does not exist.
    pub fn read_entry(&self, id: i64) -> MaintenanceResult<Option<String>> {
        entries::read_entry(&self.store, &self.cipher, id)
    }

    /// Rewraps every row's DEK from `old_primary_id` to `new_primary_id`,
    /// ensuring a current recovery wrap along the way and pruning the old
    /// primary entry. See the crate docs for the durability contract.
    pub async fn rewrap_and_prune_primary(
        &self,
        ctx: &MaintenanceContext,
        old_primary_id: &str,
        new_primary_id: &str,
        cancel: &CancelFlag,
    ) -> MaintenanceResult<RotationResult> {
        rotation::rewrap_and_prune_primary(
            &self.store,
            &self.cipher,
            ctx,
            old_primary_id,
            new_primary_id,
            cancel,
        )
        .await
    }

    /// Re-encrypts every row whose wrap map references the compromised key
    /// id, replacing DEK, ciphertext, nonce, tag and wrap map wholesale.
    pub async fn reencrypt_after_compromise(
        &self,
        ctx: &MaintenanceContext,
        compromised_key_id: &str,
        cancel: &CancelFlag,
    ) -> MaintenanceResult<ReencryptionReport> {
        recovery::reencrypt_after_compromise(
            &self.store,
            &self.cipher,
            ctx,
            compromised_key_id,
            cancel,
        )
        .await
    }
}
