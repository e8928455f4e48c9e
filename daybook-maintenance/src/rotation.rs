//! Root key rotation: rewrap DEKs under a new primary KEK and prune the old
//! one, without ever touching record ciphertext.
//!
//! The engine walks the store in ascending-id pages. Each row's wrap map is
//! parsed, the DEK unwrapped with whatever ring key still authenticates,
//! then the map is rebuilt: the current recovery wrap is ensured first, the
//! new primary wrap added, and only then is the old primary entry removed.
//! A crash between pages therefore never leaves a row wrapped under fewer
//! than two live keys, and a re-run finds already-migrated rows in the
//! `already_up_to_date` branch, making the whole operation idempotent.

use crate::access::MaintenanceContext;
use crate::error::MaintenanceResult;
use crate::CancelFlag;
use daybook_crypto::{wrap_map, EnvelopeCipher};
use daybook_store::EntryStore;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Rows fetched and committed per transaction.
pub const ROTATION_PAGE_SIZE: usize = 500;

/// Per-invocation outcome counters for a rotation run.
///
/// Skips are expected outcomes of a best-effort batch job, never errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RotationResult {
    /// Rows whose wrap map was rewritten.
    pub updated_rows: usize,
    /// Wraps added under the new primary key id.
    pub added_new_primary: usize,
    /// Wraps added under the current recovery key id.
    pub added_recovery: usize,
    /// Old-primary entries removed.
    pub pruned_old_primary: usize,
    /// Rows skipped because no ring key could unwrap the DEK.
    pub skipped_unwrap_failed: usize,
    /// Rows skipped because the wrap map was malformed or empty.
    pub skipped_invalid_json: usize,
    /// Rows already migrated (no old wrap, new wrap present).
    pub already_up_to_date: usize,
    /// Pages scanned before completion or cancellation.
    pub pages_scanned: usize,
}

pub(crate) async fn rewrap_and_prune_primary(
    store: &EntryStore,
    cipher: &EnvelopeCipher,
    ctx: &MaintenanceContext,
    old_primary_id: &str,
    new_primary_id: &str,
    cancel: &CancelFlag,
) -> MaintenanceResult<RotationResult> {
    ctx.authorize()?;

    let recovery_id = cipher.ring().recovery_key_id().to_string();
    info!(
        old = old_primary_id,
        new = new_primary_id,
        recovery = %recovery_id,
        "starting primary key rotation"
    );

    let mut result = RotationResult::default();
    let mut last_id = 0i64;

    loop {
        if cancel.is_cancelled() {
            info!(last_id, "rotation cancelled at page boundary");
            break;
        }

        let batch = store.scan_wrapped_after(last_id, ROTATION_PAGE_SIZE)?;
        if batch.is_empty() {
            break;
        }
        result.pages_scanned += 1;

        let mut updates: Vec<(i64, String)> = Vec::with_capacity(batch.len());
        for row in &batch {
            last_id = row.id;

            let raw = row.wrapped_keys.as_deref().unwrap_or_default();
            let mut map = match wrap_map::parse(raw) {
                Ok(map) if !map.is_empty() => map,
                _ => {
                    warn!(id = row.id, "skipping row with invalid wrap map");
                    result.skipped_invalid_json += 1;
                    continue;
                }
            };

            let had_old = map.contains_key(old_primary_id);
            let had_new = map.contains_key(new_primary_id);
            let had_recovery = map.contains_key(&recovery_id);

            if !had_old && had_new {
                result.already_up_to_date += 1;
                continue;
            }

            let dek = match cipher.try_unwrap_any(&map) {
                Some(dek) => dek,
                None => {
                    warn!(id = row.id, "skipping row: no ring key unwraps its DEK");
                    result.skipped_unwrap_failed += 1;
                    continue;
                }
            };

            // Recovery wrap first so an interrupted run never drops a row
            // below two live wraps.
            if !had_recovery {
                map.insert(recovery_id.clone(), cipher.wrap_dek_with_id(&recovery_id, &dek)?);
                result.added_recovery += 1;
            }
            if !had_new {
                map.insert(
                    new_primary_id.to_string(),
                    cipher.wrap_dek_with_id(new_primary_id, &dek)?,
                );
                result.added_new_primary += 1;
            }
            if had_old {
                map.remove(old_primary_id);
                result.pruned_old_primary += 1;
            }

            updates.push((row.id, wrap_map::serialize(&map)?));
            result.updated_rows += 1;
        }

        store.update_wrap_maps(&updates)?;
        debug!(
            page = result.pages_scanned,
            rows = batch.len(),
            updated = updates.len(),
            last_id,
            "rotation page committed"
        );
    }

    info!(?result, "primary key rotation finished");
    Ok(result)
}
