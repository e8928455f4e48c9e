//! Rotation engine tests: migrate rows to a new primary KEK end to end.

use daybook_crypto::{wrap_map, EnvelopeCipher, KeyRing, KEK_SIZE};
use daybook_maintenance::{
    AccessRole, CancelFlag, Environment, MaintenanceContext, MaintenanceError, MaintenanceService,
};
use daybook_store::EntryStore;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

const OLD: &str = "primary-2024";
const NEW: &str = "primary-2025";
const RECOVERY: &str = "recovery-a";

fn ring(ids: &[(&str, u8)], primary: &str, recovery: &str) -> Arc<KeyRing> {
    let keys: HashMap<String, Vec<u8>> = ids
        .iter()
        .map(|(id, fill)| (id.to_string(), vec![*fill; KEK_SIZE]))
        .collect();
    Arc::new(KeyRing::new(keys, primary, recovery).unwrap())
}

/// Cipher as deployed before rotation: OLD is primary.
fn old_cipher() -> EnvelopeCipher {
    EnvelopeCipher::new(ring(&[(OLD, 0x01), (RECOVERY, 0x02)], OLD, RECOVERY))
}

/// Cipher as deployed for the rotation run: ring holds OLD, NEW and
/// RECOVERY, with NEW designated primary.
fn rotated_cipher() -> EnvelopeCipher {
    EnvelopeCipher::new(ring(
        &[(OLD, 0x01), (NEW, 0x03), (RECOVERY, 0x02)],
        NEW,
        RECOVERY,
    ))
}

fn admin() -> MaintenanceContext {
    MaintenanceContext::new(Environment::Testing, AccessRole::Admin)
}

fn service_with_seeded_rows(n: usize) -> (MaintenanceService, Vec<i64>) {
    let store = EntryStore::open_in_memory().unwrap();
    let seeder = MaintenanceService::new(store.clone(), old_cipher());
    let ids = (0..n)
        .map(|i| seeder.append_entry(&format!("entry #{i}")).unwrap())
        .collect();
    (MaintenanceService::new(store, rotated_cipher()), ids)
}

#[tokio::test]
async fn migrates_every_row_to_the_new_primary() {
    let (service, ids) = service_with_seeded_rows(5);
    let before: Vec<_> = ids
        .iter()
        .map(|id| service.store().get_entry(*id).unwrap().unwrap())
        .collect();

    let result = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(result.updated_rows, 5);
    assert_eq!(result.added_new_primary, 5);
    assert_eq!(result.pruned_old_primary, 5);
    assert_eq!(result.added_recovery, 0); // seeded rows already carry it
    assert_eq!(result.skipped_invalid_json, 0);
    assert_eq!(result.skipped_unwrap_failed, 0);
    assert_eq!(result.already_up_to_date, 0);

    for (id, before) in ids.iter().zip(&before) {
        let row = service.store().get_entry(*id).unwrap().unwrap();
        let map = wrap_map::parse(row.wrapped_keys.as_deref().unwrap()).unwrap();
        assert!(map.contains_key(NEW));
        assert!(map.contains_key(RECOVERY));
        assert!(!map.contains_key(OLD));
        // Rotation never touches the payload.
        assert_eq!(row.cipher_text, before.cipher_text);
        assert_eq!(row.nonce, before.nonce);
        assert_eq!(row.tag, before.tag);
    }

    // Rows must decrypt on a deployment that dropped the old KEK entirely.
    let future = MaintenanceService::new(
        service.store().clone(),
        EnvelopeCipher::new(ring(&[(NEW, 0x03), (RECOVERY, 0x02)], NEW, RECOVERY)),
    );
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(future.read_entry(*id).unwrap().unwrap(), format!("entry #{i}"));
    }
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let (service, _) = service_with_seeded_rows(4);
    let cancel = CancelFlag::new();

    let first = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &cancel)
        .await
        .unwrap();
    assert_eq!(first.updated_rows, 4);

    let second = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &cancel)
        .await
        .unwrap();
    assert_eq!(second.updated_rows, 0);
    assert_eq!(second.already_up_to_date, 4);
    assert_eq!(second.added_new_primary, 0);
    assert_eq!(second.pruned_old_primary, 0);
}

#[tokio::test]
async fn ensures_a_recovery_wrap_before_pruning() {
    let store = EntryStore::open_in_memory().unwrap();
    // Seed a row wrapped under OLD only, as if written before the recovery
    // policy existed.
    let lone = EnvelopeCipher::new(ring(&[(OLD, 0x01)], OLD, OLD));
    let record = lone.encrypt("pre-policy row").unwrap();
    let id = store.insert_record(&record).unwrap();
    let map = wrap_map::parse(&record.wrapped_keys).unwrap();
    assert_eq!(map.len(), 1);

    let service = MaintenanceService::new(store, rotated_cipher());
    let result = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(result.updated_rows, 1);
    assert_eq!(result.added_recovery, 1);
    assert_eq!(result.added_new_primary, 1);
    assert_eq!(result.pruned_old_primary, 1);

    let row = service.store().get_entry(id).unwrap().unwrap();
    let map = wrap_map::parse(row.wrapped_keys.as_deref().unwrap()).unwrap();
    assert!(map.contains_key(NEW));
    assert!(map.contains_key(RECOVERY));
    assert!(!map.contains_key(OLD));
    assert_eq!(service.read_entry(id).unwrap().unwrap(), "pre-policy row");
}

#[tokio::test]
async fn skips_are_counted_without_aborting_the_batch() {
    let (service, good_ids) = service_with_seeded_rows(2);
    let store = service.store();

    let invalid_json = store
        .insert_entry("Y3Q=", "bg==", "dA==", Some("not json"), "gcm.v1")
        .unwrap();
    let empty_map = store
        .insert_entry("Y3Q=", "bg==", "dA==", Some("{}"), "gcm.v1")
        .unwrap();
    let unwrappable = store
        .insert_entry(
            "Y3Q=",
            "bg==",
            "dA==",
            Some(r#"{"vanished-key":"AAAA"}"#),
            "gcm.v1",
        )
        .unwrap();

    let result = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(result.updated_rows, 2);
    assert_eq!(result.skipped_invalid_json, 2);
    assert_eq!(result.skipped_unwrap_failed, 1);

    // Skipped rows keep their wrap maps verbatim.
    for (id, expected) in [
        (invalid_json, "not json"),
        (empty_map, "{}"),
        (unwrappable, r#"{"vanished-key":"AAAA"}"#),
    ] {
        let row = store.get_entry(id).unwrap().unwrap();
        assert_eq!(row.wrapped_keys.as_deref(), Some(expected));
    }
    // Good rows still migrated.
    for id in &good_ids {
        let row = store.get_entry(*id).unwrap().unwrap();
        assert!(row.wrapped_keys.unwrap().contains(NEW));
    }
}

#[tokio::test]
async fn unauthorized_callers_touch_no_rows() {
    let (service, ids) = service_with_seeded_rows(2);
    let before: Vec<_> = ids
        .iter()
        .map(|id| service.store().get_entry(*id).unwrap().unwrap())
        .collect();

    for ctx in [
        MaintenanceContext::new(Environment::Production, AccessRole::Admin),
        MaintenanceContext::new(Environment::Staging, AccessRole::Admin),
        MaintenanceContext::new(Environment::Testing, AccessRole::Member),
    ] {
        let err = service
            .rewrap_and_prune_primary(&ctx, OLD, NEW, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MaintenanceError::Unauthorized));
    }

    for (id, before) in ids.iter().zip(&before) {
        let row = service.store().get_entry(*id).unwrap().unwrap();
        assert_eq!(row.wrapped_keys, before.wrapped_keys);
        assert_eq!(row.updated_at, before.updated_at);
    }
}

#[tokio::test]
async fn cancellation_before_the_first_page_does_nothing() {
    let (service, ids) = service_with_seeded_rows(3);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &cancel)
        .await
        .unwrap();
    assert_eq!(result.updated_rows, 0);
    assert_eq!(result.pages_scanned, 0);

    // Still rotatable afterwards with a fresh flag.
    let resumed = service
        .rewrap_and_prune_primary(&admin(), OLD, NEW, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(resumed.updated_rows, ids.len());
}
