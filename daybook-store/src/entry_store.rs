//! Journal entry row store.
//!
//! Entries are opaque encrypted rows: ciphertext, nonce, tag, wrap-map JSON
//! and an algorithm version, keyed by a strictly increasing integer id. The
//! store knows nothing about plaintext or keys — encryption happens above
//! it, and the maintenance engines drive it through cursor-paged scans and
//! one-transaction-per-page writes.

use crate::error::{StorageError, StorageResult};
use daybook_crypto::EncryptedRecord;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One persisted journal entry row.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryRow {
    pub id: i64,
    pub cipher_text: String,
    pub nonce: String,
    pub tag: String,
    /// Wrap-map JSON. Nullable: legacy rows imported before encryption was
    /// enabled carry no wrap map and are skipped by the batch engines.
    pub wrapped_keys: Option<String>,
    pub alg_version: String,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// DuckDB-backed entry store.
#[derive(Clone)]
pub struct EntryStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntryStore {
    /// Opens or creates an entry store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory entry store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts an encrypted record as a new entry, returning its id.
    pub fn insert_record(&self, record: &EncryptedRecord) -> StorageResult<i64> {
        self.insert_entry(
            &record.cipher_text,
            &record.nonce,
            &record.tag,
            Some(&record.wrapped_keys),
            &record.alg_version,
        )
    }

    /// Inserts an entry from raw field values.
    ///
    /// `wrapped_keys` is stored verbatim — callers (and tests seeding
    /// malformed maps) are responsible for its content.
    pub fn insert_entry(
        &self,
        cipher_text: &str,
        nonce: &str,
        tag: &str,
        wrapped_keys: Option<&str>,
        alg_version: &str,
    ) -> StorageResult<i64> {
        let now = now_ms();
        let conn = self.conn.lock().unwrap();
        let id: i64 = conn.query_row(
            "INSERT INTO journal_entries
                 (cipher_text, nonce, tag, wrapped_keys, alg_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![cipher_text, nonce, tag, wrapped_keys, alg_version, now, now],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Gets a single entry by id.
    pub fn get_entry(&self, id: i64) -> StorageResult<Option<EntryRow>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?"),
            params![id],
            row_to_entry,
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches the next page of rotation candidates: non-deleted rows with a
    /// wrap map and id strictly greater than the cursor, in ascending id
    /// order.
    pub fn scan_wrapped_after(&self, after_id: i64, limit: usize) -> StorageResult<Vec<EntryRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries
             WHERE wrapped_keys IS NOT NULL AND id > ? AND is_deleted = FALSE
             ORDER BY id ASC
             LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fetches the next page of rows whose wrap-map text mentions the given
    /// key id.
    ///
    /// The `LIKE '%"<key_id>"%'` match is a cheap pre-filter; the authority
    /// is whatever the caller does with the row afterwards. Soft-deleted
    /// rows are included deliberately — they still hold ciphertext trusting
    /// the key.
    pub fn scan_key_ref_after(
        &self,
        key_id: &str,
        after_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<EntryRow>> {
        let pattern = format!("%\"{key_id}\"%");
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries
             WHERE wrapped_keys IS NOT NULL AND id > ? AND wrapped_keys LIKE ?
             ORDER BY id ASC
             LIMIT ?"
        ))?;
        let rows = stmt
            .query_map(params![after_id, pattern, limit as i64], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Writes a page of wrap-map updates in a single transaction.
    ///
    /// Only `wrapped_keys` and `updated_at` change; ciphertext, nonce and
    /// tag are untouched.
    pub fn update_wrap_maps(&self, updates: &[(i64, String)]) -> StorageResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let now = now_ms();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE journal_entries SET wrapped_keys = ?, updated_at = ? WHERE id = ?",
            )?;
            for (id, wrapped_keys) in updates {
                stmt.execute(params![wrapped_keys, now, id])?;
            }
        }
        tx.commit()?;
        debug!("committed {} wrap map updates", updates.len());
        Ok(updates.len())
    }

    /// Replaces the full encrypted payload of a page of rows in a single
    /// transaction. Used by compromise recovery, where every field including
    /// ciphertext is renewed.
    pub fn replace_payloads(&self, updates: &[(i64, EncryptedRecord)]) -> StorageResult<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let now = now_ms();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE journal_entries
                 SET cipher_text = ?, nonce = ?, tag = ?, wrapped_keys = ?,
                     alg_version = ?, updated_at = ?
                 WHERE id = ?",
            )?;
            for (id, record) in updates {
                stmt.execute(params![
                    record.cipher_text,
                    record.nonce,
                    record.tag,
                    record.wrapped_keys,
                    record.alg_version,
                    now,
                    id
                ])?;
            }
        }
        tx.commit()?;
        debug!("committed {} payload replacements", updates.len());
        Ok(updates.len())
    }

    /// Soft-deletes an entry.
    pub fn mark_deleted(&self, id: i64) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE journal_entries SET is_deleted = TRUE, updated_at = ? WHERE id = ?",
            params![now_ms(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Counts entries, optionally including soft-deleted ones.
    pub fn count_entries(&self, include_deleted: bool) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_deleted {
            "SELECT COUNT(*) FROM journal_entries"
        } else {
            "SELECT COUNT(*) FROM journal_entries WHERE is_deleted = FALSE"
        };
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

const ENTRY_COLUMNS: &str =
    "id, cipher_text, nonce, tag, wrapped_keys, alg_version, is_deleted, created_at, updated_at";

fn row_to_entry(row: &duckdb::Row<'_>) -> Result<EntryRow, duckdb::Error> {
    Ok(EntryRow {
        id: row.get(0)?,
        cipher_text: row.get(1)?,
        nonce: row.get(2)?,
        tag: row.get(3)?,
        wrapped_keys: row.get(4)?,
        alg_version: row.get(5)?,
        is_deleted: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE SEQUENCE IF NOT EXISTS journal_entries_id_seq;

        CREATE TABLE IF NOT EXISTS journal_entries (
            id BIGINT PRIMARY KEY DEFAULT nextval('journal_entries_id_seq'),
            cipher_text TEXT NOT NULL,
            nonce VARCHAR NOT NULL,
            tag VARCHAR NOT NULL,
            wrapped_keys TEXT,
            alg_version VARCHAR NOT NULL,
            is_deleted BOOLEAN DEFAULT FALSE,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_journal_entries_deleted ON journal_entries(is_deleted);
        "#,
    )?;
    Ok(())
}
