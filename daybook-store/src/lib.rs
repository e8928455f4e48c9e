//! DuckDB storage layer for encrypted Daybook journal entries.
//!
//! Rows are opaque to this crate: all fields arrive already encrypted and
//! encoded. The store's job is ordered, cursor-paged scans and atomic
//! per-page writes for the maintenance engines, plus simple insert/get for
//! the write and read paths.

mod entry_store;
mod error;

pub use entry_store::{EntryRow, EntryStore};
pub use error::{StorageError, StorageResult};
