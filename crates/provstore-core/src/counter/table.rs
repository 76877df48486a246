//! # Table Counter Backend
//!
//! One row per counter key in an embedded redb table. Each increment is a
//! single write transaction; redb serialises writers, so two increments on
//! the same key can never read the same value.

use super::{CounterKey, CounterStore, check_regression};
use crate::ProvstoreError;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for counters: storage key -> current value
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Counters stored in a redb database file.
pub struct TableCounter {
    db: Database,
}

impl std::fmt::Debug for TableCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCounter").finish_non_exhaustive()
    }
}

impl TableCounter {
    /// Open or create the counter database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProvstoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(|e| ProvstoreError::IoError(e.to_string()))?;

        // Make sure the table exists so readers never hit a missing table.
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(COUNTERS)
                .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Number of counter rows, for diagnostics.
    pub fn len(&self) -> Result<usize, ProvstoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(COUNTERS)
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, ProvstoreError> {
        Ok(self.len()? == 0)
    }

    /// Read-modify-write of one row inside a single write transaction.
    fn update<T>(
        &self,
        key: &CounterKey,
        op: impl FnOnce(u64) -> Result<(u64, T), ProvstoreError>,
    ) -> Result<T, ProvstoreError> {
        let storage_key = key.storage_key();
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        let out = {
            let mut table = write_txn
                .open_table(COUNTERS)
                .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
            let current = table
                .get(storage_key.as_str())
                .map_err(|e| ProvstoreError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0);
            let (next, out) = op(current)?;
            if next != current {
                table
                    .insert(storage_key.as_str(), next)
                    .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
            }
            out
        };
        write_txn
            .commit()
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        Ok(out)
    }
}

impl CounterStore for TableCounter {
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(COUNTERS)
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?;
        Ok(table
            .get(key.storage_key().as_str())
            .map_err(|e| ProvstoreError::IoError(e.to_string()))?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError> {
        self.update(key, |current| {
            check_regression(key, current, value, force)?;
            Ok((value, ()))
        })
    }

    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        self.update(key, |current| {
            let next = current.checked_add(1).ok_or_else(|| {
                ProvstoreError::InvalidState(format!("counter {key} overflowed"))
            })?;
            Ok((next, next))
        })
    }

    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        self.update(key, |current| {
            let next = current.max(value);
            Ok((next, next))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityType;
    use tempfile::tempdir;

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("counters.redb");
        let key = CounterKey::entity(EntityType::PointerList, Some("0620"));

        {
            let counter = TableCounter::open(&path).expect("open");
            counter.increment(&key).expect("increment");
            counter.increment(&key).expect("increment");
        }

        let counter = TableCounter::open(&path).expect("reopen");
        assert_eq!(counter.read(&key).expect("read"), 2);
        assert_eq!(counter.len().expect("len"), 1);
    }

    #[test]
    fn regression_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let counter = TableCounter::open(dir.path().join("c.redb")).expect("open");
        let key = CounterKey::snapshot(EntityType::Citation, None, 9);
        counter.set(&key, 4, false).expect("set");
        assert!(counter.set(&key, 3, false).is_err());
        assert_eq!(counter.ratchet(&key, 2).expect("ratchet"), 4);
    }
}
