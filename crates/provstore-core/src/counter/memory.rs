//! Volatile counter backend.

use super::{CounterKey, CounterStore, check_regression};
use crate::ProvstoreError;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Counters held in process memory. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    values: Mutex<BTreeMap<CounterKey, u64>>,
}

impl MemoryCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounter {
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        Ok(self.values.lock().get(key).copied().unwrap_or(0))
    }

    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError> {
        let mut values = self.values.lock();
        let current = values.get(key).copied().unwrap_or(0);
        check_regression(key, current, value, force)?;
        values.insert(key.clone(), value);
        Ok(())
    }

    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        let mut values = self.values.lock();
        let slot = values.entry(key.clone()).or_insert(0);
        *slot = slot
            .checked_add(1)
            .ok_or_else(|| ProvstoreError::InvalidState(format!("counter {key} overflowed")))?;
        Ok(*slot)
    }

    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        let mut values = self.values.lock();
        let slot = values.entry(key.clone()).or_insert(0);
        *slot = (*slot).max(value);
        Ok(*slot)
    }
}
