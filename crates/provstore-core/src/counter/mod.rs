//! # Counter Allocation
//!
//! Durable, namespaced, monotonic counters used to mint entity and snapshot
//! numbers. Four interchangeable backends sit behind [`CounterStore`]:
//!
//! - [`MemoryCounter`]: volatile, for tests and dry runs
//! - [`FileCounter`]: fixed-width text lines guarded by OS file locks
//! - [`TableCounter`]: one redb row per key
//! - [`RemoteCounter`]: an atomic key-value service (`AtomicKv`)
//!
//! Every backend guarantees that two concurrent increments on the same key
//! never observe the same pre-increment value.

mod file;
mod memory;
mod remote;
mod table;

pub use file::FileCounter;
pub use memory::MemoryCounter;
#[cfg(feature = "redis")]
pub use remote::RedisKv;
pub use remote::{AtomicKv, MemoryKv, RemoteCounter};
pub use table::TableCounter;

use crate::{EntityType, ProvstoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// KEYS
// =============================================================================

/// Which sequence of a type/prefix namespace a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CounterScope {
    /// The sequence minting new entity numbers.
    Entity,
    /// The private snapshot sequence of one subject entity.
    Snapshot { subject: u64 },
}

/// Namespace of one counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub entity_type: EntityType,
    pub prefix: Option<String>,
    pub scope: CounterScope,
}

impl CounterKey {
    /// Entity counter for `entity_type` under an optional supplier prefix.
    #[must_use]
    pub fn entity(entity_type: EntityType, prefix: Option<&str>) -> Self {
        Self {
            entity_type,
            prefix: normalize_prefix(prefix),
            scope: CounterScope::Entity,
        }
    }

    /// Snapshot counter of subject `subject` of type `entity_type`.
    #[must_use]
    pub fn snapshot(entity_type: EntityType, prefix: Option<&str>, subject: u64) -> Self {
        Self {
            entity_type,
            prefix: normalize_prefix(prefix),
            scope: CounterScope::Snapshot { subject },
        }
    }

    /// Flat string form, used as the row key by table and remote backends.
    #[must_use]
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.prefix.as_deref().unwrap_or("_");
        match self.scope {
            CounterScope::Entity => write!(f, "{}:{}:entity", prefix, self.entity_type),
            CounterScope::Snapshot { subject } => {
                write!(f, "{}:{}:se:{}", prefix, self.entity_type, subject)
            }
        }
    }
}

fn normalize_prefix(prefix: Option<&str>) -> Option<String> {
    prefix.filter(|p| !p.is_empty()).map(str::to_string)
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Contract shared by every counter backend.
///
/// All methods take `&self`; backends synchronise internally so a store can
/// be shared across threads behind an `Arc`.
pub trait CounterStore: Send + Sync {
    /// Current value, 0 if the key was never written.
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError>;

    /// Overwrite the value.
    ///
    /// Fails with `InvalidArgument` when `value` is lower than the stored
    /// value and `force` is false.
    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError>;

    /// Atomically add one and return the new value.
    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError>;

    /// Raise the counter to `value` if it is currently lower.
    ///
    /// Returns the value the counter holds afterwards.
    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        let current = self.read(key)?;
        if value <= current {
            return Ok(current);
        }
        match self.set(key, value, false) {
            Ok(()) => Ok(value),
            // Someone else moved past us in the meantime.
            Err(ProvstoreError::InvalidArgument(_)) => self.read(key),
            Err(e) => Err(e),
        }
    }
}

/// Shared check for the non-forced `set` path.
pub(crate) fn check_regression(
    key: &CounterKey,
    current: u64,
    value: u64,
    force: bool,
) -> Result<(), ProvstoreError> {
    if !force && value < current {
        return Err(ProvstoreError::InvalidArgument(format!(
            "counter {key} would move backwards from {current} to {value}"
        )));
    }
    Ok(())
}

// =============================================================================
// BACKEND DISPATCH
// =============================================================================

/// The counter backend selected by configuration.
#[derive(Debug)]
pub enum CounterBackend {
    Memory(MemoryCounter),
    File(FileCounter),
    Table(TableCounter),
    Remote(RemoteCounter),
}

impl Default for CounterBackend {
    fn default() -> Self {
        Self::Memory(MemoryCounter::new())
    }
}

impl CounterBackend {
    /// Human-readable backend name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::File(_) => "file",
            Self::Table(_) => "table",
            Self::Remote(_) => "remote",
        }
    }
}

impl CounterStore for CounterBackend {
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        match self {
            Self::Memory(c) => c.read(key),
            Self::File(c) => c.read(key),
            Self::Table(c) => c.read(key),
            Self::Remote(c) => c.read(key),
        }
    }

    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError> {
        match self {
            Self::Memory(c) => c.set(key, value, force),
            Self::File(c) => c.set(key, value, force),
            Self::Table(c) => c.set(key, value, force),
            Self::Remote(c) => c.set(key, value, force),
        }
    }

    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        match self {
            Self::Memory(c) => c.increment(key),
            Self::File(c) => c.increment(key),
            Self::Table(c) => c.increment(key),
            Self::Remote(c) => c.increment(key),
        }
    }

    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        match self {
            Self::Memory(c) => c.ratchet(key, value),
            Self::File(c) => c.ratchet(key, value),
            Self::Table(c) => c.ratchet(key, value),
            Self::Remote(c) => c.ratchet(key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_distinct_per_scope() {
        let entity = CounterKey::entity(EntityType::BibliographicResource, Some("060"));
        let snap = CounterKey::snapshot(EntityType::BibliographicResource, Some("060"), 4);
        assert_eq!(entity.storage_key(), "060:br:entity");
        assert_eq!(snap.storage_key(), "060:br:se:4");
    }

    #[test]
    fn empty_prefix_is_no_prefix() {
        let a = CounterKey::entity(EntityType::Citation, Some(""));
        let b = CounterKey::entity(EntityType::Citation, None);
        assert_eq!(a, b);
        assert_eq!(a.storage_key(), "_:ci:entity");
    }

    #[test]
    fn ratchet_only_moves_forward() {
        let store = CounterBackend::default();
        let key = CounterKey::entity(EntityType::Identifier, None);
        assert_eq!(store.ratchet(&key, 7).expect("ratchet"), 7);
        assert_eq!(store.ratchet(&key, 3).expect("ratchet"), 7);
        assert_eq!(store.increment(&key).expect("increment"), 8);
    }
}
