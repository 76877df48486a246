//! # Remote Counter Backend
//!
//! Counters kept in a key-value service that offers an atomic `INCR`. The
//! service is abstracted as [`AtomicKv`] so the allocator does not depend on
//! any particular client; [`MemoryKv`] stands in for it in tests, and
//! `RedisKv` talks to a real Redis server when the `redis` feature is on.

use super::{CounterKey, CounterStore, check_regression};
use crate::ProvstoreError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Minimal atomic key-value contract.
pub trait AtomicKv: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<u64>, ProvstoreError>;
    fn set(&self, key: &str, value: u64) -> Result<(), ProvstoreError>;
    /// Atomically add one and return the new value. Missing keys start at 0.
    fn incr(&self, key: &str) -> Result<u64, ProvstoreError>;
    /// Atomically raise `key` to `value` if it is lower. Returns the value
    /// held afterwards.
    fn fetch_max(&self, key: &str, value: u64) -> Result<u64, ProvstoreError>;
}

/// In-process `AtomicKv`.
#[derive(Debug, Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, u64>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AtomicKv for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<u64>, ProvstoreError> {
        Ok(self.values.lock().get(key).copied())
    }

    fn set(&self, key: &str, value: u64) -> Result<(), ProvstoreError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<u64, ProvstoreError> {
        let mut values = self.values.lock();
        let slot = values.entry(key.to_string()).or_insert(0);
        *slot += 1;
        Ok(*slot)
    }

    fn fetch_max(&self, key: &str, value: u64) -> Result<u64, ProvstoreError> {
        let mut values = self.values.lock();
        let slot = values.entry(key.to_string()).or_insert(0);
        *slot = (*slot).max(value);
        Ok(*slot)
    }
}

/// Counter store over an [`AtomicKv`] service.
///
/// Keys are namespaced so several corpora can share one service.
pub struct RemoteCounter {
    kv: Box<dyn AtomicKv>,
    namespace: String,
}

impl std::fmt::Debug for RemoteCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCounter")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RemoteCounter {
    pub fn new(kv: Box<dyn AtomicKv>, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    /// Counter backed by a fresh [`MemoryKv`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryKv::new()), "provstore")
    }

    fn remote_key(&self, key: &CounterKey) -> String {
        format!("{}:{}", self.namespace, key.storage_key())
    }
}

impl CounterStore for RemoteCounter {
    fn read(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        Ok(self.kv.get(&self.remote_key(key))?.unwrap_or(0))
    }

    fn set(&self, key: &CounterKey, value: u64, force: bool) -> Result<(), ProvstoreError> {
        let remote_key = self.remote_key(key);
        if force {
            return self.kv.set(&remote_key, value);
        }
        // A lower target leaves the stored value untouched.
        let stored = self.kv.fetch_max(&remote_key, value)?;
        check_regression(key, stored, value, false)
    }

    fn increment(&self, key: &CounterKey) -> Result<u64, ProvstoreError> {
        self.kv.incr(&self.remote_key(key))
    }

    fn ratchet(&self, key: &CounterKey, value: u64) -> Result<u64, ProvstoreError> {
        self.kv.fetch_max(&self.remote_key(key), value)
    }
}

// =============================================================================
// REDIS
// =============================================================================

#[cfg(feature = "redis")]
mod redis_kv {
    use super::AtomicKv;
    use crate::ProvstoreError;
    use parking_lot::Mutex;
    use redis::Commands;

    /// GET, compare and SET in one server-side step.
    const FETCH_MAX: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local target = tonumber(ARGV[1])
if target > current then
    redis.call('SET', KEYS[1], ARGV[1])
    return target
end
return current
";

    /// `AtomicKv` backed by a Redis server.
    pub struct RedisKv {
        conn: Mutex<redis::Connection>,
    }

    impl std::fmt::Debug for RedisKv {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisKv").finish_non_exhaustive()
        }
    }

    impl RedisKv {
        /// Connect to `url`, e.g. `redis://127.0.0.1:6379/0`.
        pub fn connect(url: &str) -> Result<Self, ProvstoreError> {
            let client =
                redis::Client::open(url).map_err(|e| ProvstoreError::TransportFailure(e.to_string()))?;
            let conn = client
                .get_connection()
                .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }
    }

    impl AtomicKv for RedisKv {
        fn get(&self, key: &str) -> Result<Option<u64>, ProvstoreError> {
            self.conn
                .lock()
                .get::<_, Option<u64>>(key)
                .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))
        }

        fn set(&self, key: &str, value: u64) -> Result<(), ProvstoreError> {
            self.conn
                .lock()
                .set::<_, _, ()>(key, value)
                .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))
        }

        fn incr(&self, key: &str) -> Result<u64, ProvstoreError> {
            self.conn
                .lock()
                .incr::<_, _, u64>(key, 1)
                .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))
        }

        fn fetch_max(&self, key: &str, value: u64) -> Result<u64, ProvstoreError> {
            let mut conn = self.conn.lock();
            redis::Script::new(FETCH_MAX)
                .key(key)
                .arg(value)
                .invoke::<u64>(&mut *conn)
                .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))
        }
    }
}

#[cfg(feature = "redis")]
pub use redis_kv::RedisKv;
