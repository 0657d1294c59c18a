//! Async locks keyed by string, created on demand.
//!
//! An entry lives only while some task holds or waits on it, so the map stays
//! bounded by the number of keys in flight rather than every key ever seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<LockMap>,
}

/// Held lock for one key. Dropping it releases the lock and forgets the key
/// once nobody else is waiting on it.
pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let lock = Arc::clone(self.map().entry(key.to_string()).or_default());
        let held = lock.lock_owned().await;
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            held: Some(held),
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut map = self.owner.map();
        if map
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.key);
        }
    }
}
