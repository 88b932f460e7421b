//! Per-blob async locks
//!
//! Serializes materialization and eviction of the same blob. Table entries
//! exist only while someone holds or waits for the lock.

use cuerre_blobstore::BlobId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters
    users: usize,
}

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    table: Mutex<HashMap<BlobId, Slot>>,
}

/// One holder or waiter of a key. The last one dropped removes the entry,
/// including when a pending `lock()` future is cancelled.
struct Registration<'a> {
    locks: &'a KeyedLocks,
    key: BlobId,
}

pub(crate) struct KeyGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    _registration: Registration<'a>,
}

impl KeyedLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<BlobId, Slot>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, key: &BlobId) -> (Registration<'_>, Arc<AsyncMutex<()>>) {
        let mutex = {
            let mut table = self.table();
            let slot = table.entry(key.clone()).or_default();
            slot.users += 1;
            slot.mutex.clone()
        };
        let registration = Registration {
            locks: self,
            key: key.clone(),
        };
        (registration, mutex)
    }

    /// Wait for exclusive access to `key`
    pub(crate) async fn lock(&self, key: &BlobId) -> KeyGuard<'_> {
        let (registration, mutex) = self.register(key);
        let guard = mutex.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    /// Exclusive access to `key` if nobody holds it right now
    pub(crate) fn try_lock(&self, key: &BlobId) -> Option<KeyGuard<'_>> {
        let (registration, mutex) = self.register(key);
        let guard = mutex.try_lock_owned().ok()?;
        Some(KeyGuard {
            _guard: guard,
            _registration: registration,
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table().len()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.table();
        let Some(slot) = table.get_mut(&self.key) else {
            return;
        };
        slot.users -= 1;
        if slot.users == 0 {
            table.remove(&self.key);
        }
    }
}
