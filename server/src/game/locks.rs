//! Per-user mutual exclusion for multi-step operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<i64, Arc<AsyncMutex<()>>>;

/// One async mutex per user id, created on first use.
///
/// Holding the guard serializes every read-modify-write sequence touching
/// that user's cats, battles, items or account. An entry lives only while
/// someone holds or waits for it.
#[derive(Default)]
pub struct UserLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: i64) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(user_id).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;

        UserGuard {
            user_id,
            lock,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Held lock on one user; drops the map entry when nobody else needs it.
pub struct UserGuard {
    user_id: i64,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        // Clones are only taken under the map lock, so the count is stable here
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.guard.take();

        // One reference in the map, one in this guard
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}
