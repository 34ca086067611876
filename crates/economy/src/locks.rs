//! Per-child serialization.
//!
//! Each child id maps to an async mutex created on first use. The arena only
//! keeps `Weak` handles, so a child's lock is freed once no call holds it;
//! dead entries are swept whenever a new lock is created.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct ChildLocks {
    arena: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

/// Held for the duration of one mutating call on a child.
#[derive(Debug)]
pub struct ChildGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ChildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, child_id: &str) -> Arc<AsyncMutex<()>> {
        let mut arena = self.arena.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = arena.get(child_id).and_then(Weak::upgrade) {
            return lock;
        }
        arena.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        arena.insert(child_id.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive access to `child_id`.
    pub async fn lock(&self, child_id: &str) -> ChildGuard {
        let handle = self.handle(child_id);
        ChildGuard {
            _guard: handle.lock_owned().await,
        }
    }

    /// Entries currently tracked, live or not yet swept.
    pub fn tracked(&self) -> usize {
        self.arena
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop entries whose lock is no longer held by anyone.
    pub fn sweep(&self) {
        self.arena
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_child_is_serialized() {
        let locks = Arc::new(ChildLocks::new());
        let guard = locks.lock("ada").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("ada").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_children_do_not_contend() {
        let locks = ChildLocks::new();
        let _ada = locks.lock("ada").await;
        let grace = tokio::time::timeout(Duration::from_millis(50), locks.lock("grace")).await;
        assert!(grace.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_reclaimed() {
        let locks = ChildLocks::new();
        drop(locks.lock("ada").await);
        drop(locks.lock("grace").await);
        locks.sweep();
        assert_eq!(locks.tracked(), 0);
    }
}
