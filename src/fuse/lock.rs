//! Per-path operation locks.
//!
//! Every bridge callback takes the lock for its path in either access
//! (shared) or modify (exclusive) mode for the duration of the operation.
//! Slots are reference counted and disappear when the last holder releases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// How an operation uses the path it targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Reads and lookups; shared.
    Access,
    /// Writes and removals; exclusive.
    Modify,
}

struct Slot {
    lock: Arc<RwLock<()>>,
    refs: usize,
}

/// Table of per-path locks.
pub struct PathLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

enum ModeGuard {
    Access(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Modify(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Holds one path lock until dropped.
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: String,
    guard: Option<ModeGuard>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Acquires the lock for `path` in the given mode.
    pub async fn acquire(&self, path: &str, mode: Mode) -> PathGuard<'_> {
        let lock = {
            let mut slots = self.slots.lock().expect("path lock table never poisoned");
            let slot = slots
                .entry(path.to_string())
                .or_insert_with(|| Slot { lock: Arc::new(RwLock::new(())), refs: 0 });
            slot.refs += 1;
            slot.lock.clone()
        };
        let guard = match mode {
            Mode::Access => ModeGuard::Access(lock.read_owned().await),
            Mode::Modify => ModeGuard::Modify(lock.write_owned().await),
        };
        PathGuard { locks: self, path: path.to_string(), guard: Some(guard) }
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        // Release the rwlock before retiring the slot so no waiter can end
        // up on a slot that was already removed.
        self.guard.take();
        let mut slots = self.locks.slots.lock().expect("path lock table never poisoned");
        if let Some(slot) = slots.get_mut(&self.path) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_holders_coexist() {
        let locks = PathLocks::new();
        let first = locks.acquire("/a", Mode::Access).await;
        let second = locks.acquire("/a", Mode::Access).await;
        drop(first);
        drop(second);
    }

    #[tokio::test]
    async fn exclusive_holder_blocks_access() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.acquire("/a", Mode::Modify).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("/a", Mode::Access).await;
            })
        };
        // The contender cannot finish while the write guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn distinct_paths_do_not_contend() {
        let locks = PathLocks::new();
        let a = locks.acquire("/a", Mode::Modify).await;
        let b = locks.acquire("/b", Mode::Modify).await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn slots_retire_with_their_last_holder() {
        let locks = PathLocks::new();
        let guard = locks.acquire("/a", Mode::Access).await;
        drop(guard);
        assert!(locks.slots.lock().unwrap().is_empty());
    }
}
