// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-group serial dispatcher (§4.3) — the central ordering primitive.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

/// One group folder's serialisation entry: a `pending` count (how many
/// callers are queued or running through this folder right now) and the
/// mutex that actually enforces one-at-a-time execution. `pending` is what
/// lets the registry evict the entry once nobody references it, instead of
/// growing forever as new group folders are seen.
struct GroupLock {
    pending: AtomicUsize,
    mutex: AsyncMutex<()>,
}

impl GroupLock {
    fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            mutex: AsyncMutex::new(()),
        }
    }
}

/// Registry of per-group locks. `with_lock` is the only entry point every
/// executor (message handler, scheduler, IPC follow-up) must route through;
/// cross-folder executions never contend with one another.
#[derive(Default)]
pub struct LockManager {
    locks: StdMutex<HashMap<String, Arc<GroupLock>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn acquire_entry(&self, folder: &str) -> Arc<GroupLock> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(folder.to_string())
            .or_insert_with(|| Arc::new(GroupLock::new()))
            .clone()
    }

    /// Runs `task` with exclusive access to `folder`. Queues behind any
    /// in-flight or already-queued task for the same folder; runs
    /// concurrently with tasks for other folders.
    pub async fn with_lock<F, Fut, T>(&self, folder: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = self.acquire_entry(folder);
        entry.pending.fetch_add(1, Ordering::SeqCst);

        let result = {
            let _guard = entry.mutex.lock().await;
            task().await
        };

        if entry.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.evict_if_idle(folder, &entry);
        }

        result
    }

    /// Removes the folder's entry once its `pending` count has returned to
    /// zero, but only if no new caller grabbed the same `Arc` in the
    /// meantime (checked by pointer identity against what's still in the map).
    fn evict_if_idle(&self, folder: &str, entry: &Arc<GroupLock>) {
        if entry.pending.load(Ordering::SeqCst) != 0 {
            return;
        }
        let mut locks = self.locks.lock().unwrap();
        if let Some(current) = locks.get(folder) {
            if Arc::ptr_eq(current, entry) {
                locks.remove(folder);
            }
        }
    }

    /// Number of group folders currently tracked (queued or running).
    /// Exposed for tests asserting the registry doesn't grow unboundedly.
    pub fn tracked_folders(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[tokio::test]
    async fn same_group_executions_never_overlap() {
        let mgr = Arc::new(LockManager::new());
        let active = Arc::new(AtomicI32::new(0));
        let max_seen = Arc::new(AtomicI32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let mgr = mgr.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                mgr.with_lock("group-a", || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_groups_run_concurrently() {
        let mgr = Arc::new(LockManager::new());
        let active = Arc::new(AtomicI32::new(0));
        let max_seen = Arc::new(AtomicI32::new(0));

        let mut handles = Vec::new();
        for i in 0..10 {
            let mgr = mgr.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            let folder = format!("group-{i}");
            handles.push(tokio::spawn(async move {
                mgr.with_lock(&folder, || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn idle_entries_are_evicted() {
        let mgr = LockManager::new();
        mgr.with_lock("g", || async {}).await;
        assert_eq!(mgr.tracked_folders(), 0);
    }

    #[tokio::test]
    async fn result_is_returned() {
        let mgr = LockManager::new();
        let v = mgr.with_lock("g", || async { 42 }).await;
        assert_eq!(v, 42);
    }
}
