//! Per-device critical sections
//!
//! Each device id maps to its own async mutex. Holders may await storage
//! IO while holding the guard; requests for other devices proceed
//! independently. An entry lives only while someone holds or awaits it,
//! so lookups for unknown ids leave nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<String, Arc<AsyncMutex<()>>>;

/// Table of per-device async mutexes keyed by device id
#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Mutex<LockTable>,
}

/// Held critical section for one device; releases its table entry on drop
/// when no other task is waiting for it
#[derive(Debug)]
pub struct DeviceGuard<'a> {
    table: &'a Mutex<LockTable>,
    device_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section for `device_id`
    pub async fn acquire(&self, device_id: &str) -> DeviceGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        DeviceGuard {
            table: &self.locks,
            device_id: device_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of devices currently held or awaited
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        // Waiters clone the entry under the table lock, so the count is stable here
        let mut table = self.table.lock();
        drop(self.guard.take());
        let idle = table
            .get(&self.device_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            table.remove(&self.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_device_is_exclusive() {
        let locks = Arc::new(DeviceLocks::new());
        let guard = locks.acquire("earth-aaaaaaaaaaaaaaaa").await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("earth-aaaaaaaaaaaaaaaa").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn other_devices_do_not_wait() {
        let locks = DeviceLocks::new();
        let _a = locks.acquire("earth-aaaaaaaaaaaaaaaa").await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire("earth-bbbbbbbbbbbbbbbb"),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);

        drop(b);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn entry_survives_release_while_awaited() {
        let locks = Arc::new(DeviceLocks::new());
        let first = locks.acquire("earth-cccccccccccccccc").await;

        let locks2 = locks.clone();
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire("earth-cccccccccccccccc").await;
            let _ = entered_tx.send(());
            let _ = release_rx.await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still shares the entry, so releasing keeps it
        drop(first);
        entered_rx.await.unwrap();
        assert_eq!(locks.len(), 1);

        // A third caller must queue behind the waiter rather than get a fresh mutex
        let third = tokio::time::timeout(
            Duration::from_millis(30),
            locks.acquire("earth-cccccccccccccccc"),
        )
        .await;
        assert!(third.is_err());

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn repeated_lookups_leave_table_empty() {
        let locks = DeviceLocks::new();
        for i in 0..1000 {
            let _g = locks.acquire(&format!("earth-{:016x}", i)).await;
        }
        assert!(locks.is_empty());
    }
}
