use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Load accounting for a content server.
///
/// `active` is the load reported in heartbeats: the number of transfer
/// connections currently open. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicU64>,
    served: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a connection as active until the guard drops.
    pub fn enter(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Relaxed).min(u32::MAX as u64) as u32
    }

    pub fn record_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Decrements the active count on drop, including on early return or panic
/// in the connection task.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicU64>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}
