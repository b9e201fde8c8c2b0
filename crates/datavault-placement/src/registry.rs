//! In-memory worker directory with heartbeat-based liveness.

use datavault_common::LIVENESS_TIMEOUT;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A worker currently inside its liveness window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveWorker {
    pub worker_id: String,
    pub address: String,
}

struct Entry {
    address: String,
    last_heartbeat: Instant,
}

struct Inner {
    workers: HashMap<String, Entry>,
    /// Worker ids in first-heartbeat order. Kept so the round-robin
    /// index walks a stable candidate list between calls.
    order: Vec<String>,
}

/// Directory of workers keyed by id.
///
/// Heartbeat receivers, the placement path, and the periodic reaper all
/// touch this map concurrently; a single `RwLock` serializes them. The
/// registry is not durable: a restarted scheduler is empty until workers
/// heartbeat again.
pub struct WorkerRegistry {
    inner: RwLock<Inner>,
    liveness_timeout: Duration,
}

impl WorkerRegistry {
    /// Create a registry with the cluster liveness window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_liveness_timeout(LIVENESS_TIMEOUT)
    }

    /// Create a registry with a custom liveness window (tests shorten it).
    #[must_use]
    pub fn with_liveness_timeout(liveness_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                workers: HashMap::new(),
                order: Vec::new(),
            }),
            liveness_timeout,
        }
    }

    /// Insert or refresh a worker. The address is overwritten on every
    /// heartbeat: workers may come back on a different port.
    pub fn record_heartbeat(&self, worker_id: &str, address: &str) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if let Some(entry) = inner.workers.get_mut(worker_id) {
            entry.address = address.to_string();
            entry.last_heartbeat = now;
        } else {
            // First heartbeat (or first after being reaped) counts as a
            // fresh registration at the tail of the candidate list.
            inner.workers.insert(
                worker_id.to_string(),
                Entry {
                    address: address.to_string(),
                    last_heartbeat: now,
                },
            );
            inner.order.push(worker_id.to_string());
        }
    }

    /// Snapshot of the workers inside the liveness window, in
    /// registration order.
    #[must_use]
    pub fn active(&self) -> Vec<ActiveWorker> {
        let now = Instant::now();
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| {
                let entry = inner.workers.get(id)?;
                if now.duration_since(entry.last_heartbeat) <= self.liveness_timeout {
                    Some(ActiveWorker {
                        worker_id: id.clone(),
                        address: entry.address.clone(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Remove every worker whose heartbeat has expired. Returns the ids
    /// that were purged so the caller can log them.
    pub fn reap(&self) -> Vec<String> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let stale: Vec<String> = inner
            .workers
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_heartbeat) > self.liveness_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.workers.remove(id);
        }
        if !stale.is_empty() {
            let workers = std::mem::take(&mut inner.workers);
            inner.order.retain(|id| workers.contains_key(id));
            inner.workers = workers;
        }
        stale
    }

    /// Number of registered workers, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().workers.is_empty()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn short_lived() -> WorkerRegistry {
        WorkerRegistry::with_liveness_timeout(Duration::from_millis(40))
    }

    #[test]
    fn test_first_heartbeat_registers() {
        let registry = WorkerRegistry::new();
        registry.record_heartbeat("worker-1", "localhost:9090");

        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].worker_id, "worker-1");
        assert_eq!(active[0].address, "localhost:9090");
    }

    #[test]
    fn test_heartbeat_refreshes_existing_worker() {
        let registry = WorkerRegistry::new();
        registry.record_heartbeat("worker-1", "localhost:9090");
        registry.record_heartbeat("worker-1", "localhost:9090");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active().len(), 1);
    }

    #[test]
    fn test_heartbeat_overwrites_address() {
        let registry = WorkerRegistry::new();
        registry.record_heartbeat("worker-1", "localhost:9090");
        registry.record_heartbeat("worker-1", "localhost:9999");

        assert_eq!(registry.active()[0].address, "localhost:9999");
    }

    #[test]
    fn test_active_preserves_registration_order() {
        let registry = WorkerRegistry::new();
        registry.record_heartbeat("worker-2", "localhost:9091");
        registry.record_heartbeat("worker-1", "localhost:9090");
        registry.record_heartbeat("worker-3", "localhost:9092");

        let ids: Vec<_> = registry.active().into_iter().map(|w| w.worker_id).collect();
        assert_eq!(ids, ["worker-2", "worker-1", "worker-3"]);
    }

    #[test]
    fn test_expired_worker_is_filtered_from_active() {
        let registry = short_lived();
        registry.record_heartbeat("worker-1", "localhost:9090");
        registry.record_heartbeat("worker-2", "localhost:9091");

        std::thread::sleep(Duration::from_millis(60));
        registry.record_heartbeat("worker-2", "localhost:9091");

        let ids: Vec<_> = registry.active().into_iter().map(|w| w.worker_id).collect();
        assert_eq!(ids, ["worker-2"]);
        // Not reaped yet, only filtered
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reap_removes_expired_workers() {
        let registry = short_lived();
        registry.record_heartbeat("worker-1", "localhost:9090");

        std::thread::sleep(Duration::from_millis(60));
        let reaped = registry.reap();

        assert_eq!(reaped, ["worker-1"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reap_keeps_live_workers() {
        let registry = short_lived();
        registry.record_heartbeat("worker-1", "localhost:9090");
        std::thread::sleep(Duration::from_millis(60));
        registry.record_heartbeat("worker-2", "localhost:9091");

        let reaped = registry.reap();

        assert_eq!(reaped, ["worker-1"]);
        assert_eq!(registry.active().len(), 1);
    }

    #[test]
    fn test_reregistration_after_reap_goes_to_tail() {
        let registry = short_lived();
        registry.record_heartbeat("worker-1", "localhost:9090");
        std::thread::sleep(Duration::from_millis(60));
        registry.reap();

        registry.record_heartbeat("worker-2", "localhost:9091");
        registry.record_heartbeat("worker-1", "localhost:9090");

        let ids: Vec<_> = registry.active().into_iter().map(|w| w.worker_id).collect();
        assert_eq!(ids, ["worker-2", "worker-1"]);
    }
}
