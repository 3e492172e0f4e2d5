//! FIFO request gate bounding the number of in-flight resolver calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// At most `capacity` holders at once; waiters are admitted in arrival order
/// (`tokio::sync::Semaphore` is fair).
#[derive(Debug, Clone)]
pub struct RequestGate {
    slots: Arc<Semaphore>,
    capacity: usize,
    queued: Arc<AtomicUsize>,
}

/// A held slot; dropping it admits the next queued request.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

struct QueuedMarker(Arc<AtomicUsize>);

impl Drop for QueuedMarker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RequestGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot. Returns `None` only if the gate has been closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let marker = QueuedMarker(Arc::clone(&self.queued));
        let permit = Arc::clone(&self.slots).acquire_owned().await.ok()?;
        drop(marker);
        Some(GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Requests currently waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn releases_admit_waiters_in_order() {
        let gate = RequestGate::new(1);
        let first = gate.acquire().await.expect("slot");
        assert_eq!(gate.in_flight(), 1);

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert_eq!(gate.queued(), 1);

        drop(first);
        waiter.await.expect("join").expect("admitted");
        assert_eq!(gate.queued(), 0);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_the_queue() {
        let gate = RequestGate::new(1);
        let _held = gate.acquire().await.expect("slot");
        let pending = tokio::time::timeout(std::time::Duration::from_millis(5), gate.acquire()).await;
        assert!(pending.is_err());
        assert_eq!(gate.queued(), 0);
    }
}
