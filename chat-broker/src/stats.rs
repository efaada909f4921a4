use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by the router loop on every dispatch decision.
#[derive(Default)]
pub(crate) struct DeliveryStats {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    unroutable: AtomicU64,
}

impl DeliveryStats {
    /// Publishes every counter update made while routing the message.
    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_full(&self) {
        self.dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_closed(&self) {
        self.dropped_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DeliveryStatsSnapshot {
        // Acquire pairs with `record_dispatched`, so the per-recipient counts
        // read below are at least as new as `dispatched`.
        let dispatched = self.dispatched.load(Ordering::Acquire);
        DeliveryStatsSnapshot {
            dispatched,
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the broker's delivery counters.
///
/// `dispatched` counts messages the router has finished routing; a broadcast adds
/// one `delivered` or drop per recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped_full: u64,
    pub dropped_closed: u64,
    pub unroutable: u64,
}

impl DeliveryStatsSnapshot {
    /// Deliveries abandoned because the inbox was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_closed
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn snapshot_never_sees_dispatch_ahead_of_its_delivery() {
        let stats = Arc::new(DeliveryStats::default());
        let writer = {
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                for _ in 0..100_000 {
                    stats.record_delivered();
                    stats.record_dispatched();
                }
            })
        };

        while !writer.is_finished() {
            let snapshot = stats.snapshot();
            assert!(
                snapshot.delivered >= snapshot.dispatched,
                "delivered {} behind dispatched {}",
                snapshot.delivered,
                snapshot.dispatched
            );
        }
        writer.join().expect("writer thread");

        assert_eq!(stats.snapshot().dispatched, 100_000);
        assert_eq!(stats.snapshot().delivered, 100_000);
    }
}
