//! Subscription handle for a position stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{PositionUpdate, WatchOptions};

/// Producer side of a watch, held by the source.
#[derive(Clone, Debug)]
pub struct WatchFeed {
    tx: Sender<PositionUpdate>,
    active: Arc<AtomicBool>,
}

impl WatchFeed {
    /// Deliver an update.
    ///
    /// Returns `false` once the watch has been unsubscribed or dropped, so
    /// the source can stop producing.
    pub fn send(&self, update: PositionUpdate) -> bool {
        if !self.is_active() {
            return false;
        }
        self.tx.send(update).is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Consumer side of a position stream and its unsubscribe handle.
///
/// Samples closer than `min_interval_ms` after the previously delivered
/// sample are dropped here. A zero interval disables the throttle. Samples
/// timestamped before the last delivered one are passed through. Errors
/// always pass through.
#[derive(Debug)]
pub struct PositionWatch {
    rx: Receiver<PositionUpdate>,
    active: Arc<AtomicBool>,
    min_interval_ms: u64,
    last_delivered_ms: Option<u64>,
    throttled: u64,
}

impl PositionWatch {
    /// Create a connected feed/watch pair.
    pub fn channel(options: &WatchOptions) -> (WatchFeed, PositionWatch) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let active = Arc::new(AtomicBool::new(true));
        let feed = WatchFeed {
            tx,
            active: Arc::clone(&active),
        };
        let watch = PositionWatch {
            rx,
            active,
            min_interval_ms: options.min_interval_ms,
            last_delivered_ms: None,
            throttled: 0,
        };
        (feed, watch)
    }

    /// Next deliverable update, without blocking.
    ///
    /// Returns `None` when nothing is queued or the watch is unsubscribed.
    pub fn try_next(&mut self) -> Option<PositionUpdate> {
        loop {
            if !self.is_active() {
                return None;
            }
            let update = match self.rx.try_recv() {
                Ok(update) => update,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            };
            if self.accept(&update) {
                return Some(update);
            }
        }
    }

    fn accept(&mut self, update: &PositionUpdate) -> bool {
        let PositionUpdate::Sample(sample) = update else {
            return true;
        };
        if self.min_interval_ms == 0 {
            return true;
        }
        let t = sample.timestamp_ms;
        if let Some(last) = self.last_delivered_ms {
            if t < last {
                // Clock went backwards: delivered, throttle anchor unchanged.
                tracing::debug!("Sample at {}ms predates last delivered {}ms", t, last);
                return true;
            }
            if t - last < self.min_interval_ms {
                self.throttled += 1;
                tracing::trace!("Throttled sample at {}ms ({}ms since last)", t, t - last);
                return false;
            }
        }
        self.last_delivered_ms = Some(t);
        true
    }

    /// Stop delivery. Queued updates are discarded.
    pub fn unsubscribe(&mut self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!("Position watch unsubscribed ({} throttled)", self.throttled);
        }
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of samples dropped by the interval throttle.
    pub fn throttled_count(&self) -> u64 {
        self.throttled
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
