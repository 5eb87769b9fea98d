//! Notification of applied changes.
//!
//! The store calls a [`ChangePublisher`] once for every change that altered
//! its state, after the per-key lock has been released. [`ChangeFeed`] is a
//! ready-made publisher fanning records out to channel subscribers.
//!
//! ```rust
//! use lodekv_core::store::ChangeFeed;
//! use std::sync::Arc;
//!
//! let feed = Arc::new(ChangeFeed::new());
//! let updates = feed.subscribe();
//! // hand `feed.clone()` to the store as its publisher, then:
//! // while let Ok(record) = updates.recv() { ... }
//! # drop(updates);
//! ```

use crate::types::ChangeRecord;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Receives every change that won last-writer-wins resolution.
///
/// Implementations must not block for long: publishing happens on the
/// writer's thread. A panicking publisher is caught and logged by the store.
pub trait ChangePublisher: Send + Sync {
    /// Called once per applied change, in apply order for any single key.
    fn publish(&self, record: &ChangeRecord);
}

impl<F> ChangePublisher for F
where
    F: Fn(&ChangeRecord) + Send + Sync,
{
    fn publish(&self, record: &ChangeRecord) {
        self(record);
    }
}

/// Publisher that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl ChangePublisher for NoopPublisher {
    fn publish(&self, _record: &ChangeRecord) {}
}

/// Fans applied changes out to any number of channel subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// publish.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeRecord>>>,
}

impl ChangeFeed {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber; it sees changes published from now on.
    pub fn subscribe(&self) -> Receiver<ChangeRecord> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Number of registered subscribers, including ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl ChangePublisher for ChangeFeed {
    fn publish(&self, record: &ChangeRecord) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(record.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HybridTimestamp;

    fn record() -> ChangeRecord {
        ChangeRecord::set("k", "v", HybridTimestamp::new(1, 0, "n")).with_revision(1)
    }

    #[test]
    fn feed_delivers_to_every_subscriber() {
        let feed = ChangeFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();

        feed.publish(&record());

        assert_eq!(a.try_recv().unwrap().revision, 1);
        assert_eq!(b.try_recv().unwrap().revision, 1);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::new();
        let kept = feed.subscribe();
        drop(feed.subscribe());

        feed.publish(&record());
        assert_eq!(feed.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
        assert!(kept.try_recv().is_err());
    }

    #[test]
    fn closures_are_publishers() {
        let seen = std::sync::Mutex::new(Vec::new());
        let publisher = |r: &ChangeRecord| seen.lock().unwrap().push(r.revision);
        publisher.publish(&record());
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }
}
