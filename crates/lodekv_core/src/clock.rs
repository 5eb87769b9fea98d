//! Timestamp generation for local writes.

use crate::types::HybridTimestamp;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of hybrid timestamps for locally originated writes.
///
/// The store reports every timestamp it applies through
/// [`observe`](TimestampSource::observe), so a later [`now`](TimestampSource::now)
/// reading is strictly greater than anything the node has seen.
pub trait TimestampSource: Send + Sync {
    /// Returns a fresh timestamp, greater than any previously returned or
    /// observed one.
    fn now(&self) -> HybridTimestamp;

    /// Advances the clock past a timestamp seen from elsewhere.
    fn observe(&self, seen: &HybridTimestamp);
}

type WallClock = Box<dyn Fn() -> i64 + Send + Sync>;

/// A hybrid logical clock driven by the system wall clock.
pub struct HybridClock {
    node_id: String,
    wall: WallClock,
    last: Mutex<(i64, i32)>,
}

impl HybridClock {
    /// Creates a clock for `node_id` reading the system time.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_wall_clock(node_id, system_millis)
    }

    /// Creates a clock with an injected wall-clock reading.
    pub fn with_wall_clock(
        node_id: impl Into<String>,
        wall: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            wall: Box::new(wall),
            last: Mutex::new((0, 0)),
        }
    }

    /// Node identifier stamped on every reading.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

impl TimestampSource for HybridClock {
    fn now(&self) -> HybridTimestamp {
        let wall = (self.wall)();
        let mut last = self.last.lock();
        let (physical, logical) = *last;

        *last = if wall > physical {
            (wall, 0)
        } else if logical == i32::MAX {
            (physical + 1, 0)
        } else {
            (physical, logical + 1)
        };
        HybridTimestamp::new(last.0, last.1, self.node_id.clone())
    }

    fn observe(&self, seen: &HybridTimestamp) {
        let mut last = self.last.lock();
        if (seen.physical_ms, seen.logical) > *last {
            *last = (seen.physical_ms, seen.logical);
        }
    }
}

impl std::fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridClock")
            .field("node_id", &self.node_id)
            .field("last", &*self.last.lock())
            .finish_non_exhaustive()
    }
}

fn system_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn frozen(at: i64) -> (HybridClock, Arc<AtomicI64>) {
        let wall = Arc::new(AtomicI64::new(at));
        let reader = wall.clone();
        let clock = HybridClock::with_wall_clock("n1", move || reader.load(Ordering::SeqCst));
        (clock, wall)
    }

    #[test]
    fn readings_are_strictly_increasing_on_a_frozen_wall() {
        let (clock, _) = frozen(100);
        let a = clock.now();
        let b = clock.now();
        assert_eq!((a.physical_ms, a.logical), (100, 0));
        assert_eq!((b.physical_ms, b.logical), (100, 1));
        assert_eq!(b.node_id, "n1");
    }

    #[test]
    fn wall_clock_advance_resets_logical() {
        let (clock, wall) = frozen(100);
        clock.now();
        clock.now();
        wall.store(200, Ordering::SeqCst);
        let t = clock.now();
        assert_eq!((t.physical_ms, t.logical), (200, 0));
    }

    #[test]
    fn observed_future_timestamp_dominates() {
        let (clock, _) = frozen(100);
        let remote = HybridTimestamp::new(500, 7, "n2");
        clock.observe(&remote);

        let t = clock.now();
        assert!(t > remote);
        assert_eq!((t.physical_ms, t.logical), (500, 8));
    }

    #[test]
    fn logical_overflow_carries_into_physical() {
        let (clock, _) = frozen(10);
        clock.observe(&HybridTimestamp::new(10, i32::MAX, "n2"));
        let t = clock.now();
        assert_eq!((t.physical_ms, t.logical), (11, 0));
    }
}
