//! Per-core timer facility (C7, ambient supplement -- SPEC_FULL.md §4.7).
//!
//! Not part of the reference io-engine's reactor, which leaves timeouts to
//! SPDK's own poller-based timer subsystem; added here because a reactor
//! with no way to schedule delayed or periodic work is not a usable runtime
//! on its own. Follows the same on-core-only mutation discipline as pollers
//! (spec invariant I6): a timer is only inserted into, or removed from, the
//! heap of the core it belongs to, from code running on that core.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashSet},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Opaque handle returned by `timer_schedule`, used to cancel later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

pub(crate) struct TimerEntry {
    pub(crate) id: TimerId,
    pub(crate) deadline: Instant,
    pub(crate) period: Option<Duration>,
    pub(crate) func: Box<dyn FnMut() + Send>,
}

struct HeapItem(TimerEntry);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline == other.0.deadline
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap; reverse so the earliest deadline sorts
        // highest, i.e. pops first.
        other.0.deadline.cmp(&self.0.deadline)
    }
}

/// A single core's timer heap plus a generator for globally-unique handles.
///
/// Handle allocation (`next_id`) is a plain atomic shared across cores so a
/// caller on any core can obtain an id synchronously and hand it back to the
/// caller before the corresponding insert event has even been dispatched;
/// the heap itself (`heap`, `cancelled`) is touched only from the owning
/// core, per I6.
pub(crate) struct TimerHeap {
    heap: Mutex<BinaryHeap<HeapItem>>,
    cancelled: Mutex<HashSet<TimerId>>,
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_timer_id() -> TimerId {
    TimerId(NEXT_TIMER_ID.fetch_add(1, AtomicOrdering::Relaxed))
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn insert(&self, entry: TimerEntry) {
        self.heap.lock().push(HeapItem(entry));
    }

    pub(crate) fn cancel(&self, id: TimerId) {
        self.cancelled.lock().insert(id);
    }

    /// Pops and fires every entry whose deadline has passed, re-arming
    /// periodic ones at `deadline + period` (spec §4.7). A cancelled entry
    /// is dropped silently the first time it is seen past its deadline,
    /// which also cancels any future recurrence of a periodic timer.
    pub(crate) fn manage_expired(&self, now: Instant) {
        loop {
            let due = {
                let mut heap = self.heap.lock();
                match heap.peek() {
                    Some(item) if item.0.deadline <= now => heap.pop(),
                    _ => None,
                }
            };
            let mut entry = match due {
                Some(HeapItem(entry)) => entry,
                None => break,
            };

            if self.cancelled.lock().remove(&entry.id) {
                continue;
            }

            (entry.func)();

            if let Some(period) = entry.period {
                entry.deadline += period;
                self.insert(entry);
            }
        }
    }
}
