//! Fixed-capacity allocator of [`Event`](super::event::Event) records (C1).
//!
//! Borrows the shape of the reference io-engine's `MemoryPool<T>`: a
//! preallocated backing store plus a free-list, sized once at startup so
//! the hot path never allocates. Unlike the DPDK-backed original this is a
//! plain `Vec` of slots with a lock-free free-list on top, since there is
//! no `rte_ring` available outside of DPDK -- the semantic contract (fixed
//! capacity, O(1) acquire/release, no allocation) is what the spec
//! actually requires (§4.1), not the specific ring implementation.

use std::cell::UnsafeCell;

use crossbeam::queue::ArrayQueue;

use crate::core::event::Event;

/// Opaque handle to a pool-backed [`Event`]. Indexes into the pool's fixed
/// backing store; never dereferenced directly by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) u32);

struct Slot(UnsafeCell<Event>);

// Safety: a slot is only ever touched by whichever of {producer, queue,
// executor} currently holds its handle (spec invariant I1); `EventPool`
// never hands out two live handles to the same slot at once.
unsafe impl Sync for Slot {}

pub struct EventPool {
    slots: Box<[Slot]>,
    free: ArrayQueue<u32>,
}

impl EventPool {
    /// Creates a pool with `capacity` preallocated records (spec target:
    /// 262,144).
    pub fn new(capacity: usize) -> Self {
        let slots: Box<[Slot]> = (0..capacity)
            .map(|_| Slot(UnsafeCell::new(Event::empty())))
            .collect();

        let free = ArrayQueue::new(capacity);
        for i in 0..capacity as u32 {
            free.push(i).expect("pool free-list sized to capacity");
        }

        info!(
            "event pool created with {} preallocated records",
            capacity
        );

        Self { slots, free }
    }

    /// Acquires a free record and fills it with `event`. Exhaustion is a
    /// fatal invariant violation (spec §4.1/§7): the pool is sized for
    /// worst-case load, so running out means a producer is misbehaving,
    /// not that backpressure is needed.
    pub fn acquire(&self, event: Event) -> EventHandle {
        let index = self.free.pop().unwrap_or_else(|| {
            error!("event pool exhausted, aborting");
            panic!("event pool exhausted");
        });
        unsafe {
            *self.slots[index as usize].0.get() = event;
        }
        EventHandle(index)
    }

    /// Borrows the record behind `handle`. Safety of this is the same
    /// single-owner discipline as [`EventPool::acquire`]: only the party
    /// that currently holds `handle` may call this.
    pub(crate) fn get(&self, handle: EventHandle) -> &Event {
        unsafe { &*self.slots[handle.0 as usize].0.get() }
    }

    pub(crate) fn get_mut(&self, handle: EventHandle) -> &mut Event {
        unsafe { &mut *self.slots[handle.0 as usize].0.get() }
    }

    /// Returns the record to the pool. Double-release is undefined
    /// behavior per spec §4.1; we do not attempt to detect it.
    pub fn release(&self, handle: EventHandle) {
        self.free
            .push(handle.0)
            .expect("pool free-list cannot overflow its own capacity");
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquire_then_release_round_trips_the_slot() {
        let pool = EventPool::new(4);
        let h = pool.acquire(Event::empty());
        pool.release(h);
        // the slot must be reusable: acquiring `capacity` more times must
        // not exhaust the pool.
        for _ in 0..4 {
            let h = pool.acquire(Event::empty());
            pool.release(h);
        }
    }

    #[test]
    #[should_panic(expected = "event pool exhausted")]
    fn exhaustion_is_fatal() {
        let pool = EventPool::new(1);
        let _h = pool.acquire(Event::empty());
        let _h2 = pool.acquire(Event::empty());
    }
}
