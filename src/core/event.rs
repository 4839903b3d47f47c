//! Events: one-shot closures targeted at a specific core (spec §3/§4.2).
//!
//! An event is a plain function pointer plus two opaque arguments, mirroring
//! the reference io-engine's `EventFn = extern "C" fn(*mut c_void, *mut
//! c_void)` but replacing the raw `c_void` pointers with a type-erased,
//! `Any`-backed handle so a misused argument fails a downcast instead of
//! corrupting memory (spec §9 redesign notes). Internal uses that do not fit
//! the generic `fn(arg1, arg2)` shape (adding/removing a poller, arming a
//! timer) are carried as their own tagged variants instead of being forced
//! through the opaque-argument path -- see [`EventBody`].

use std::any::Any;

use crossbeam::queue::ArrayQueue;

use crate::core::{
    mempool::EventHandle,
    poller::Poller,
    timer::{TimerEntry, TimerId},
};

/// Type-erased payload carried alongside an event's function pointer.
/// `None` when the event needs no argument in that slot.
pub type EventArg = Option<Box<dyn Any + Send>>;

/// The function invoked when a `Call` event executes.
pub type EventFn = fn(&EventArg, &EventArg);

fn noop(_: &EventArg, _: &EventArg) {}

/// Downcasts an [`EventArg`] to `T`, panicking if it is empty or holds a
/// different type. Event functions use this to recover their typed context.
pub fn downcast_arg<T: 'static>(arg: &EventArg) -> &T {
    arg.as_ref()
        .and_then(|a| a.downcast_ref::<T>())
        .expect("event argument type mismatch")
}

/// What an event does when dispatched. `Call` is the generic, user-facing
/// case; the rest back the on-core-only mutation protocols for pollers
/// (spec §4.5) and timers (spec §4.7) and are never constructed outside
/// this crate.
pub(crate) enum EventBody {
    Call(EventFn, EventArg, EventArg),
    AddPoller(Poller),
    RemovePoller(Poller),
    AddTimer(TimerEntry),
    CancelTimer(TimerId),
}

/// A single-shot, pool-backed closure targeted at a specific core.
///
/// Ownership transfers to the target reactor's queue on enqueue; after
/// that, only the executing reactor may touch it, and only until its
/// function returns, at which point it is released back to the pool
/// (spec invariant I1).
pub struct Event {
    pub(crate) target_core: u32,
    pub(crate) body: EventBody,
    pub(crate) next: Option<EventHandle>,
}

impl Event {
    /// An empty record, used only to seed pool slots before first use.
    pub(crate) fn empty() -> Self {
        Self {
            target_core: 0,
            body: EventBody::Call(noop, None, None),
            next: None,
        }
    }

    pub(crate) fn call(
        target_core: u32,
        func: EventFn,
        arg1: EventArg,
        arg2: EventArg,
        next: Option<EventHandle>,
    ) -> Self {
        Self {
            target_core,
            body: EventBody::Call(func, arg1, arg2),
            next,
        }
    }

    pub(crate) fn internal(target_core: u32, body: EventBody, next: Option<EventHandle>) -> Self {
        Self {
            target_core,
            body,
            next,
        }
    }

    pub fn target_core(&self) -> u32 {
        self.target_core
    }
}

/// The bounded MPSC ring of pending event handles belonging to one reactor
/// (C2). Any thread may enqueue; only the owning reactor dequeues.
pub(crate) struct EventQueue {
    ring: ArrayQueue<EventHandle>,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: ArrayQueue::new(capacity),
        }
    }

    /// Enqueues `handle`. Fatal if the queue is full (spec §4.2/§7: queues
    /// are sized for worst-case load, so a full queue means a producer is
    /// misbehaving, not that backpressure is needed).
    pub(crate) fn enqueue(&self, handle: EventHandle) {
        if self.ring.push(handle).is_err() {
            error!("event queue full, aborting");
            panic!("event queue full");
        }
    }

    pub(crate) fn dequeue(&self) -> Option<EventHandle> {
        self.ring.pop()
    }

    pub(crate) fn count(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn queue_is_fifo_under_single_consumer() {
        let queue = EventQueue::new(4);
        for i in 0..4u32 {
            queue.enqueue(EventHandle(i));
        }
        let mut drained = Vec::new();
        while let Some(EventHandle(i)) = queue.dequeue() {
            drained.push(i);
        }
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "event queue full")]
    fn enqueue_past_capacity_is_fatal() {
        let queue = EventQueue::new(1);
        queue.enqueue(EventHandle(0));
        queue.enqueue(EventHandle(1));
    }
}
