//! The per-core reactor (C4): one cooperative loop per enabled core,
//! draining its event queue, servicing due timers, then advancing exactly
//! one poller before checking whether the runtime is still running (spec
//! §4.3). The loop body itself lives on [`crate::core::runtime::Runtime`],
//! which is the only thing with simultaneous access to the event pool, the
//! reactor table and a given reactor's queue/ring/heap; this module only
//! holds the per-core state those methods operate on.

use crate::core::{event::EventQueue, poller::PollerRing, timer::TimerHeap};

pub(crate) struct Reactor {
    core_id: u32,
    pub(crate) events: EventQueue,
    pub(crate) active_pollers: PollerRing,
    pub(crate) timers: TimerHeap,
}

impl Reactor {
    pub(crate) fn new(core_id: u32, queue_capacity: usize, poller_capacity: usize) -> Self {
        Self {
            core_id,
            events: EventQueue::new(queue_capacity),
            active_pollers: PollerRing::new(poller_capacity),
            timers: TimerHeap::new(),
        }
    }

    pub fn core_id(&self) -> u32 {
        self.core_id
    }
}
