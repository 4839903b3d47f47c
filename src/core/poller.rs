//! Pollers: long-lived functions re-invoked round-robin by their owning
//! reactor (spec §3/§4.3). Structural mutation of the ring they live in is
//! never locked -- see [`crate::core::runtime::Runtime::poller_register`]
//! and friends, which funnel every mutation through an event executed on
//! the owning core (spec §4.5).

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

/// Sentinel meaning "not yet registered anywhere".
const NO_CORE: u32 = u32::MAX;

struct PollerInner {
    func: RefCell<Box<dyn FnMut() + Send>>,
    owning_core: AtomicU32,
    name: String,
}

// Safety: `func` is only ever invoked from the reactor that currently owns
// this poller (spec I4, extended to pollers); `owning_core` is only
// written from on-core code via `set_owning_core`.
unsafe impl Sync for PollerInner {}

/// A cheaply-clonable handle to a registered poller. Identity (not
/// content) is what matters for ring membership, so equality is
/// `Arc::ptr_eq`.
#[derive(Clone)]
pub struct Poller(Arc<PollerInner>);

impl Poller {
    /// Creates a poller. It is inert until passed to
    /// [`crate::core::runtime::Runtime::poller_register`].
    pub fn new(name: impl Into<String>, func: impl FnMut() + Send + 'static) -> Self {
        Self(Arc::new(PollerInner {
            func: RefCell::new(Box::new(func)),
            owning_core: AtomicU32::new(NO_CORE),
            name: name.into(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The core this poller's active-poller ring presently lives on, or
    /// `None` if it has never been registered (or is mid-migration).
    pub fn owning_core(&self) -> Option<u32> {
        match self.0.owning_core.load(Ordering::Relaxed) {
            NO_CORE => None,
            core => Some(core),
        }
    }

    pub(crate) fn set_owning_core(&self, core: u32) {
        self.0.owning_core.store(core, Ordering::Relaxed);
    }

    pub(crate) fn invoke(&self) {
        (self.0.func.borrow_mut())();
    }
}

impl PartialEq for Poller {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Poller {}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("name", &self.0.name)
            .field("owning_core", &self.owning_core())
            .finish()
    }
}

/// The bounded SPSC ring of poller handles belonging to one reactor (C3).
/// Producer and consumer are both the owning reactor; nothing outside
/// [`crate::core::runtime`] ever touches this directly.
pub(crate) struct PollerRing {
    ring: RefCell<VecDeque<Poller>>,
    capacity: usize,
}

// Safety: only ever touched from the reactor thread that owns it (I3/I4).
unsafe impl Sync for PollerRing {}

impl PollerRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn push_back(&self, poller: Poller) {
        let mut ring = self.ring.borrow_mut();
        if ring.len() >= self.capacity {
            error!("active poller ring full, aborting");
            panic!("active poller ring full");
        }
        ring.push_back(poller);
    }

    pub(crate) fn pop_front(&self) -> Option<Poller> {
        self.ring.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.borrow().len()
    }

    pub(crate) fn contains(&self, poller: &Poller) -> bool {
        self.ring.borrow().iter().any(|p| p == poller)
    }

    /// Rotates the whole ring exactly once, dropping the single physical
    /// occurrence of `target` if present. The loop count is fixed at entry
    /// so a dropped element is never visited twice and survivor order is
    /// preserved (spec §4.5, P5).
    pub(crate) fn remove(&self, target: &Poller) {
        let n = self.len();
        for _ in 0..n {
            let poller = self
                .pop_front()
                .expect("count snapshotted at entry, ring cannot underrun");
            if &poller != target {
                self.push_back(poller);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn remove_preserves_order_of_survivors() {
        let ring = PollerRing::new(8);
        let pollers: Vec<Poller> = (0..5)
            .map(|i| Poller::new(format!("p{}", i), || {}))
            .collect();
        for p in &pollers {
            ring.push_back(p.clone());
        }

        ring.remove(&pollers[2]);

        let mut order = Vec::new();
        for _ in 0..ring.len() {
            let p = ring.pop_front().unwrap();
            order.push(p.name().to_string());
            ring.push_back(p);
        }
        assert_eq!(order, vec!["p0", "p1", "p3", "p4"]);
    }

    #[test]
    fn remove_absent_poller_is_a_no_op() {
        let ring = PollerRing::new(4);
        let a = Poller::new("a", || {});
        let b = Poller::new("b", || {});
        ring.push_back(a.clone());
        ring.remove(&b);
        assert_eq!(ring.len(), 1);
        assert!(ring.contains(&a));
    }
}
