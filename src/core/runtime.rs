//! Runtime lifecycle and global state (C6): the `INVALID -> INITIALIZED ->
//! RUNNING -> EXITING -> SHUTDOWN` state machine, the reactor table, and the
//! event pool every reactor shares (spec §4.6).
//!
//! Mirrors the reference io-engine's `REACTOR_LIST: OnceCell<Reactors>`
//! singleton, but splits the type in two: [`Runtime`] is a plain value that
//! owns everything and can be constructed, driven and dropped directly (used
//! by tests, which need a fresh, fully-isolated instance per test rather
//! than one shared process-wide singleton); the free functions at the
//! bottom of this module layer the spec's implicit-global public API
//! (§6) on top of a single process-wide `Runtime` behind a `OnceCell`, for
//! real callers such as the demo binary.

use std::{
    sync::atomic::{AtomicU8, Ordering},
    time::Instant,
};

use once_cell::sync::OnceCell;

use crate::{
    core::{
        event::{downcast_arg, Event, EventArg, EventBody, EventFn},
        mask,
        mempool::{EventHandle, EventPool},
        platform::{for_each_enabled_core, for_each_enabled_slave, NativePlatform, Platform},
        poller::Poller,
        reactor::Reactor,
        timer::{next_timer_id, TimerEntry, TimerId},
    },
    error::{AlreadyInitialized, Error, FiniBeforeShutdown},
};

/// Lifecycle states, monotone except for the reset a fresh [`Runtime`]
/// value performs by simply not existing yet (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuntimeState {
    Invalid = 0,
    Initialized = 1,
    Running = 2,
    Exiting = 3,
    Shutdown = 4,
}

impl RuntimeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RuntimeState::Invalid,
            1 => RuntimeState::Initialized,
            2 => RuntimeState::Running,
            3 => RuntimeState::Exiting,
            4 => RuntimeState::Shutdown,
            _ => unreachable!("runtime state is only ever written through RuntimeState"),
        }
    }
}

/// Capacities fixed at construction time (spec §4.1/§4.2/§4.3: every pool
/// and ring is sized once, up front, never grown).
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub event_pool_capacity: usize,
    pub event_queue_capacity: usize,
    pub poller_ring_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_pool_capacity: 262_144,
            event_queue_capacity: 65_536,
            poller_ring_capacity: 4_096,
        }
    }
}

/// The runtime: an event pool, a table of reactors (one per enabled core)
/// and the lifecycle state they're all governed by.
pub struct Runtime {
    platform: Box<dyn Platform>,
    event_pool: EventPool,
    reactors: Vec<Reactor>,
    core_mask: u64,
    state: AtomicU8,
}

impl Runtime {
    /// Parses `mask_text` against `platform`, builds one reactor per
    /// enabled core, and returns a runtime in the `Initialized` state
    /// (spec §4.6: this is the `reactors_init` transition).
    pub fn new(
        mask_text: &str,
        platform: Box<dyn Platform>,
        config: RuntimeConfig,
    ) -> Result<Self, Error> {
        let core_mask = mask::parse_and_mask(mask_text, platform.as_ref())?;

        let mut reactors = Vec::new();
        for_each_enabled_core(platform.as_ref(), |core| {
            if core_mask & (1u64 << core) != 0 {
                reactors.push(Reactor::new(
                    core,
                    config.event_queue_capacity,
                    config.poller_ring_capacity,
                ));
            }
        });

        info!(
            "runtime initialized: mask={:#x}, cores={}",
            core_mask,
            reactors.len()
        );

        Ok(Self {
            platform,
            event_pool: EventPool::new(config.event_pool_capacity),
            reactors,
            core_mask,
            state: AtomicU8::new(RuntimeState::Initialized as u8),
        })
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RuntimeState) {
        info!("runtime state -> {:?}", state);
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn core_mask(&self) -> u64 {
        self.core_mask
    }

    pub fn core_count(&self) -> u32 {
        self.reactors.len() as u32
    }

    pub(crate) fn reactor_for_core(&self, core: u32) -> Option<&Reactor> {
        self.reactors.iter().find(|r| r.core_id() == core)
    }

    // -- lifecycle (spec §4.6) --------------------------------------------

    /// Transitions `Initialized -> Running`: launches every slave reactor
    /// on its own platform thread, then runs the master reactor's loop
    /// inline on the calling thread until [`Runtime::stop`] is observed.
    /// Must be called from the platform's master core; any other
    /// precondition violation (wrong state, wrong core) is a fatal abort,
    /// matching the reference io-engine's treatment of illegal reactor
    /// transitions.
    pub fn start(&'static self) {
        if self.state() != RuntimeState::Initialized {
            error!(
                "reactors_start() called while runtime state was {:?}, aborting",
                self.state()
            );
            panic!("illegal runtime transition: start() requires Initialized");
        }

        self.platform.pin_current_thread(self.platform.master_core());
        if self.platform.current_core() != self.platform.master_core() {
            error!("reactors_start() called from a non-master core, aborting");
            panic!("illegal runtime transition: start() must run on the master core");
        }

        self.set_state(RuntimeState::Running);

        for_each_enabled_slave(self.platform.as_ref(), |core| {
            self.platform
                .launch_on_core(core, Box::new(move || self.run_reactor_loop(core)));
        });

        let master = self.platform.master_core();
        self.run_reactor_loop(master);

        self.platform.wait_all();
        self.set_state(RuntimeState::Shutdown);
    }

    /// Requests shutdown: flips the state to `Exiting`, which every
    /// reactor loop observes at the end of its current iteration and
    /// exits on (spec P6: no iteration is aborted mid-flight).
    pub fn stop(&self) {
        if matches!(self.state(), RuntimeState::Running) {
            self.set_state(RuntimeState::Exiting);
        }
    }

    fn run_reactor_loop(&self, core: u32) {
        self.platform.set_thread_name(&format!("reactor {}", core));
        debug!("reactor {} starting", core);
        loop {
            self.poll_once(core);
            if self.state() != RuntimeState::Running {
                break;
            }
        }
        debug!("reactor {} shutting down", core);
    }

    /// One iteration of the cooperative loop (spec §4.3): drain the
    /// events queued as of loop entry, service due timers, advance
    /// exactly one poller.
    fn poll_once(&self, core: u32) {
        let reactor = self
            .reactor_for_core(core)
            .unwrap_or_else(|| panic!("no reactor for core {}", core));

        let entry_state = self.state();
        let pending = reactor.events.count();
        for _ in 0..pending {
            match reactor.events.dequeue() {
                Some(handle) => self.dispatch(reactor, handle),
                None => break,
            }
        }
        if self.state() != entry_state {
            warn!(
                "reactor {} observed a lifecycle change mid-drain ({:?} -> {:?})",
                core,
                entry_state,
                self.state()
            );
        }

        reactor.timers.manage_expired(Instant::now());

        if let Some(poller) = reactor.active_pollers.pop_front() {
            poller.invoke();
            reactor.active_pollers.push_back(poller);
        }
    }

    // -- events (C1/C2, spec §4.1/§4.2) -----------------------------------

    pub fn event_allocate(
        &self,
        target_core: u32,
        func: EventFn,
        arg1: EventArg,
        arg2: EventArg,
        next: Option<EventHandle>,
    ) -> EventHandle {
        self.event_pool
            .acquire(Event::call(target_core, func, arg1, arg2, next))
    }

    /// Enqueues `handle` on its target core's queue.
    pub fn event_call(&self, handle: EventHandle) {
        let target = self.event_pool.get(handle).target_core();
        let reactor = self
            .reactor_for_core(target)
            .unwrap_or_else(|| panic!("no reactor for core {}", target));
        reactor.events.enqueue(handle);
    }

    /// Drains and invokes every event presently queued on `core`,
    /// releasing each to the pool afterward. Exposed for tests and for
    /// callers that want queued work run without spinning a full reactor
    /// loop (spec §6).
    pub fn event_queue_run_all(&self, core: u32) {
        let reactor = self
            .reactor_for_core(core)
            .unwrap_or_else(|| panic!("no reactor for core {}", core));
        let pending = reactor.events.count();
        for _ in 0..pending {
            match reactor.events.dequeue() {
                Some(handle) => self.dispatch(reactor, handle),
                None => break,
            }
        }
    }

    /// Executes `handle`'s body, follows its continuation if any, and
    /// releases it back to the pool. The sole place that knows how to run
    /// every [`EventBody`] variant, since only here do we simultaneously
    /// have the event, the pool and the owning reactor in scope.
    fn dispatch(&self, reactor: &Reactor, handle: EventHandle) {
        let next = {
            let event = self.event_pool.get_mut(handle);
            let body = std::mem::replace(&mut event.body, EventBody::Call(noop_call, None, None));
            match body {
                EventBody::Call(f, a1, a2) => f(&a1, &a2),
                EventBody::AddPoller(poller) => {
                    poller.set_owning_core(reactor.core_id());
                    reactor.active_pollers.push_back(poller);
                }
                EventBody::RemovePoller(poller) => reactor.active_pollers.remove(&poller),
                EventBody::AddTimer(entry) => reactor.timers.insert(entry),
                EventBody::CancelTimer(id) => reactor.timers.cancel(id),
            }
            event.next
        };
        self.event_pool.release(handle);
        if let Some(next) = next {
            self.event_call(next);
        }
    }

    // -- pollers (C3/C5, spec §4.5) ---------------------------------------

    /// Posts an add-poller event to `core`. Runs as part of `complete`'s
    /// continuation chain if given.
    pub fn poller_register(&self, poller: Poller, core: u32, complete: Option<EventHandle>) {
        let handle = self.event_pool.acquire(Event::internal(
            core,
            EventBody::AddPoller(poller),
            complete,
        ));
        self.event_call(handle);
    }

    /// Posts a remove-poller event to the poller's current core. Panics if
    /// the poller was never registered.
    pub fn poller_unregister(&self, poller: Poller, complete: Option<EventHandle>) {
        let core = poller
            .owning_core()
            .expect("poller_unregister called on a poller that was never registered");
        let handle = self.event_pool.acquire(Event::internal(
            core,
            EventBody::RemovePoller(poller),
            complete,
        ));
        self.event_call(handle);
    }

    /// Moves `poller` to `new_core`: an unregister on its current core
    /// whose continuation is the register on `new_core`, so the poller is
    /// never concurrently live on two cores and is never dropped from both
    /// (spec §4.5, S6).
    pub fn poller_migrate(&self, poller: Poller, new_core: u32, complete: Option<EventHandle>) {
        let add = self.event_pool.acquire(Event::internal(
            new_core,
            EventBody::AddPoller(poller.clone()),
            complete,
        ));
        self.poller_unregister(poller, Some(add));
    }

    // -- timers (C7, spec §4.7) --------------------------------------------

    /// Arms a timer on `core`, firing `func` after `delay` and, if
    /// `period` is given, every `period` thereafter. Returns immediately
    /// with a handle usable from any core; the heap mutation itself runs
    /// as an on-core event (I6).
    pub fn timer_schedule(
        &self,
        core: u32,
        delay: std::time::Duration,
        period: Option<std::time::Duration>,
        func: impl FnMut() + Send + 'static,
    ) -> TimerId {
        let id = next_timer_id();
        let entry = TimerEntry {
            id,
            deadline: Instant::now() + delay,
            period,
            func: Box::new(func),
        };
        let handle =
            self.event_pool
                .acquire(Event::internal(core, EventBody::AddTimer(entry), None));
        self.event_call(handle);
        id
    }

    /// Cancels a previously scheduled timer. A no-op if it already fired
    /// (one-shot) or was already cancelled.
    pub fn timer_cancel(&self, core: u32, id: TimerId) {
        let handle =
            self.event_pool
                .acquire(Event::internal(core, EventBody::CancelTimer(id), None));
        self.event_call(handle);
    }
}

fn noop_call(_: &EventArg, _: &EventArg) {}

// -- the process-wide singleton, for the spec's implicit-global API ------

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn global() -> &'static Runtime {
    RUNTIME
        .get()
        .expect("reactors_init() must be called before using the reactor API")
}

/// `reactors_init` (spec §4.6): builds the process-wide runtime from
/// `mask_text` using [`NativePlatform`] and default capacities. May only be
/// called once per process; a second call is an illegal transition.
pub fn reactors_init(mask_text: &str) -> Result<(), Error> {
    if let Some(existing) = RUNTIME.get() {
        return AlreadyInitialized {
            state: existing.state(),
        }
        .fail();
    }
    let runtime = Runtime::new(
        mask_text,
        Box::new(NativePlatform::new()),
        RuntimeConfig::default(),
    )?;
    let _ = RUNTIME.set(runtime);
    Ok(())
}

pub fn reactors_start() {
    global().start();
}

pub fn reactors_stop() {
    global().stop();
}

/// `reactors_fini` (spec §4.6): asserts the runtime has reached
/// `Shutdown`. The global runtime itself is not released -- like the
/// reference io-engine's own `REACTOR_LIST`, it lives for the remainder of
/// the process; a fully-released `Runtime` is only needed by, and only
/// available to, code that constructs one directly via [`Runtime::new`].
pub fn reactors_fini() -> Result<(), Error> {
    let state = global().state();
    if state != RuntimeState::Shutdown {
        return FiniBeforeShutdown { state }.fail();
    }
    info!("runtime finalized");
    Ok(())
}

pub fn runtime_state() -> RuntimeState {
    match RUNTIME.get() {
        Some(rt) => rt.state(),
        None => RuntimeState::Invalid,
    }
}

pub fn get_core_count() -> u32 {
    global().core_count()
}

pub fn get_core_mask() -> u64 {
    global().core_mask()
}

pub fn event_allocate(
    target_core: u32,
    func: EventFn,
    arg1: EventArg,
    arg2: EventArg,
    next: Option<EventHandle>,
) -> EventHandle {
    global().event_allocate(target_core, func, arg1, arg2, next)
}

pub fn event_call(handle: EventHandle) {
    global().event_call(handle)
}

pub fn event_queue_run_all(core: u32) {
    global().event_queue_run_all(core)
}

pub fn poller_register(poller: Poller, core: u32, complete: Option<EventHandle>) {
    global().poller_register(poller, core, complete)
}

pub fn poller_unregister(poller: Poller, complete: Option<EventHandle>) {
    global().poller_unregister(poller, complete)
}

pub fn poller_migrate(poller: Poller, new_core: u32, complete: Option<EventHandle>) {
    global().poller_migrate(poller, new_core, complete)
}

pub fn timer_schedule(
    core: u32,
    delay: std::time::Duration,
    period: Option<std::time::Duration>,
    func: impl FnMut() + Send + 'static,
) -> TimerId {
    global().timer_schedule(core, delay, period, func)
}

pub fn timer_cancel(core: u32, id: TimerId) {
    global().timer_cancel(core, id)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::platform::MockPlatform;
    use std::sync::{
        atomic::{AtomicUsize, Ordering as AO},
        Arc,
    };

    fn test_runtime(core_count: u32) -> Runtime {
        Runtime::new(
            "0x1",
            Box::new(MockPlatform::new(core_count)),
            RuntimeConfig {
                event_pool_capacity: 64,
                event_queue_capacity: 16,
                poller_ring_capacity: 16,
            },
        )
        .unwrap()
    }

    fn bump(arg1: &EventArg, _arg2: &EventArg) {
        let counter: &Arc<AtomicUsize> = downcast_arg(arg1);
        counter.fetch_add(1, AO::SeqCst);
    }

    #[test]
    fn new_runtime_starts_initialized() {
        let rt = test_runtime(1);
        assert_eq!(rt.state(), RuntimeState::Initialized);
        assert_eq!(rt.core_count(), 1);
    }

    #[test]
    fn event_allocate_call_and_drain_runs_the_function() {
        let rt = test_runtime(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = rt.event_allocate(0, bump, Some(Box::new(counter.clone())), None, None);
        rt.event_call(handle);
        rt.event_queue_run_all(0);
        assert_eq!(counter.load(AO::SeqCst), 1);
    }

    #[test]
    fn continuation_chain_runs_in_order() {
        let rt = test_runtime(1);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        fn record(arg1: &EventArg, _arg2: &EventArg) {
            let (order, tag): &(Arc<parking_lot::Mutex<Vec<u32>>>, u32) = downcast_arg(arg1);
            order.lock().push(*tag);
        }

        let second = rt.event_allocate(0, record, Some(Box::new((order.clone(), 2))), None, None);
        let first = rt.event_allocate(
            0,
            record,
            Some(Box::new((order.clone(), 1))),
            None,
            Some(second),
        );
        rt.event_call(first);
        rt.event_queue_run_all(0);

        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn poller_register_then_unregister_round_trips() {
        let rt = test_runtime(1);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks2 = ticks.clone();
        let poller = Poller::new("ticker", move || {
            ticks2.fetch_add(1, AO::SeqCst);
        });

        rt.poller_register(poller.clone(), 0, None);
        rt.event_queue_run_all(0);
        assert_eq!(poller.owning_core(), Some(0));

        rt.poll_once(0);
        rt.poll_once(0);
        assert_eq!(ticks.load(AO::SeqCst), 2);

        rt.poller_unregister(poller.clone(), None);
        rt.event_queue_run_all(0);
        rt.poll_once(0);
        assert_eq!(ticks.load(AO::SeqCst), 2);
    }

    /// Covers P6/S6: at no instant does a migrating poller appear in both
    /// the old and the new core's ring. `poller_migrate` posts an
    /// unregister on the old core whose continuation is the register on
    /// the new core (§4.5), so draining only the old core's queue must
    /// remove the poller there without yet adding it anywhere, and only
    /// draining the new core's queue afterwards must make it appear there.
    #[test]
    fn migrate_is_never_observed_live_on_two_rings() {
        let rt = Runtime::new(
            "0x3",
            Box::new(MockPlatform::new(2)),
            RuntimeConfig {
                event_pool_capacity: 64,
                event_queue_capacity: 16,
                poller_ring_capacity: 16,
            },
        )
        .unwrap();

        let poller = Poller::new("migratory", || {});
        rt.poller_register(poller.clone(), 0, None);
        rt.event_queue_run_all(0);
        assert_eq!(poller.owning_core(), Some(0));
        assert!(rt.reactor_for_core(0).unwrap().active_pollers.contains(&poller));

        rt.poller_migrate(poller.clone(), 1, None);

        // draining the old core removes the poller from its ring and
        // dispatches the add-poller continuation to core 1, but that event
        // has not run yet: the poller must be in neither ring right now.
        rt.event_queue_run_all(0);
        assert!(!rt.reactor_for_core(0).unwrap().active_pollers.contains(&poller));
        assert!(!rt.reactor_for_core(1).unwrap().active_pollers.contains(&poller));

        // draining the new core runs the add-poller event and completes
        // the migration.
        rt.event_queue_run_all(1);
        assert!(!rt.reactor_for_core(0).unwrap().active_pollers.contains(&poller));
        assert!(rt.reactor_for_core(1).unwrap().active_pollers.contains(&poller));
        assert_eq!(poller.owning_core(), Some(1));
    }

    #[test]
    fn timer_schedule_fires_through_poll_once() {
        let rt = test_runtime(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        rt.timer_schedule(0, std::time::Duration::from_secs(0), None, move || {
            fired2.fetch_add(1, AO::SeqCst);
        });

        // the AddTimer event itself must be drained before the timer can
        // be observed as due.
        rt.event_queue_run_all(0);
        rt.poll_once(0);

        assert_eq!(fired.load(AO::SeqCst), 1);
    }

    #[test]
    fn timer_cancel_before_it_fires_suppresses_it() {
        let rt = test_runtime(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let id = rt.timer_schedule(0, std::time::Duration::from_secs(0), None, move || {
            fired2.fetch_add(1, AO::SeqCst);
        });
        rt.timer_cancel(0, id);

        rt.event_queue_run_all(0);
        rt.poll_once(0);

        assert_eq!(fired.load(AO::SeqCst), 0);
    }
}
