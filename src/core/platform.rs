//! The set of external collaborators the runtime relies on but does not
//! itself implement: which logical cores exist, which one is the master,
//! how to pin a thread to a core and how to join it again.
//!
//! These are grouped behind one [`Platform`] trait so the reactor loop and
//! the lifecycle state machine can be driven from tests without real CPU
//! affinity (see [`MockPlatform`]). [`NativePlatform`] backs the trait with
//! real pinning on Linux, following the same `nix`/`libc` affinity calls
//! and OS thread spawn-and-join approach the reference io-engine uses
//! around its DPDK core enumeration.

use std::{
    cell::Cell,
    thread::JoinHandle,
};

use parking_lot::Mutex;

/// Maximum number of logical cores a mask can address. Chosen to match a
/// `u64` core mask (bit `i` selects core `i`).
pub const MAX_CORES: u32 = 64;

/// External collaborators consumed by the runtime (see spec §6).
///
/// Implementors decide what "enabled" and "pinned" mean; the runtime only
/// relies on the contract: `launch_on_core` starts `f` running on a thread
/// whose `current_core()` reports back `core`, and `wait_all` does not
/// return until every such thread has finished.
pub trait Platform: Send + Sync {
    /// The core the calling thread is presently running on.
    fn current_core(&self) -> u32;

    /// The core `start()` must be called from.
    fn master_core(&self) -> u32;

    /// Whether `core` is an addressable, enabled logical core on this
    /// machine.
    fn is_core_enabled(&self, core: u32) -> bool;

    /// One past the highest core number this platform will ever report as
    /// enabled; bounds iteration in [`for_each_enabled_core`].
    fn core_count_bound(&self) -> u32;

    /// Start `f` running, pinned to `core`. Returns immediately; the
    /// platform tracks the worker so [`Platform::wait_all`] can join it.
    fn launch_on_core(&self, core: u32, f: Box<dyn FnOnce() + Send>);

    /// Pins the calling thread itself to `core`, so that a subsequent
    /// `current_core()` on the same thread reports `core` back. Used by
    /// `Runtime::start()` to bind the master reactor to its core before
    /// running its loop inline on the caller's own thread, the way the
    /// reference io-engine's SPDK env pins its `--master-lcore` thread
    /// during EAL init.
    fn pin_current_thread(&self, core: u32);

    /// Block until every worker started via `launch_on_core` has returned.
    fn wait_all(&self);

    /// Best-effort OS thread name; failures are not reported (spec §4.4).
    fn set_thread_name(&self, name: &str);
}

/// Calls `f(core)` for every core presently enabled on `platform`.
pub fn for_each_enabled_core(platform: &dyn Platform, mut f: impl FnMut(u32)) {
    for core in 0..platform.core_count_bound() {
        if platform.is_core_enabled(core) {
            f(core);
        }
    }
}

/// Like [`for_each_enabled_core`] but skips the master core.
pub fn for_each_enabled_slave(platform: &dyn Platform, mut f: impl FnMut(u32)) {
    let master = platform.master_core();
    for_each_enabled_core(platform, |core| {
        if core != master {
            f(core)
        }
    })
}

/// Real pinning, backed by `sched_setaffinity` and OS threads.
///
/// Cores `0..available_parallelism()` are considered enabled; core 0 is
/// the master core. Thread naming is set at spawn time via
/// [`std::thread::Builder::name`], which on Linux std implements by
/// calling `prctl(PR_SET_NAME, ...)` for us.
pub struct NativePlatform {
    core_count: u32,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl NativePlatform {
    pub fn new() -> Self {
        let core_count = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Self {
            core_count,
            workers: Mutex::new(Vec::new()),
        }
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for NativePlatform {
    fn current_core(&self) -> u32 {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            0
        } else {
            cpu as u32
        }
    }

    fn master_core(&self) -> u32 {
        0
    }

    fn is_core_enabled(&self, core: u32) -> bool {
        core < self.core_count
    }

    fn core_count_bound(&self) -> u32 {
        self.core_count
    }

    fn launch_on_core(&self, core: u32, f: Box<dyn FnOnce() + Send>) {
        let name = format!("reactor {}", core);
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                pin_current_thread(core);
                f();
            })
            .expect("failed to spawn reactor thread");
        self.workers.lock().push(handle);
    }

    fn wait_all(&self) {
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn set_thread_name(&self, name: &str) {
        // `Builder::name` only covers slave reactors spawned through
        // `launch_on_core`; the master reactor's loop runs inline on
        // whatever thread called `start()`, which never goes through the
        // builder, so the rename has to happen here too.
        set_current_thread_name(name);
    }

    fn pin_current_thread(&self, core: u32) {
        pin_current_thread(core);
    }
}

fn pin_current_thread(core: u32) {
    use nix::sched::{sched_setaffinity, CpuSet};
    let mut set = CpuSet::new();
    if set.set(core as usize).is_ok() {
        let _ = sched_setaffinity(nix::unistd::Pid::from_raw(0), &set);
    }
}

/// Renames the calling thread at the OS level via `pthread_setname_np`.
/// Linux caps thread names at 16 bytes including the nul terminator, so
/// the name is truncated to a char boundary at or before 15 bytes.
fn set_current_thread_name(name: &str) {
    let mut end = name.len().min(15);
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    if let Ok(cstr) = std::ffi::CString::new(&name[..end]) {
        unsafe {
            libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
        }
    }
}

thread_local! {
    static MOCK_CURRENT_CORE: Cell<u32> = Cell::new(0);
}

/// A platform with no real CPU affinity: every "core" is an ordinary OS
/// thread, and `current_core()` reads a thread-local the mock sets up
/// itself in [`MockPlatform::launch_on_core`] (and that the caller of
/// `start()` must set via [`MockPlatform::bind_current_thread`]).
///
/// Exists so the reactor loop, event delivery and poller protocol can be
/// exercised deterministically in tests without requiring the host to
/// actually have N distinct CPUs.
pub struct MockPlatform {
    core_count: u32,
    master: u32,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MockPlatform {
    pub fn new(core_count: u32) -> Self {
        Self {
            core_count,
            master: 0,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Binds the calling (real OS) thread to report `core` from
    /// `current_core()`. Used by test harnesses to simulate the master
    /// core identity on the thread that calls `reactors_start()`.
    pub fn bind_current_thread(&self, core: u32) {
        MOCK_CURRENT_CORE.with(|c| c.set(core));
    }
}

impl Platform for MockPlatform {
    fn current_core(&self) -> u32 {
        MOCK_CURRENT_CORE.with(|c| c.get())
    }

    fn master_core(&self) -> u32 {
        self.master
    }

    fn is_core_enabled(&self, core: u32) -> bool {
        core < self.core_count
    }

    fn core_count_bound(&self) -> u32 {
        self.core_count
    }

    fn launch_on_core(&self, core: u32, f: Box<dyn FnOnce() + Send>) {
        let handle = std::thread::Builder::new()
            .name(format!("reactor {}", core))
            .spawn(move || {
                MOCK_CURRENT_CORE.with(|c| c.set(core));
                f();
            })
            .expect("failed to spawn mock reactor thread");
        self.workers.lock().push(handle);
    }

    fn wait_all(&self) {
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    fn set_thread_name(&self, _name: &str) {}

    fn pin_current_thread(&self, core: u32) {
        self.bind_current_thread(core);
    }
}
