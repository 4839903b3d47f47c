//!
//! core contains the reactor runtime itself: the event pool and queues
//! (C1/C2), the poller ring (C3), the reactor loop (C4), the on-core-only
//! poller protocol (C5), the lifecycle state machine and global runtime
//! (C6), and the timer facility (C7).

mod event;
mod mask;
mod mempool;
mod platform;
mod poller;
mod reactor;
mod timer;

pub mod runtime;

pub use event::{downcast_arg, EventArg, EventFn};
pub use mempool::EventHandle;
pub use platform::{MockPlatform, NativePlatform, Platform, MAX_CORES};
pub use poller::Poller;
pub use timer::TimerId;
