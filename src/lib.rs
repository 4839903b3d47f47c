//! A per-core cooperative reactor runtime for user-space storage and
//! networking stacks.
//!
//! Each enabled logical core runs its own single-threaded event loop
//! (`core::runtime::Runtime::start`): drain queued events, service due
//! timers, advance one poller, repeat. Nothing here is ever mutated from
//! more than one core at a time -- cross-core work is always handed off by
//! posting an event, never by locking shared state. See the crate's
//! design notes for the full invariant list.
//!
//! Capacity violations (a full event pool, a full queue, a full poller
//! ring) and illegal lifecycle transitions are treated as unrecoverable
//! programming errors and abort the process; the only typed, recoverable
//! error is a bad configuration passed to [`core::runtime::reactors_init`].

#[macro_use]
extern crate log;
extern crate snafu;

pub mod core;
pub mod error;
pub mod logger;

pub use error::{Error, Result};
