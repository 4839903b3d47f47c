//! Typed errors for the recoverable failure classes in this crate: bad
//! mask configuration reported by
//! [`crate::core::runtime::reactors_init`], and the handful of lifecycle
//! preconditions (double init, fini before shutdown) that a caller can
//! reasonably get wrong and recover from.
//!
//! Everything else -- capacity exhaustion, a reactor thread observing an
//! illegal state transition, a panicking poller or event -- is fatal by
//! design (see the crate's top level documentation) and is not
//! represented here.

use snafu::Snafu;

use crate::core::runtime::RuntimeState;

#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum Error {
    #[snafu(display("invalid core mask '{}': {}", mask, source))]
    InvalidMask {
        mask: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("core mask '{}' overflows a 64-bit mask", mask))]
    MaskOverflow { mask: String },

    #[snafu(display(
        "master core {} is not enabled after masking against {:#x}",
        core,
        mask
    ))]
    MasterCoreDisabled { core: u32, mask: u64 },

    #[snafu(display(
        "reactors_init() called while runtime state was already {:?}",
        state
    ))]
    AlreadyInitialized { state: RuntimeState },

    #[snafu(display(
        "reactors_fini() called while runtime state was {:?}, expected Shutdown",
        state
    ))]
    FiniBeforeShutdown { state: RuntimeState },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
