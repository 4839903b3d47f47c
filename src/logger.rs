//! Logger initialization.
//!
//! The loglevel passed to [`init`] is only the default; `RUST_LOG`, when
//! set, always wins. i.e. `RUST_LOG=reactor_core=trace` prints all
//! trace!() and higher messages to the console.

use std::{io::Write, path::Path};

use env_logger::{Builder, Env};

/// Configure the global logger. Safe to call more than once; later calls
/// are no-ops because `env_logger::Builder::init` already guards against
/// double initialization via the `log` crate's global logger slot.
pub fn init(level: &str) {
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(level.to_string()));

    builder.format(|buf, record| {
        let mut level_style = buf.default_level_style(record.level());
        level_style.set_intense(true);
        writeln!(
            buf,
            "[{} {} {}:{}] {}",
            buf.timestamp_nanos(),
            level_style.value(record.level()),
            record
                .file()
                .and_then(|f| Path::new(f).file_name())
                .and_then(|f| f.to_str())
                .unwrap_or("?"),
            record.line().unwrap_or(0),
            record.args()
        )
    });
    let _ = builder.try_init();
}
