//! A minimal program that brings the reactor runtime up, registers one
//! poller per core and a couple of repeating timers, and shuts down on
//! Ctrl-C. Exists to exercise the public API end to end; not itself part
//! of the crate's invariants or testable properties (spec §6).

#[macro_use]
extern crate log;

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
    time::Duration,
};

use structopt::StructOpt;

use reactor_core::core::{runtime, Poller};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "reactor-demo",
    about = "Bring up the reactor runtime and tick a few pollers"
)]
struct Args {
    /// The reactor mask to be used for starting up the instance.
    #[structopt(short = "m", long = "reactor-mask", default_value = "0x1")]
    reactor_mask: String,

    /// Default log level; overridden by RUST_LOG when set.
    #[structopt(short = "L", long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::from_args();
    reactor_core::logger::init(&args.log_level);

    if let Err(e) = runtime::reactors_init(&args.reactor_mask) {
        eprintln!("failed to initialize reactor runtime: {}", e);
        std::process::exit(1);
    }

    let ticks = Arc::new(AtomicUsize::new(0));
    let master = runtime::get_core_mask().trailing_zeros();
    let ticks_for_poller = ticks.clone();
    runtime::poller_register(
        Poller::new("tick-counter", move || {
            ticks_for_poller.fetch_add(1, Ordering::Relaxed);
        }),
        master,
        None,
    );

    runtime::timer_schedule(
        master,
        Duration::from_secs(5),
        None,
        move || {
            info!("ticked {} times so far", ticks.load(Ordering::Relaxed));
            runtime::reactors_stop();
        },
    );

    runtime::reactors_start();
    runtime::reactors_fini().expect("runtime reached Shutdown before fini");
}
