//! Covers S6: migrating a poller moves it atomically from one reactor's
//! ring to another's.
//!
// This test requires the system to have at least 2 cpus.

use std::{thread, time::Duration};

use reactor_core::core::{runtime, Poller};

#[test]
fn migrated_poller_ends_up_owned_by_its_new_core() {
    runtime::reactors_init("0x3").expect("host has at least 2 cpus");
    assert_eq!(runtime::get_core_count(), 2);

    let poller = Poller::new("migratory", || {});
    runtime::poller_register(poller.clone(), 0, None);

    let migrated = poller.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        assert_eq!(migrated.owning_core(), Some(0));

        runtime::poller_migrate(migrated.clone(), 1, None);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(migrated.owning_core(), Some(1));

        runtime::reactors_stop();
    });

    runtime::reactors_start();
    runtime::reactors_fini().expect("runtime reached Shutdown");
}
