//! Global registration with libwpe.
//!
//! libwpe keeps one process-wide provider interface. On Android the table is
//! handed to `wpe_process_provider_register_interface`; elsewhere it is kept
//! in a local slot so embedders and tests can read it back.

use crate::provider::ProcessProviderInterface;
use parking_lot::Mutex;
use tracing::info;

#[cfg(target_os = "android")]
#[link(name = "wpe-1.0")]
unsafe extern "C" {
    fn wpe_process_provider_register_interface(interface: *const ProcessProviderInterface);
}

static REGISTERED: Mutex<Option<&'static ProcessProviderInterface>> = parking_lot::const_mutex(None);

/// Make `interface` the engine's process provider.
///
/// A later call replaces the earlier registration, as libwpe does.
pub fn register_process_provider(interface: &'static ProcessProviderInterface) {
    register_with_libwpe(interface);
    *REGISTERED.lock() = Some(interface);
    info!("Registered process provider interface");
}

#[cfg(target_os = "android")]
fn register_with_libwpe(interface: &'static ProcessProviderInterface) {
    // SAFETY: the table is 'static and libwpe only reads it.
    unsafe { wpe_process_provider_register_interface(interface) }
}

#[cfg(not(target_os = "android"))]
fn register_with_libwpe(_interface: &'static ProcessProviderInterface) {}

/// The interface last passed to [`register_process_provider`].
pub fn registered_interface() -> Option<&'static ProcessProviderInterface> {
    *REGISTERED.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::process_provider_interface;
    use serial_test::serial;
    use std::ptr;

    #[test]
    #[serial]
    fn test_register_records_interface() {
        let iface = process_provider_interface();
        register_process_provider(iface);

        let registered = registered_interface().unwrap();
        assert!(ptr::eq(registered, iface));
        assert!(registered.create.is_some());
        assert!(registered.terminate.is_some());
        assert!(registered._wpe_reserved1.is_none());
    }
}
