//! The single back-reference to the process host.

use crate::host::ProcessHost;
use parking_lot::Mutex;
use std::sync::Arc;

/// Process-wide slot used by the C ABI trampolines.
static GLOBAL_PEER: PeerSlot = PeerSlot::new();

/// The slot consulted by the registered provider interface.
pub fn global_peer() -> &'static PeerSlot {
    &GLOBAL_PEER
}

/// Holds at most one host between `init` and `shut`.
///
/// The host is cloned out under the lock and invoked outside it, so a
/// callback running on an engine thread never blocks `init` or `shut`.
pub struct PeerSlot {
    inner: Mutex<Option<Arc<dyn ProcessHost>>>,
}

impl PeerSlot {
    /// Create an empty slot.
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::const_mutex(None),
        }
    }

    /// Store `host` unless a host is already present.
    ///
    /// Returns `true` if the slot was empty.
    pub fn install(&self, host: Arc<dyn ProcessHost>) -> bool {
        self.install_with(|| Some(host))
    }

    /// Build and store a host only if the slot is empty.
    ///
    /// `make` is not called when a host is already installed. Returns `true`
    /// if a new host was stored.
    pub fn install_with<F>(&self, make: F) -> bool
    where
        F: FnOnce() -> Option<Arc<dyn ProcessHost>>,
    {
        let mut slot = self.inner.lock();
        if slot.is_some() {
            return false;
        }
        *slot = make();
        slot.is_some()
    }

    /// Take the host out, leaving the slot empty.
    pub fn clear(&self) -> Option<Arc<dyn ProcessHost>> {
        self.inner.lock().take()
    }

    /// Current host, if any.
    pub fn get(&self) -> Option<Arc<dyn ProcessHost>> {
        self.inner.lock().clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl Default for PeerSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use crate::kind::ProcessKind;
    use std::os::fd::RawFd;

    struct NamedHost;

    impl ProcessHost for NamedHost {
        fn launch_process(&self, _: u64, _: ProcessKind, _: RawFd) -> Result<(), HostError> {
            Ok(())
        }

        fn terminate_process(&self, _: u64) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn test_second_install_keeps_first() {
        let slot = PeerSlot::new();
        let first: Arc<dyn ProcessHost> = Arc::new(NamedHost);

        assert!(slot.install(first.clone()));
        assert!(!slot.install(Arc::new(NamedHost)));

        let current = slot.get().unwrap();
        assert!(Arc::ptr_eq(&current, &first));
    }

    #[test]
    fn test_install_with_skips_factory_when_set() {
        let slot = PeerSlot::new();
        assert!(slot.install(Arc::new(NamedHost)));

        let mut called = false;
        let stored = slot.install_with(|| {
            called = true;
            None
        });

        assert!(!stored);
        assert!(!called);
    }

    #[test]
    fn test_clear_resets() {
        let slot = PeerSlot::new();
        assert!(!slot.is_set());

        slot.install(Arc::new(NamedHost));
        assert!(slot.is_set());

        assert!(slot.clear().is_some());
        assert!(!slot.is_set());
        assert!(slot.clear().is_none());

        // Can be set again after a shut
        assert!(slot.install(Arc::new(NamedHost)));
    }

    #[test]
    fn test_failed_factory_leaves_slot_empty() {
        let slot = PeerSlot::new();
        assert!(!slot.install_with(|| None));
        assert!(!slot.is_set());
    }
}
