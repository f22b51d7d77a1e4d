//! Process-provider adapter.
//!
//! [`ProcessProvider`] holds the launch/terminate policy; the `extern "C"`
//! trampolines below expose it to libwpe through
//! [`ProcessProviderInterface`]. The trampolines never unwind into the
//! engine.

use crate::host::HostError;
use crate::kind::WpeProcessType;
use crate::options::{LaunchError, LaunchOptions, LaunchRequest};
use crate::peer::{PeerSlot, global_peer};
use std::any::Any;
use std::ffi::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Returned by `launch` when the request was rejected before any host call.
pub const LAUNCH_REJECTED: i32 = -1;

/// Returned by `launch` once a host call was attempted, whatever its outcome.
pub const LAUNCH_ACCEPTED: i32 = 0;

/// Opaque `struct wpe_process_provider` owned by libwpe.
#[repr(C)]
pub struct WpeProcessProvider {
    _private: [u8; 0],
}

/// Per-provider state handed back to libwpe by `create`.
///
/// The wrapped engine pointer is only stored, never dereferenced.
#[derive(Debug)]
pub struct ProviderContext {
    provider: *mut WpeProcessProvider,
}

impl ProviderContext {
    pub fn new(provider: *mut WpeProcessProvider) -> Self {
        Self { provider }
    }

    /// The engine-side provider this context was created for.
    pub fn provider(&self) -> *mut WpeProcessProvider {
        self.provider
    }
}

/// Launch/terminate policy over a [`PeerSlot`].
pub struct ProcessProvider<'a> {
    peer: &'a PeerSlot,
}

impl ProcessProvider<'static> {
    /// Provider backed by the process-wide peer slot.
    pub fn global() -> Self {
        Self::with_slot(global_peer())
    }
}

impl<'a> ProcessProvider<'a> {
    /// Provider backed by an explicit slot.
    pub fn with_slot(peer: &'a PeerSlot) -> Self {
        Self { peer }
    }

    /// Validate a launch and forward it to the host.
    ///
    /// Returns [`LAUNCH_REJECTED`] for malformed options or an unsupported
    /// process type, without touching the host. Otherwise returns
    /// [`LAUNCH_ACCEPTED`], even if the host call fails.
    pub fn launch(
        &self,
        process_type: WpeProcessType,
        options: Result<LaunchOptions, LaunchError>,
    ) -> i32 {
        // Reject before touching the host
        let request = match options.and_then(|options| LaunchRequest::new(process_type, options)) {
            Ok(request) => request,
            Err(e) => {
                error!("Cannot launch process ({})", e);
                return LAUNCH_REJECTED;
            }
        };

        debug!(
            "launchProcess - pid: {}, processType: {}, fd: {}",
            request.pid, request.kind, request.fd
        );

        // From here on the request counts as accepted
        let result = match self.peer.get() {
            Some(host) => host.launch_process(request.pid, request.kind, request.fd),
            None => Err(HostError::PeerGone),
        };
        if let Err(e) = result {
            error!("Cannot launch process ({})", e);
        }

        LAUNCH_ACCEPTED
    }

    /// [`launch`](Self::launch) with string arguments; `None` stands for a
    /// null options pointer.
    pub fn launch_args(&self, process_type: WpeProcessType, args: Option<&[&str]>) -> i32 {
        let options = args
            .ok_or(LaunchError::NullOptions)
            .and_then(LaunchOptions::parse);
        self.launch(process_type, options)
    }

    /// Forward a terminate request to the host. Failures are logged only.
    pub fn terminate(&self, pid: i32) {
        // Widened the way the C side does it: sign-extend then reinterpret.
        let pid = i64::from(pid) as u64;
        debug!("terminateProcess - pid: {}", pid);

        let result = match self.peer.get() {
            Some(host) => host.terminate_process(pid),
            None => Err(HostError::PeerGone),
        };
        if let Err(e) = result {
            error!("Cannot terminate process ({})", e);
        }
    }
}

/// `struct wpe_process_provider_interface`.
#[repr(C)]
pub struct ProcessProviderInterface {
    pub create: Option<unsafe extern "C" fn(*mut WpeProcessProvider) -> *mut c_void>,
    pub destroy: Option<unsafe extern "C" fn(*mut c_void)>,
    pub launch: Option<unsafe extern "C" fn(*mut c_void, WpeProcessType, *mut c_void) -> i32>,
    pub terminate: Option<unsafe extern "C" fn(*mut c_void, i32)>,
    pub _wpe_reserved1: Option<unsafe extern "C" fn()>,
    pub _wpe_reserved2: Option<unsafe extern "C" fn()>,
    pub _wpe_reserved3: Option<unsafe extern "C" fn()>,
}

static PROCESS_PROVIDER_INTERFACE: ProcessProviderInterface = ProcessProviderInterface {
    create: Some(create_process_provider),
    destroy: Some(destroy_process_provider),
    launch: Some(launch_process),
    terminate: Some(terminate_process),
    _wpe_reserved1: None,
    _wpe_reserved2: None,
    _wpe_reserved3: None,
};

/// The interface table backed by [`global_peer`].
pub fn process_provider_interface() -> &'static ProcessProviderInterface {
    &PROCESS_PROVIDER_INTERFACE
}

unsafe extern "C" fn create_process_provider(provider: *mut WpeProcessProvider) -> *mut c_void {
    debug!("createProcessProvider({:p})", provider);
    Box::into_raw(Box::new(ProviderContext::new(provider))).cast()
}

unsafe extern "C" fn destroy_process_provider(data: *mut c_void) {
    if data.is_null() {
        debug!("destroyProcessProvider(null)");
        return;
    }
    // SAFETY: non-null `data` was produced by `create_process_provider` and
    // libwpe destroys each context exactly once.
    let context = unsafe { Box::from_raw(data.cast::<ProviderContext>()) };
    debug!("destroyProcessProvider({:p})", context.provider());
}

unsafe extern "C" fn launch_process(
    data: *mut c_void,
    process_type: WpeProcessType,
    options: *mut c_void,
) -> i32 {
    if data.is_null() {
        warn!("Cannot launch process ({})", LaunchError::NullContext);
        return LAUNCH_REJECTED;
    }

    // Parse the argv before entering the panic boundary
    // SAFETY: libwpe passes the launch argv (or null) as `options`.
    let options = unsafe { LaunchOptions::from_argv(options.cast::<*const c_char>().cast_const()) };

    panic::catch_unwind(AssertUnwindSafe(|| {
        ProcessProvider::global().launch(process_type, options)
    }))
    .unwrap_or_else(|payload| {
        error!("Cannot launch process (panicked: {})", panic_message(payload.as_ref()));
        LAUNCH_ACCEPTED
    })
}

unsafe extern "C" fn terminate_process(data: *mut c_void, pid: i32) {
    if data.is_null() {
        return;
    }

    if let Err(payload) =
        panic::catch_unwind(AssertUnwindSafe(|| ProcessProvider::global().terminate(pid)))
    {
        error!("Cannot terminate process (panicked: {})", panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ProcessHost;
    use crate::kind::ProcessKind;
    use parking_lot::Mutex;
    use serial_test::serial;
    use std::ffi::CString;
    use std::os::fd::RawFd;
    use std::ptr;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Launch(u64, ProcessKind, RawFd),
        Terminate(u64),
    }

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<Call>>,
        fail_with: Option<HostError>,
        panic: bool,
    }

    impl RecordingHost {
        fn failing(err: HostError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn outcome(&self) -> Result<(), HostError> {
            if self.panic {
                panic!("host blew up");
            }
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    impl ProcessHost for RecordingHost {
        fn launch_process(&self, pid: u64, kind: ProcessKind, fd: RawFd) -> Result<(), HostError> {
            self.calls.lock().push(Call::Launch(pid, kind, fd));
            self.outcome()
        }

        fn terminate_process(&self, pid: u64) -> Result<(), HostError> {
            self.calls.lock().push(Call::Terminate(pid));
            self.outcome()
        }
    }

    fn provider_with(host: &Arc<RecordingHost>) -> PeerSlot {
        let slot = PeerSlot::new();
        slot.install(host.clone());
        slot
    }

    #[test]
    fn test_valid_launch_reaches_host() {
        let host = Arc::new(RecordingHost::default());
        let slot = provider_with(&host);
        let provider = ProcessProvider::with_slot(&slot);

        let status = provider.launch_args(WpeProcessType::WEB, Some(&["1234", "7"]));

        assert_eq!(status, LAUNCH_ACCEPTED);
        assert_eq!(host.calls(), vec![Call::Launch(1234, ProcessKind::Web, 7)]);
    }

    #[test]
    fn test_malformed_options_rejected_without_call() {
        let host = Arc::new(RecordingHost::default());
        let slot = provider_with(&host);
        let provider = ProcessProvider::with_slot(&slot);

        let cases: [Option<&[&str]>; 5] = [
            None,
            Some(&["1234"]),
            Some(&["1234", "7", "9"]),
            Some(&["pid", "7"]),
            Some(&["1234", "fd"]),
        ];
        for args in cases {
            assert_eq!(
                provider.launch_args(WpeProcessType::WEB, args),
                LAUNCH_REJECTED,
                "args: {:?}",
                args
            );
        }

        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_unsupported_kind_rejected_without_call() {
        let host = Arc::new(RecordingHost::default());
        let slot = provider_with(&host);
        let provider = ProcessProvider::with_slot(&slot);

        for kind in [WpeProcessType::GPU, WpeProcessType::WEB_AUTHN, WpeProcessType(42)] {
            assert_eq!(
                provider.launch_args(kind, Some(&["1234", "7"])),
                LAUNCH_REJECTED
            );
        }

        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_launch_without_peer_is_accepted() {
        let slot = PeerSlot::new();
        let provider = ProcessProvider::with_slot(&slot);

        assert_eq!(
            provider.launch_args(WpeProcessType::WEB, Some(&["1234", "7"])),
            LAUNCH_ACCEPTED
        );
    }

    #[test]
    fn test_host_failures_still_accepted() {
        for err in [
            HostError::PeerGone,
            HostError::MethodMissing("launchProcess"),
            HostError::Exception("java.lang.IllegalStateException".into()),
            HostError::Environment("thread attach failed".into()),
        ] {
            let host = Arc::new(RecordingHost::failing(err));
            let slot = provider_with(&host);
            let provider = ProcessProvider::with_slot(&slot);

            assert_eq!(
                provider.launch_args(WpeProcessType::NETWORK, Some(&["5", "9"])),
                LAUNCH_ACCEPTED
            );
            assert_eq!(host.calls(), vec![Call::Launch(5, ProcessKind::Network, 9)]);
        }
    }

    #[test]
    fn test_after_shut_behaves_as_no_peer() {
        let host = Arc::new(RecordingHost::default());
        let slot = provider_with(&host);
        let provider = ProcessProvider::with_slot(&slot);

        slot.clear();

        assert_eq!(
            provider.launch_args(WpeProcessType::WEB, Some(&["1", "2"])),
            LAUNCH_ACCEPTED
        );
        provider.terminate(1);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_terminate_widens_pid() {
        let host = Arc::new(RecordingHost::default());
        let slot = provider_with(&host);
        let provider = ProcessProvider::with_slot(&slot);

        provider.terminate(42);
        provider.terminate(-1);

        assert_eq!(
            host.calls(),
            vec![Call::Terminate(42), Call::Terminate(u64::MAX)]
        );
    }

    #[test]
    fn test_create_destroy_round_trip() {
        let iface = process_provider_interface();
        let create = iface.create.unwrap();
        let destroy = iface.destroy.unwrap();

        let ctx = unsafe { create(ptr::null_mut()) };
        assert!(!ctx.is_null());
        let provider = unsafe { &*ctx.cast::<ProviderContext>() }.provider();
        assert!(provider.is_null());

        unsafe { destroy(ctx) };
        unsafe { destroy(ptr::null_mut()) };
    }

    #[test]
    #[serial]
    fn test_trampoline_rejects_null_context_and_options() {
        let iface = process_provider_interface();
        let launch = iface.launch.unwrap();
        let pid = CString::new("1234").unwrap();
        let fd = CString::new("7").unwrap();
        let mut argv = [pid.as_ptr(), fd.as_ptr(), ptr::null()];

        let status = unsafe {
            launch(
                ptr::null_mut(),
                WpeProcessType::WEB,
                argv.as_mut_ptr().cast(),
            )
        };
        assert_eq!(status, LAUNCH_REJECTED);

        let ctx = unsafe { (iface.create.unwrap())(ptr::null_mut()) };
        let status = unsafe { launch(ctx, WpeProcessType::WEB, ptr::null_mut()) };
        assert_eq!(status, LAUNCH_REJECTED);
        unsafe { (iface.destroy.unwrap())(ctx) };
    }

    #[test]
    #[serial]
    fn test_trampolines_use_global_peer() {
        let iface = process_provider_interface();
        let ctx = unsafe { (iface.create.unwrap())(ptr::null_mut()) };
        let pid = CString::new("1234").unwrap();
        let fd = CString::new("7").unwrap();
        let mut argv = [pid.as_ptr(), fd.as_ptr(), ptr::null()];

        // Unset peer: accepted, nothing propagates.
        global_peer().clear();
        let status =
            unsafe { (iface.launch.unwrap())(ctx, WpeProcessType::WEB, argv.as_mut_ptr().cast()) };
        assert_eq!(status, LAUNCH_ACCEPTED);

        let host = Arc::new(RecordingHost::default());
        assert!(global_peer().install(host.clone()));

        let status =
            unsafe { (iface.launch.unwrap())(ctx, WpeProcessType::WEB, argv.as_mut_ptr().cast()) };
        assert_eq!(status, LAUNCH_ACCEPTED);
        unsafe { (iface.terminate.unwrap())(ctx, 1234) };
        unsafe { (iface.terminate.unwrap())(ptr::null_mut(), 99) };

        assert_eq!(
            host.calls(),
            vec![Call::Launch(1234, ProcessKind::Web, 7), Call::Terminate(1234)]
        );

        global_peer().clear();
        unsafe { (iface.destroy.unwrap())(ctx) };
    }

    #[test]
    #[serial]
    fn test_panicking_host_does_not_unwind() {
        let iface = process_provider_interface();
        let ctx = unsafe { (iface.create.unwrap())(ptr::null_mut()) };
        let pid = CString::new("3").unwrap();
        let fd = CString::new("4").unwrap();
        let mut argv = [pid.as_ptr(), fd.as_ptr(), ptr::null()];

        global_peer().clear();
        let host = Arc::new(RecordingHost {
            panic: true,
            ..RecordingHost::default()
        });
        global_peer().install(host.clone());

        let status = unsafe {
            (iface.launch.unwrap())(ctx, WpeProcessType::NETWORK, argv.as_mut_ptr().cast())
        };
        assert_eq!(status, LAUNCH_ACCEPTED);
        unsafe { (iface.terminate.unwrap())(ctx, 3) };
        assert_eq!(host.calls().len(), 2);

        global_peer().clear();
        unsafe { (iface.destroy.unwrap())(ctx) };
    }
}
