//! Native side of `com.wpe.wpe.BrowserGlue`.
//!
//! Holds the weak reference to the Java glue object between `init` and
//! `shut`, and implements [`ProcessHost`] on top of it so WebKit's process
//! provider can ask Java to start and stop auxiliary process services.

use crate::browser::{Browser, panic_message};
use crate::config;
use crate::engine::EventSink;
use crate::environment;
use crate::jvm;
use crate::logcat;
use crate::looper::LooperHelper;
use crate::message::EngineEvent;
use anyhow::{Context, Result};
use jni::JNIEnv;
use jni::errors::Error as JniError;
use jni::objects::{JClass, JMethodID, JObject, JObjectArray, JString, JValue, JValueOwned, WeakRef};
use jni::signature::{Primitive, ReturnType};
use jni::sys::{JNI_ERR, JNI_OK, jint, jlong, jvalue};
use jni::NativeMethod;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wpe_process::{HostError, PeerSlot, ProcessHost, ProcessKind, global_peer};

/// Local references a single callback may create.
const LOCAL_FRAME_CAPACITY: i32 = 8;

static GLUE: GlueSlot<JniGlue> = GlueSlot::new();

/// A native method ready for `RegisterNatives`.
pub(crate) struct NativeEntry {
    pub name: &'static str,
    pub sig: String,
    pub fn_ptr: *mut c_void,
}

impl NativeEntry {
    pub fn new(name: &'static str, sig: impl Into<String>, fn_ptr: *mut c_void) -> Self {
        Self {
            name,
            sig: sig.into(),
            fn_ptr,
        }
    }
}

/// Register `entries` on `class_name`.
///
/// A missing class is an error; a failed registration is logged and reported
/// as `JNI_ERR`.
pub(crate) fn register_entries(env: &mut JNIEnv, class_name: &str, entries: Vec<NativeEntry>) -> Result<jint> {
    let class = jvm::find_class(env, class_name)?;

    let methods: Vec<NativeMethod> = entries
        .into_iter()
        .map(|entry| NativeMethod {
            name: entry.name.into(),
            sig: entry.sig.into(),
            fn_ptr: entry.fn_ptr,
        })
        .collect();

    let status = match env.register_native_methods(&class, &methods) {
        Ok(()) => JNI_OK,
        Err(e) => {
            error!("Cannot register natives on {}: {}", class_name, e);
            jvm::clear_exception(env);
            JNI_ERR
        }
    };
    env.delete_local_ref(class)?;
    Ok(status)
}

/// Run a native method body without letting a panic reach the JVM.
pub(crate) fn jni_boundary<F>(name: &str, f: F)
where
    F: FnOnce(),
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!("{} panicked: {}", name, panic_message(payload.as_ref()));
    }
}

/// Weak handle on the Java `BrowserGlue` plus its callback method IDs,
/// resolved once at `init`.
pub struct JniGlue {
    object: WeakRef,
    launch_process: Option<JMethodID>,
    terminate_process: Option<JMethodID>,
    load_progress: Option<JMethodID>,
}

impl JniGlue {
    fn new(env: &mut JNIEnv, object: &JObject) -> Result<Self> {
        let weak = env
            .new_weak_ref(object)
            .context("cannot create weak reference")?
            .context("BrowserGlue object is null")?;

        let class = env.get_object_class(object).context("cannot get BrowserGlue class")?;
        let launch_process = lookup_method(env, &class, "launchProcess", "(JII)V");
        let terminate_process = lookup_method(env, &class, "terminateProcess", "(J)V");
        let load_progress = lookup_method(env, &class, "loadProgress", "(D)V");
        env.delete_local_ref(class)?;

        Ok(Self {
            object: weak,
            launch_process,
            terminate_process,
            load_progress,
        })
    }

    fn call_void(
        &self,
        name: &'static str,
        method: Option<JMethodID>,
        args: &[jvalue],
    ) -> Result<(), HostError> {
        let mut env = jvm::current_thread_env()?;

        env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| -> Result<Result<(), HostError>, JniError> {
            let Some(object) = self.object.upgrade_local(env)? else {
                return Ok(Err(HostError::PeerGone));
            };
            let Some(method) = method else {
                return Ok(Err(HostError::MethodMissing(name)));
            };

            // SAFETY: `method` was looked up on this object's class with a
            // void signature whose parameters match `args`.
            let result = unsafe {
                env.call_method_unchecked(&object, method, ReturnType::Primitive(Primitive::Void), args)
            };
            Ok(check_call(env, name, result))
        })
        .map_err(|e| HostError::Environment(e.to_string()))?
    }
}

impl ProcessHost for JniGlue {
    fn launch_process(&self, pid: u64, kind: ProcessKind, fd: RawFd) -> Result<(), HostError> {
        self.call_void(
            "launchProcess",
            self.launch_process,
            &[
                JValue::Long(pid as jlong).as_jni(),
                JValue::Int(kind.code()).as_jni(),
                JValue::Int(fd).as_jni(),
            ],
        )
    }

    fn terminate_process(&self, pid: u64) -> Result<(), HostError> {
        self.call_void(
            "terminateProcess",
            self.terminate_process,
            &[JValue::Long(pid as jlong).as_jni()],
        )
    }
}

impl EventTarget for JniGlue {
    fn load_progress(&self, progress: f64) -> Result<(), HostError> {
        self.call_void(
            "loadProgress",
            self.load_progress,
            &[JValue::Double(progress).as_jni()],
        )
    }
}

fn lookup_method(env: &mut JNIEnv, class: &JClass, name: &str, sig: &str) -> Option<JMethodID> {
    match env.get_method_id(class, name, sig) {
        Ok(method) => Some(method),
        Err(e) => {
            jvm::clear_exception(env);
            warn!("BrowserGlue has no {}{} ({})", name, sig, e);
            None
        }
    }
}

/// Turn a pending Java exception into [`HostError::Exception`].
fn check_call(env: &mut JNIEnv, name: &str, result: jni::errors::Result<JValueOwned>) -> Result<(), HostError> {
    if env.exception_check().unwrap_or(false) {
        let _ = env.exception_describe();
        let _ = env.exception_clear();
        return Err(HostError::Exception(format!("{} threw", name)));
    }
    result
        .map(|_| ())
        .map_err(|e| HostError::Environment(e.to_string()))
}

/// Java-side receiver of engine events.
pub trait EventTarget: Send + Sync {
    fn load_progress(&self, progress: f64) -> Result<(), HostError>;
}

/// Owner of the glue reference between `init` and `shut`.
///
/// The process host slot is only filled from here, so process callbacks and
/// engine events always reach the same object.
pub(crate) struct GlueSlot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> GlueSlot<T>
where
    T: ProcessHost + EventTarget + 'static,
{
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::const_mutex(None),
        }
    }

    /// Keep the object built by `make` and publish it as the process host.
    ///
    /// `make` is not called if a reference is already held or another
    /// process host is installed. Returns `true` if the reference was kept.
    pub fn install<F>(&self, peer: &PeerSlot, make: F) -> bool
    where
        F: FnOnce() -> Option<Arc<T>>,
    {
        let mut current = self.inner.lock();
        if current.is_some() {
            debug!("BrowserGlue reference already set");
            return false;
        }
        if peer.is_set() {
            warn!("Process host already installed, BrowserGlue not kept");
            return false;
        }

        let Some(glue) = make() else {
            return false;
        };

        // Publish to the peer slot before keeping it here
        if !peer.install(glue.clone()) {
            warn!("Process host installed concurrently, BrowserGlue not kept");
            return false;
        }
        *current = Some(glue);
        true
    }

    /// Drop the reference and withdraw it from the peer slot.
    pub fn release(&self, peer: &PeerSlot) -> bool {
        let mut current = self.inner.lock();
        if current.take().is_none() {
            return false;
        }
        peer.clear();
        true
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.inner.lock().clone()
    }
}

fn install_glue(env: &mut JNIEnv, object: &JObject) {
    GLUE.install(global_peer(), || match JniGlue::new(env, object) {
        Ok(glue) => Some(Arc::new(glue)),
        Err(e) => {
            error!("Cannot keep a reference to BrowserGlue: {:#}", e);
            None
        }
    });
}

fn release_glue() {
    if GLUE.release(global_peer()) {
        debug!("BrowserGlue reference released");
    }
}

/// Engine events are reported to Java from the looper helper thread.
pub fn event_sink() -> EventSink {
    EventSink::new(|event| {
        dispatch_event(&GLUE, LooperHelper::global(), event);
    })
}

/// Queue `event` on `looper`. Returns `false` if the looper is not running.
fn dispatch_event<T>(slot: &'static GlueSlot<T>, looper: &LooperHelper, event: EngineEvent) -> bool
where
    T: ProcessHost + EventTarget + 'static,
{
    match event {
        EngineEvent::LoadProgress { page, progress } => {
            // The reference is looked up when the task runs, so nothing
            // queued before `shut` reaches Java afterwards
            let dispatched = looper.dispatch(move || {
                let Some(glue) = slot.get() else {
                    debug!("Dropping load progress of {} (no BrowserGlue)", page);
                    return;
                };
                if let Err(e) = glue.load_progress(progress) {
                    error!("Cannot report load progress of {} ({})", page, e);
                }
            });
            if !dispatched {
                debug!("Dropping load progress of {} (looper helper not running)", page);
            }
            dispatched
        }
    }
}

/// Read a `String[]`, skipping elements that cannot be read.
fn read_string_array(env: &mut JNIEnv, array: &JObjectArray) -> Vec<String> {
    if array.is_null() {
        return Vec::new();
    }

    let len = match env.get_array_length(array) {
        Ok(len) => len,
        Err(e) => {
            warn!("Cannot read environment array: {}", e);
            return Vec::new();
        }
    };

    let mut strings = Vec::with_capacity(len.max(0) as usize);
    for index in 0..len {
        match read_string_element(env, array, index) {
            Ok(s) => strings.push(s),
            Err(e) => {
                jvm::clear_exception(env);
                warn!("Skipping environment entry {}: {:#}", index, e);
            }
        }
    }
    strings
}

fn read_string_element(env: &mut JNIEnv, array: &JObjectArray, index: i32) -> Result<String> {
    let element = JString::from(env.get_object_array_element(array, index)?);
    let value: String = env.get_string(&element)?.into();
    env.delete_local_ref(element)?;
    Ok(value)
}

extern "system" fn setup_environment(mut env: JNIEnv, _class: JClass, entries: JObjectArray) {
    jni_boundary("setupEnvironment", || {
        debug!("BrowserGlue::setupEnvironment()");

        let config = config::get();
        if config.pipe_stdout {
            match logcat::pipe_stdout_to_logcat(config.redirect_stderr) {
                Ok(true) => debug!("stdout piped to logcat"),
                Ok(false) => {}
                Err(e) => warn!("Cannot pipe stdout to logcat: {}", e),
            }
        }

        let entries = read_string_array(&mut env, &entries);
        let applied = environment::configure(&entries);
        debug!("Applied {} of {} environment entries", applied, entries.len());
    });
}

extern "system" fn init(mut env: JNIEnv, _class: JClass, glue: JObject) {
    jni_boundary("init", || {
        debug!("BrowserGlue::init()");
        install_glue(&mut env, &glue);
        Browser::instance().init();
    });
}

extern "system" fn init_looper_helper(_env: JNIEnv, _class: JClass) {
    jni_boundary("initLooperHelper", || {
        debug!("BrowserGlue::initLooperHelper()");
        LooperHelper::global().initialize();
    });
}

extern "system" fn shut(_env: JNIEnv, _class: JClass) {
    jni_boundary("shut", || {
        debug!("BrowserGlue::shut()");
        // Drain the looper only after the reference is gone
        Browser::instance().shut();
        release_glue();
        LooperHelper::global().stop();
    });
}

/// The `BrowserGlue` natives, with `init` typed on `glue_class`.
pub(crate) fn native_entries(glue_class: &str) -> Vec<NativeEntry> {
    vec![
        NativeEntry::new(
            "setupEnvironment",
            "([Ljava/lang/String;)V",
            setup_environment as *mut c_void,
        ),
        NativeEntry::new("init", format!("(L{};)V", glue_class), init as *mut c_void),
        NativeEntry::new("initLooperHelper", "()V", init_looper_helper as *mut c_void),
        NativeEntry::new("shut", "()V", shut as *mut c_void),
    ]
}

/// Register the `BrowserGlue` natives on `glue_class`.
pub fn register_natives(env: &mut JNIEnv, glue_class: &str) -> Result<jint> {
    let status = register_entries(env, glue_class, native_entries(glue_class))?;
    if status == JNI_OK {
        info!("Registered {} natives", glue_class);
    }
    Ok(status)
}
