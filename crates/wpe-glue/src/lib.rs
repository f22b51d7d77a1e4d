//! WPE Browser Glue
//!
//! JNI bridge that lets an Android application host WPE WebKit. Loaded by
//! `System.loadLibrary("WPEBrowserGlue")`; `JNI_OnLoad` registers the
//! `BrowserGlue` and `Page` natives and installs the process provider that
//! routes WebKit's auxiliary process launches to Java services.
//!
//! # Threads
//!
//! - `wpe-browser`: runs the [`BrowserEngine`] and every page command
//! - `wpe-looper`: calls back into Java with engine events
//! - `wpe-stdout`: forwards native stdout to logcat

// The library file must be libWPEBrowserGlue.so
#![allow(non_snake_case)]

mod browser;
mod config;
mod engine;
mod environment;
mod glue;
mod jvm;
mod logcat;
mod logging;
mod looper;
mod message;
mod page;

pub use browser::Browser;
pub use config::{ConfigError, GlueConfig};
pub use engine::{BrowserEngine, DetachedEngine, EventSink};
pub use glue::{EventTarget, JniGlue};
pub use looper::LooperHelper;
pub use message::{EngineEvent, PageCommand, PageId, PageSettings, SurfaceRef, TouchEvent, TouchKind};
pub use page::PageHandle;

use browser::panic_message;
use jni::JavaVM;
use jni::sys::{JNI_ERR, JNI_OK, JNI_VERSION_1_6, jint};
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};
use wpe_process::{process_provider_interface, register_process_provider};

/// Auxiliary native registrations run after `BrowserGlue`'s.
type Registration<E> = (&'static str, fn(&mut E) -> jint);

const REGISTRATIONS: &[Registration<jni::JNIEnv<'static>>] = &[("Page", page::register_page)];

/// Use `engine` for the browser from the next `BrowserGlue.init` on.
pub fn install_engine(engine: Box<dyn BrowserEngine>) -> bool {
    Browser::instance().install_engine(engine)
}

/// Run `modules` in order, stopping at the first negative status.
fn run_registrations<E>(env: &mut E, modules: &[Registration<E>]) -> Result<(), &'static str> {
    for (name, register) in modules {
        if register(env) < 0 {
            return Err(*name);
        }
    }
    Ok(())
}

/// `JNI_OnLoad` result for a `BrowserGlue` registration status.
fn load_status(natives_status: jint) -> jint {
    if natives_status != JNI_OK {
        natives_status
    } else {
        JNI_VERSION_1_6
    }
}

fn on_load(raw_vm: *mut jni::sys::JavaVM) -> jint {
    let (config, config_error) = config::init_global();
    logging::init(config);
    if let Some(e) = config_error {
        warn!("Using default configuration: {}", e);
    }

    // SAFETY: the JVM hands `JNI_OnLoad` a valid VM pointer.
    let vm = match unsafe { JavaVM::from_raw(raw_vm) } {
        Ok(vm) => jvm::init_vm(vm),
        Err(e) => {
            error!("Invalid JavaVM: {}", e);
            return JNI_ERR;
        }
    };

    let mut env = match vm.get_env() {
        Ok(env) => env,
        Err(e) => {
            error!("Cannot get JNIEnv: {}", e);
            return JNI_ERR;
        }
    };

    let status = match glue::register_natives(&mut env, &config.glue_class) {
        Ok(status) => status,
        Err(e) => {
            error!("{:#}", e);
            return JNI_ERR;
        }
    };

    if let Err(name) = run_registrations(&mut env, REGISTRATIONS) {
        error!("{} registration failed!", name);
        return JNI_ERR;
    }

    register_process_provider(process_provider_interface());
    info!("WPE browser glue loaded");

    load_status(status)
}

/// Library entry point called by the JVM.
#[unsafe(no_mangle)]
pub extern "system" fn JNI_OnLoad(vm: *mut jni::sys::JavaVM, _reserved: *mut c_void) -> jint {
    match panic::catch_unwind(AssertUnwindSafe(|| on_load(vm))) {
        Ok(status) => status,
        Err(payload) => {
            error!("JNI_OnLoad panicked: {}", panic_message(payload.as_ref()));
            JNI_ERR
        }
    }
}
