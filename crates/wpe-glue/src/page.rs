//! Native side of `com.wpe.wpe.Page`.
//!
//! Each Java page owns a [`PageHandle`] boxed into its `m_nativePtr` field.
//! Navigation, surface and input natives read the handle and forward a
//! [`PageCommand`] to the browser thread.

use crate::browser::Browser;
use crate::config;
use crate::glue::{NativeEntry, jni_boundary, register_entries};
use crate::jvm;
use crate::message::{PageCommand, PageId, PageSettings, SurfaceRef, TouchEvent, TouchKind};
use jni::JNIEnv;
use jni::objects::{JObject, JString};
use jni::sys::{JNI_ERR, jchar, jdouble, jfloat, jint, jlong};
use std::ffi::c_void;
use tracing::{debug, error, warn};

const NATIVE_PTR_FIELD: &str = "m_nativePtr";

/// Native state of one Java page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHandle {
    pub id: PageId,
    pub width: i32,
    pub height: i32,
    pub closed: bool,
}

impl PageHandle {
    pub fn new(id: PageId, width: i32, height: i32) -> Self {
        Self {
            id,
            width,
            height,
            closed: false,
        }
    }

    /// Mark the page closed. Returns its id the first time only.
    pub fn close(&mut self) -> Option<PageId> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(self.id)
    }

    /// Record a new surface size.
    pub fn resize(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    /// The id to address `command` to, or `None` once closed.
    fn target(&self, command: &PageCommand) -> Option<PageId> {
        if self.closed {
            debug!("{} is closed, ignoring {:?}", self.id, command);
            return None;
        }
        Some(self.id)
    }
}

/// Run `f` on the page's handle. `None` if the page has none.
fn with_handle<R, F>(env: &mut JNIEnv, page: &JObject, f: F) -> Option<R>
where
    F: FnOnce(&mut PageHandle) -> R,
{
    // SAFETY: m_nativePtr is only ever written by `set_rust_field` in
    // `native_init`.
    let result = unsafe { env.get_rust_field::<_, _, PageHandle>(page, NATIVE_PTR_FIELD) }
        .map(|mut guard| f(&mut *guard));

    match result {
        Ok(value) => Some(value),
        Err(e) => {
            jvm::clear_exception(env);
            warn!("Page has no native handle ({})", e);
            None
        }
    }
}

fn forward(env: &mut JNIEnv, page: &JObject, command: PageCommand) {
    let Some(target) = with_handle(env, page, |handle| handle.target(&command)) else {
        return;
    };
    if let Some(id) = target {
        Browser::instance().send_page(id, command);
    }
}

/// A UTF-16 unit from the input method as a `char`. Lone surrogates are
/// rejected.
fn input_char(unit: jchar) -> Option<char> {
    char::decode_utf16([unit]).next()?.ok()
}

fn read_user_agent(env: &mut JNIEnv, settings: &JObject) -> jni::errors::Result<Option<String>> {
    let value = env
        .call_method(settings, "getUserAgent", "()Ljava/lang/String;", &[])?
        .l()?;
    if value.is_null() {
        return Ok(None);
    }
    let value = JString::from(value);
    let text: String = env.get_string(&value)?.into();
    env.delete_local_ref(value)?;
    Ok(Some(text))
}

fn read_media_gesture(env: &mut JNIEnv, settings: &JObject) -> jni::errors::Result<bool> {
    env.call_method(settings, "getMediaPlaybackRequiresUserGesture", "()Z", &[])?
        .z()
}

/// Keep a setting if its getter succeeded.
fn setting<T>(env: &mut JNIEnv, name: &str, value: jni::errors::Result<T>) -> Option<T> {
    match value {
        Ok(value) => Some(value),
        Err(e) => {
            jvm::clear_exception(env);
            warn!("Cannot read PageSettings.{} ({})", name, e);
            None
        }
    }
}

fn read_settings(env: &mut JNIEnv, settings: &JObject) -> PageSettings {
    let user_agent = read_user_agent(env, settings);
    let user_agent = setting(env, "userAgent", user_agent).flatten();

    let media_gesture = read_media_gesture(env, settings);
    let media_playback_requires_user_gesture =
        setting(env, "mediaPlaybackRequiresUserGesture", media_gesture);

    PageSettings {
        user_agent,
        media_playback_requires_user_gesture,
    }
}

extern "system" fn native_init(mut env: JNIEnv, page: JObject, id: jint, width: jint, height: jint) {
    jni_boundary("Page.nativeInit", || {
        let id = PageId::new(id);
        debug!("{}::nativeInit({}x{})", id, width, height);

        let handle = PageHandle::new(id, width, height);
        // SAFETY: m_nativePtr is a `long` reserved for this handle.
        if let Err(e) = unsafe { env.set_rust_field(&page, NATIVE_PTR_FIELD, handle) } {
            jvm::clear_exception(&mut env);
            error!("Cannot attach native handle to {}: {}", id, e);
            return;
        }

        Browser::instance().send_page(id, PageCommand::Create { width, height });
    });
}

extern "system" fn native_close(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeClose", || {
        match with_handle(&mut env, &page, PageHandle::close) {
            Some(Some(id)) => {
                Browser::instance().send_page(id, PageCommand::Close);
            }
            Some(None) => debug!("Page already closed"),
            None => {}
        }
    });
}

extern "system" fn native_destroy(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeDestroy", || {
        // SAFETY: see `with_handle`; the field is zeroed afterwards.
        match unsafe { env.take_rust_field::<_, _, PageHandle>(&page, NATIVE_PTR_FIELD) } {
            Ok(mut handle) => {
                // Destroy without a prior close still tears down the view
                if let Some(id) = handle.close() {
                    Browser::instance().send_page(id, PageCommand::Close);
                }
                debug!("{} destroyed", handle.id);
            }
            Err(e) => {
                jvm::clear_exception(&mut env);
                debug!("Nothing to destroy ({})", e);
            }
        }
    });
}

extern "system" fn native_load_url(mut env: JNIEnv, page: JObject, url: JString) {
    jni_boundary("Page.nativeLoadUrl", || {
        if url.is_null() {
            warn!("Page.loadUrl called with null URL");
            return;
        }
        let url: String = match env.get_string(&url) {
            Ok(url) => url.into(),
            Err(e) => {
                jvm::clear_exception(&mut env);
                warn!("Cannot read URL: {}", e);
                return;
            }
        };
        forward(&mut env, &page, PageCommand::LoadUrl { url });
    });
}

extern "system" fn native_go_back(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeGoBack", || forward(&mut env, &page, PageCommand::GoBack));
}

extern "system" fn native_go_forward(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeGoForward", || forward(&mut env, &page, PageCommand::GoForward));
}

extern "system" fn native_stop_loading(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeStopLoading", || forward(&mut env, &page, PageCommand::StopLoading));
}

extern "system" fn native_reload(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeReload", || forward(&mut env, &page, PageCommand::Reload));
}

extern "system" fn native_surface_created(mut env: JNIEnv, page: JObject, surface: JObject) {
    jni_boundary("Page.nativeSurfaceCreated", || {
        if surface.is_null() {
            warn!("Page.surfaceCreated called with null surface");
            return;
        }
        // The engine keeps the surface beyond this call
        let surface = match env.new_global_ref(&surface) {
            Ok(surface) => SurfaceRef::new(surface),
            Err(e) => {
                jvm::clear_exception(&mut env);
                error!("Cannot keep surface: {}", e);
                return;
            }
        };
        forward(&mut env, &page, PageCommand::SurfaceCreated { surface });
    });
}

extern "system" fn native_surface_destroyed(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeSurfaceDestroyed", || {
        forward(&mut env, &page, PageCommand::SurfaceDestroyed)
    });
}

extern "system" fn native_surface_changed(
    mut env: JNIEnv,
    page: JObject,
    format: jint,
    width: jint,
    height: jint,
) {
    jni_boundary("Page.nativeSurfaceChanged", || {
        if with_handle(&mut env, &page, |handle| handle.resize(width, height)).is_none() {
            return;
        }
        forward(&mut env, &page, PageCommand::SurfaceChanged { format, width, height });
    });
}

extern "system" fn native_surface_redraw_needed(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeSurfaceRedrawNeeded", || {
        forward(&mut env, &page, PageCommand::SurfaceRedrawNeeded)
    });
}

extern "system" fn native_set_zoom_level(mut env: JNIEnv, page: JObject, level: jdouble) {
    jni_boundary("Page.nativeSetZoomLevel", || {
        forward(&mut env, &page, PageCommand::SetZoomLevel { level })
    });
}

extern "system" fn native_on_touch_event(
    mut env: JNIEnv,
    page: JObject,
    time: jlong,
    kind: jint,
    x: jfloat,
    y: jfloat,
) {
    jni_boundary("Page.nativeOnTouchEvent", || {
        let Some(kind) = TouchKind::from_code(kind) else {
            warn!("Unknown touch event type {}", kind);
            return;
        };
        forward(&mut env, &page, PageCommand::Touch(TouchEvent { time, kind, x, y }));
    });
}

extern "system" fn native_set_input_method_content(mut env: JNIEnv, page: JObject, unit: jchar) {
    jni_boundary("Page.nativeSetInputMethodContent", || {
        let Some(c) = input_char(unit) else {
            warn!("Ignoring unpaired surrogate {:#06x} from input method", unit);
            return;
        };
        forward(&mut env, &page, PageCommand::SetInputMethodContent { c });
    });
}

extern "system" fn native_delete_input_method_content(mut env: JNIEnv, page: JObject, offset: jint) {
    jni_boundary("Page.nativeDeleteInputMethodContent", || {
        forward(&mut env, &page, PageCommand::DeleteInputMethodContent { offset })
    });
}

extern "system" fn native_request_exit_fullscreen_mode(mut env: JNIEnv, page: JObject) {
    jni_boundary("Page.nativeRequestExitFullscreenMode", || {
        forward(&mut env, &page, PageCommand::RequestExitFullscreen)
    });
}

extern "system" fn native_update_all_settings(mut env: JNIEnv, page: JObject, settings: JObject) {
    jni_boundary("Page.nativeUpdateAllSettings", || {
        if settings.is_null() {
            warn!("Page.updateAllSettings called with null settings");
            return;
        }
        let settings = read_settings(&mut env, &settings);
        forward(&mut env, &page, PageCommand::UpdateSettings(settings));
    });
}

/// The `Page` natives, with `nativeUpdateAllSettings` typed on
/// `settings_class`.
fn native_entries(settings_class: &str) -> Vec<NativeEntry> {
    vec![
        NativeEntry::new("nativeInit", "(III)V", native_init as *mut c_void),
        NativeEntry::new("nativeClose", "()V", native_close as *mut c_void),
        NativeEntry::new("nativeDestroy", "()V", native_destroy as *mut c_void),
        NativeEntry::new("nativeLoadUrl", "(Ljava/lang/String;)V", native_load_url as *mut c_void),
        NativeEntry::new("nativeGoBack", "()V", native_go_back as *mut c_void),
        NativeEntry::new("nativeGoForward", "()V", native_go_forward as *mut c_void),
        NativeEntry::new("nativeStopLoading", "()V", native_stop_loading as *mut c_void),
        NativeEntry::new("nativeReload", "()V", native_reload as *mut c_void),
        NativeEntry::new(
            "nativeSurfaceCreated",
            "(Landroid/view/Surface;)V",
            native_surface_created as *mut c_void,
        ),
        NativeEntry::new("nativeSurfaceDestroyed", "()V", native_surface_destroyed as *mut c_void),
        NativeEntry::new("nativeSurfaceChanged", "(III)V", native_surface_changed as *mut c_void),
        NativeEntry::new(
            "nativeSurfaceRedrawNeeded",
            "()V",
            native_surface_redraw_needed as *mut c_void,
        ),
        NativeEntry::new("nativeSetZoomLevel", "(D)V", native_set_zoom_level as *mut c_void),
        NativeEntry::new("nativeOnTouchEvent", "(JIFF)V", native_on_touch_event as *mut c_void),
        NativeEntry::new(
            "nativeSetInputMethodContent",
            "(C)V",
            native_set_input_method_content as *mut c_void,
        ),
        NativeEntry::new(
            "nativeDeleteInputMethodContent",
            "(I)V",
            native_delete_input_method_content as *mut c_void,
        ),
        NativeEntry::new(
            "nativeRequestExitFullscreenMode",
            "()V",
            native_request_exit_fullscreen_mode as *mut c_void,
        ),
        NativeEntry::new(
            "nativeUpdateAllSettings",
            format!("(L{};)V", settings_class),
            native_update_all_settings as *mut c_void,
        ),
    ]
}

/// Register the `Page` natives. Negative on failure.
pub fn register_page(env: &mut JNIEnv) -> jint {
    let config = config::get();
    match register_entries(env, &config.page_class, native_entries(&config.page_settings_class)) {
        Ok(status) => status,
        Err(e) => {
            error!("{:#}", e);
            JNI_ERR
        }
    }
}
