//! Message types for communication between the JNI threads and the browser
//! thread.

use jni::objects::GlobalRef;
use std::fmt;

/// Identifier the Java side assigns to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub i32);

impl PageId {
    /// Create a new page ID.
    pub fn new(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({})", self.0)
    }
}

/// Commands a page forwards to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCommand {
    /// Create the engine-side view
    Create { width: i32, height: i32 },
    /// Navigate to a URL
    LoadUrl { url: String },
    /// Go back in history
    GoBack,
    /// Go forward in history
    GoForward,
    /// Stop loading the current page
    StopLoading,
    /// Reload the current page
    Reload,
    /// Tear down the engine-side view
    Close,
    /// A drawing surface became available
    SurfaceCreated { surface: SurfaceRef },
    /// The drawing surface went away
    SurfaceDestroyed,
    /// Surface format or size changed
    SurfaceChanged { format: i32, width: i32, height: i32 },
    /// The surface must be redrawn before it is shown
    SurfaceRedrawNeeded,
    /// Pinch zoom
    SetZoomLevel { level: f64 },
    /// Single-pointer touch input
    Touch(TouchEvent),
    /// A character typed through the input method
    SetInputMethodContent { c: char },
    /// Delete input method content at `offset`
    DeleteInputMethodContent { offset: i32 },
    /// Leave fullscreen mode
    RequestExitFullscreen,
    /// Settings pushed from the Java view
    UpdateSettings(PageSettings),
}

/// Touch phase as encoded by the Java page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Down,
    Move,
    Up,
}

impl TouchKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Down),
            1 => Some(Self::Move),
            2 => Some(Self::Up),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    /// Event time in milliseconds since boot
    pub time: i64,
    pub kind: TouchKind,
    pub x: f32,
    pub y: f32,
}

/// Page settings read from `com.wpe.wpe.PageSettings`.
///
/// A getter that is missing or throws leaves its field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSettings {
    pub user_agent: Option<String>,
    pub media_playback_requires_user_gesture: Option<bool>,
}

/// Global reference to an `android.view.Surface`.
///
/// Equality is identity of the reference, not of the Java object.
#[derive(Clone)]
pub struct SurfaceRef(GlobalRef);

impl SurfaceRef {
    pub fn new(surface: GlobalRef) -> Self {
        Self(surface)
    }

    pub fn global(&self) -> &GlobalRef {
        &self.0
    }
}

impl PartialEq for SurfaceRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_obj().as_raw() == other.0.as_obj().as_raw()
    }
}

impl fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceRef({:p})", self.0.as_obj().as_raw())
    }
}

/// Messages sent to the browser thread.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserMessage {
    /// Initialise the engine
    Init,
    /// Command for a single page
    Page { page: PageId, command: PageCommand },
    /// Shut the engine down and stop the thread
    Shutdown,
}

/// Notifications from the engine to the Java side.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Estimated load progress (0.0 - 1.0)
    LoadProgress { page: PageId, progress: f64 },
}
