//! Process kinds on both sides of the provider boundary.

use std::ffi::c_uint;
use std::fmt;

/// Engine-side process type (`enum wpe_process_type`).
///
/// Kept as a transparent integer rather than a Rust enum so that values
/// added by newer libwpe releases cannot produce an invalid discriminant.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WpeProcessType(pub c_uint);

impl WpeProcessType {
    pub const WEB: Self = Self(0);
    pub const NETWORK: Self = Self(1);
    pub const GPU: Self = Self(2);
    pub const WEB_AUTHN: Self = Self(3);

    /// Raw value as received from the engine.
    pub fn raw(self) -> c_uint {
        self.0
    }
}

impl fmt::Display for WpeProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::WEB => write!(f, "WEB"),
            Self::NETWORK => write!(f, "NETWORK"),
            Self::GPU => write!(f, "GPU"),
            Self::WEB_AUTHN => write!(f, "WEB_AUTHN"),
            Self(other) => write!(f, "UNKNOWN({})", other),
        }
    }
}

/// Auxiliary process kinds the Android host knows how to spawn.
///
/// The discriminants are the integer codes passed to
/// `BrowserGlue.launchProcess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ProcessKind {
    /// WebKit web-content renderer
    Web = 0,
    /// WebKit network process
    Network = 1,
}

impl ProcessKind {
    /// Map an engine process type onto a host kind.
    ///
    /// Only web-content and network processes are hosted; GPU, WebAuthn and
    /// any future type yield `None`.
    pub fn from_engine(process_type: WpeProcessType) -> Option<Self> {
        match process_type {
            WpeProcessType::WEB => Some(Self::Web),
            WpeProcessType::NETWORK => Some(Self::Network),
            _ => None,
        }
    }

    /// Integer code used on the Java side.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => write!(f, "WebProcess"),
            Self::Network => write!(f, "NetworkProcess"),
        }
    }
}
