//! WPE Process Provider
//!
//! Implements libwpe's process-provider interface for hosts that cannot
//! fork/exec WebKit's auxiliary processes themselves. Every launch and
//! terminate request is validated here and then handed to a [`ProcessHost`],
//! which on Android is the Java `BrowserGlue` object.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │        WebKit (libwpe)      │
//! └──────────────┬──────────────┘
//!                │ create / destroy / launch / terminate (C ABI)
//! ┌──────────────▼──────────────┐
//! │  ProcessProviderInterface   │  trampolines, panic boundary
//! └──────────────┬──────────────┘
//!                │ validated LaunchRequest
//! ┌──────────────▼──────────────┐
//! │  PeerSlot<dyn ProcessHost>  │  unset → set → unset
//! └──────────────┬──────────────┘
//!                │ launch_process / terminate_process
//! ┌──────────────▼──────────────┐
//! │  Host (JNI BrowserGlue)     │
//! └─────────────────────────────┘
//! ```
//!
//! # Status codes
//!
//! `launch` returns `-1` only when the request is rejected before any host
//! call is attempted (null context, malformed options, unsupported kind).
//! Every failure after that point is logged and reported as `0`.

mod host;
mod kind;
mod options;
mod peer;
mod provider;
mod registry;

pub use host::{HostError, ProcessHost};
pub use kind::{ProcessKind, WpeProcessType};
pub use options::{LaunchError, LaunchOptions, LaunchRequest};
pub use peer::{PeerSlot, global_peer};
pub use provider::{
    LAUNCH_ACCEPTED, LAUNCH_REJECTED, ProcessProvider, ProcessProviderInterface, ProviderContext,
    WpeProcessProvider, process_provider_interface,
};
pub use registry::{register_process_provider, registered_interface};
