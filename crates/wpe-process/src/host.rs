//! Capability interface for the process host.

use crate::kind::ProcessKind;
use std::os::fd::RawFd;

/// Failures reported by a host after a request was accepted.
///
/// None of these reach the engine: the provider logs them and carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// No usable boundary environment for the calling thread
    #[error("environment error: {0}")]
    Environment(String),

    /// The peer object has been reclaimed
    #[error("glue object gone")]
    PeerGone,

    /// The peer does not expose the callback
    #[error("cannot find \"{0}\" method")]
    MethodMissing(&'static str),

    /// The callback raised on the other side of the boundary
    #[error("exception occurred on host side: {0}")]
    Exception(String),
}

/// The two operations WebKit needs from whoever actually spawns processes.
pub trait ProcessHost: Send + Sync {
    /// Start an auxiliary process of `kind` bound to the IPC socket `fd`.
    fn launch_process(&self, pid: u64, kind: ProcessKind, fd: RawFd) -> Result<(), HostError>;

    /// Stop the auxiliary process previously launched as `pid`.
    fn terminate_process(&self, pid: u64) -> Result<(), HostError>;
}
