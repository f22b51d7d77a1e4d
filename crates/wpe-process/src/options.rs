//! Launch option parsing.
//!
//! WebKit hands the provider an untyped `options` pointer which, for the
//! launch path, is a `char**` holding two decimal strings: the WebKit-side
//! process id and the IPC socket descriptor.

use crate::kind::{ProcessKind, WpeProcessType};
use std::ffi::{CStr, c_char};
use std::os::fd::RawFd;

/// Number of entries WebKit places in the launch `argv`.
const LAUNCH_ARG_COUNT: usize = 2;

/// Reasons a launch request is rejected before reaching the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("provider context is null")]
    NullContext,

    #[error("launch options are null")]
    NullOptions,

    #[error("expected 2 launch arguments, found {0}")]
    Arity(usize),

    #[error("launch argument {0} is not valid UTF-8")]
    NotUtf8(usize),

    #[error("invalid process id: {0:?}")]
    InvalidPid(String),

    #[error("invalid file descriptor: {0:?}")]
    InvalidFd(String),

    #[error("invalid process type: {0}")]
    UnsupportedKind(WpeProcessType),
}

/// Parsed `(pid, fd)` pair from the launch arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Process id generated by WebKit (not a system pid)
    pub pid: u64,
    /// Socket descriptor used by WebKit for IPC
    pub fd: RawFd,
}

impl LaunchOptions {
    /// Parse from the argument strings.
    ///
    /// Exactly two entries are accepted: a 64-bit pid followed by a
    /// descriptor, both plain ASCII digits. Signs and surrounding whitespace
    /// are rejected.
    pub fn parse(args: &[&str]) -> Result<Self, LaunchError> {
        let [pid, fd] = args else {
            return Err(LaunchError::Arity(args.len()));
        };

        let pid = decimal(pid)
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| LaunchError::InvalidPid(pid.to_string()))?;

        let fd = decimal(fd)
            .and_then(|digits| digits.parse::<RawFd>().ok())
            .ok_or_else(|| LaunchError::InvalidFd(fd.to_string()))?;

        Ok(Self { pid, fd })
    }

    /// Parse from the raw `char**` handed over by the engine.
    ///
    /// Only the first two slots are read; a null slot counts as a missing
    /// argument.
    ///
    /// # Safety
    ///
    /// `argv` must be null or point to at least two readable `char*` slots,
    /// each null or pointing to a NUL-terminated string.
    pub unsafe fn from_argv(argv: *const *const c_char) -> Result<Self, LaunchError> {
        if argv.is_null() {
            return Err(LaunchError::NullOptions);
        }

        let mut args = [""; LAUNCH_ARG_COUNT];
        for (index, slot) in args.iter_mut().enumerate() {
            // SAFETY: caller guarantees LAUNCH_ARG_COUNT readable slots.
            let entry = unsafe { *argv.add(index) };
            if entry.is_null() {
                return Err(LaunchError::Arity(index));
            }
            // SAFETY: non-null entries are NUL-terminated per the contract.
            let entry = unsafe { CStr::from_ptr(entry) };
            *slot = entry.to_str().map_err(|_| LaunchError::NotUtf8(index))?;
        }

        Self::parse(&args)
    }
}

/// `s` if it is a non-empty run of ASCII digits.
fn decimal(s: &str) -> Option<&str> {
    (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then_some(s)
}

/// A fully validated launch request, ready for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRequest {
    pub pid: u64,
    pub kind: ProcessKind,
    pub fd: RawFd,
}

impl LaunchRequest {
    /// Combine parsed options with an engine process type.
    pub fn new(process_type: WpeProcessType, options: LaunchOptions) -> Result<Self, LaunchError> {
        let kind =
            ProcessKind::from_engine(process_type).ok_or(LaunchError::UnsupportedKind(process_type))?;

        Ok(Self {
            pid: options.pid,
            kind,
            fd: options.fd,
        })
    }
}
