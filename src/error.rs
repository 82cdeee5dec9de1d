//! Kernel error taxonomy (spec §6, §7).
//!
//! `r3_kernel::error` gives every syscall its own narrow error enum, built
//! with the `define_suberror!` macro, because `r3`'s public API exposes one
//! entry point per operation. This core has a single kernel entry/dispatch
//! (§4.10) and a single per-process "last error" slot (§7), so one flat enum
//! serves both roles.

use core::fmt;

/// The kind of an error, per spec §7's error-kind taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad value supplied by the caller.
    InvalidParam,
    /// Out of memory / a fixed-capacity table is full.
    OutOfMemory,
    /// An IPC mailbox had no room and the post was non-blocking.
    IpcFull,
    /// Operation illegal in the object's current state.
    NotConfigured,
    AlreadyConfigured,
    NotSupported,
    /// Caller attempted to lock a mutex it already (non-recursively) holds,
    /// or inheritance would require an impossible ordering.
    Deadlock,
    /// Handle or magic tag failed validation (§4.9).
    InvalidMagic,
    /// A buffer pointer fell outside the caller's or target's arena.
    AccessDenied,
    /// A blocking operation's timeout elapsed before it completed.
    Timeout,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidParam => "invalid parameter",
            Self::OutOfMemory => "out of memory",
            Self::IpcFull => "ipc full",
            Self::NotConfigured => "not configured",
            Self::AlreadyConfigured => "already configured",
            Self::NotSupported => "not supported",
            Self::Deadlock => "deadlock",
            Self::InvalidMagic => "invalid magic",
            Self::AccessDenied => "access denied",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

impl KernelError {
    /// Whether this error is a *safety* error (§7): invalid magic or a
    /// handle/address failing range validation. These halt in debug builds
    /// and return a sentinel with `last_error` set in release builds.
    pub fn is_safety(&self) -> bool {
        matches!(self, Self::InvalidMagic | Self::AccessDenied)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
