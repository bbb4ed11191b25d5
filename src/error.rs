//! Error types for the interruption core.
//!
//! The C original (`src/misc/interrupt.c`) reports everything through `errno`
//! (`EINTR`, `ENOMEM`). We keep the same small vocabulary but make it a typed
//! enum, matching the style of the error enums elsewhere in this crate
//! (`threading::ThreadError`).

use thiserror::Error;

/// Errors produced by the interruptible wait primitives.
#[derive(Debug, Error)]
pub enum I11eError {
    /// The wait was aborted cooperatively via [`crate::context::raise`].
    ///
    /// Always recoverable: the caller decides whether to abandon the
    /// operation or rearm and retry.
    #[error("operation was interrupted")]
    Interrupted,

    /// A wake object (eventfd, pipe, duplicated thread handle) could not be
    /// allocated. The wrapper did not perform the underlying wait.
    #[error("failed to allocate wake object: {0}")]
    ResourceExhausted(#[source] std::io::Error),

    /// The platform lacks a primitive the caller asked for (e.g. vectored
    /// I/O on the Windows backend). No I/O was performed.
    #[error("operation not supported on this platform")]
    Unsupported,

    /// Any other error surfaced verbatim from the underlying blocking
    /// primitive (`poll`, `read`, `sem_wait`, ...).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, I11eError>;

impl I11eError {
    /// True if this is the cooperative-cancellation variant.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, I11eError::Interrupted)
    }
}
