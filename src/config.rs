//! Tunables for the interruption core.
//!
//! The C original hardcodes its choices (prefer eventfd when available,
//! `nfds < 255` picks stack vs. heap). This crate exposes the ones that are
//! meaningful to pick at runtime as an `Options` struct with a plain
//! `Default` impl.

/// Runtime tunables for [`crate::poll::poll_interruptible`] and friends.
///
/// Constructed with [`Options::default`] and overridden selectively; there
/// is no config file or CLI surface for this crate, just the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Cap on descriptors handed to the interruptible Windows backend before
    /// it reports [`crate::error::I11eError::Unsupported`] instead of
    /// attempting the wait. Has no effect on POSIX, where `poll(2)` has no
    /// comparable limit.
    pub max_windows_wait_fds: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_windows_wait_fds: 63,
        }
    }
}
