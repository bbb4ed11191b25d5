//! POSIX backend: real `poll(2)` plus an eventfd-or-pipe wake source.
//!
//! Grounded on `vlc_poll_i11e_inner`'s POSIX branch in
//! `src/misc/interrupt.c` (eventfd preferred, pipe fallback, both opened
//! close-on-exec and non-blocking) and on the `pipe`/`poll`/`cvt` plumbing in
//! this crate's jobserver-style reference (`cvt()` turning a `-1` libc
//! return into `io::Error::last_os_error()`). The C original also picks
//! between a stack array and a heap allocation depending on `nfds`; Rust's
//! `Vec` already does one allocation for the whole array, so that threshold
//! isn't reproduced here -- there is nothing left to save.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use log::trace;

use crate::context::{FinishOutcome, InterruptContext, PrepareOutcome};
use crate::error::{I11eError, Result};
use crate::hook::WakeHook;

use super::{Events, PollFd};

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// The descriptor(s) used to wake a blocked `poll(2)` early. A single
/// eventfd on Linux, or a pipe pair elsewhere.
struct WakeObject {
    read_fd: RawFd,
    write_fd: RawFd,
    is_eventfd: bool,
}

impl WakeObject {
    #[cfg(target_os = "linux")]
    fn create() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd >= 0 {
            return Ok(WakeObject {
                read_fd: fd,
                write_fd: fd,
                is_eventfd: true,
            });
        }
        Self::create_pipe()
    }

    #[cfg(not(target_os = "linux"))]
    fn create() -> io::Result<Self> {
        Self::create_pipe()
    }

    fn create_pipe() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        #[cfg(target_os = "linux")]
        {
            cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) })?;
        }
        #[cfg(not(target_os = "linux"))]
        {
            cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
            for fd in fds {
                cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
                cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) })?;
            }
        }
        Ok(WakeObject {
            read_fd: fds[0],
            write_fd: fds[1],
            is_eventfd: false,
        })
    }

    /// Called from the raising thread, under the context lock.
    fn signal(&self) {
        if self.is_eventfd {
            let one: u64 = 1;
            unsafe {
                libc::write(self.write_fd, &one as *const u64 as *const _, 8);
            }
        } else {
            let byte = [1u8];
            unsafe {
                libc::write(self.write_fd, byte.as_ptr() as *const _, 1);
            }
        }
        // EAGAIN (buffer already signalled, or full) is fine: the waiter
        // only needs to observe readiness once.
    }

    /// Consume whatever was written, so a stale signal doesn't wake the
    /// *next* wait on a reused context.
    fn drain(&self) {
        if self.is_eventfd {
            let mut val: u64 = 0;
            unsafe {
                libc::read(self.read_fd, &mut val as *mut u64 as *mut _, 8);
            }
        } else {
            let mut buf = [0u8; 64];
            loop {
                let n = unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut _, buf.len()) };
                if n <= 0 {
                    break;
                }
            }
        }
    }
}

impl Drop for WakeObject {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            if !self.is_eventfd {
                libc::close(self.write_fd);
            }
        }
    }
}

fn build_pollfds(fds: &[PollFd], extra: RawFd) -> Vec<libc::pollfd> {
    let mut raw = Vec::with_capacity(fds.len() + 1);
    for pfd in fds {
        raw.push(libc::pollfd {
            fd: pfd.fd,
            events: pfd.events.bits(),
            revents: 0,
        });
    }
    raw.push(libc::pollfd {
        fd: extra,
        events: libc::POLLIN,
        revents: 0,
    });
    raw
}

fn run_poll(raw: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<()> {
    loop {
        let ret = unsafe { libc::poll(raw.as_mut_ptr(), raw.len() as libc::nfds_t, timeout_ms) };
        if ret >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
        // A signal interrupted poll(2) itself; that's unrelated to our
        // cooperative interruption protocol, so just retry.
    }
}

fn copy_revents(fds: &mut [PollFd], raw: &[libc::pollfd]) -> usize {
    let mut ready = 0;
    for (pfd, r) in fds.iter_mut().zip(raw.iter()) {
        pfd.revents = Events::from_bits(r.revents);
        if r.revents != 0 {
            ready += 1;
        }
    }
    ready
}

pub(super) fn poll_plain(fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
    let mut raw: Vec<libc::pollfd> = fds
        .iter()
        .map(|p| libc::pollfd {
            fd: p.fd,
            events: p.events.bits(),
            revents: 0,
        })
        .collect();
    run_poll(&mut raw, timeout_ms)?;
    Ok(copy_revents(fds, &raw))
}

pub(super) fn poll_i11e(
    fds: &mut [PollFd],
    timeout_ms: i32,
    ctx: &Arc<InterruptContext>,
) -> Result<usize> {
    let wake = Arc::new(WakeObject::create().map_err(I11eError::ResourceExhausted)?);
    let hook_wake = Arc::clone(&wake);
    let hook = WakeHook::new(move || hook_wake.signal());

    if matches!(ctx.prepare(hook), PrepareOutcome::AlreadyPending) {
        return Err(I11eError::Interrupted);
    }

    let mut raw = build_pollfds(fds, wake.read_fd);
    let poll_result = run_poll(&mut raw, timeout_ms);

    match ctx.finish() {
        FinishOutcome::Interrupted => {
            // The hook fired (or would have) during the wait; discard
            // whatever poll(2) actually returned and drain the wake
            // object so it doesn't leak a spurious wakeup into a future
            // wait on this same context.
            trace!("poll_i11e: interrupted, draining wake object");
            wake.drain();
            Err(I11eError::Interrupted)
        }
        FinishOutcome::Ok => {
            poll_result?;
            Ok(copy_revents(fds, &raw))
        }
    }
}
