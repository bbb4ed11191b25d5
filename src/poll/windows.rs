//! Windows backend: `WSAPoll` for the uninterrupted fast path, and a
//! per-socket event wait for the interruptible one.
//!
//! Grounded on the `_WIN32` branch of `vlc_poll_i11e` in
//! `src/misc/interrupt.c`: the calling thread's handle is duplicated,
//! `vlc_interrupt_prepare` installs a hook that calls `QueueUserAPC` with a
//! no-op callback against that duplicate, and the wait itself must be
//! *alertable* for the queued APC to ever run. `WSAPoll` has no alertable
//! form, so (matching VLC's own `src/win32/thread.c` implementation of
//! `vlc_poll`) the interruptible path instead associates an event with each
//! socket via `WSAEventSelect` and blocks in `WaitForMultipleObjectsEx` with
//! `bAlertable = TRUE`. This bounds the interruptible wait to
//! `WSA_MAXIMUM_WAIT_EVENTS - 1` sockets, one slot reserved for alertability
//! itself; `poll_plain` has no such limit since `WSAPoll` takes an array
//! directly.
//!
//! Vectored and datagram-address I/O (C6's `readv`/`writev`/`recvmsg`/
//! `sendmsg`) are not implemented on this platform, matching
//! `vlc_assert_unreachable()` in the C original's `_WIN32` branch for the
//! same calls.

use std::sync::Arc;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_TIMEOUT};
use windows_sys::Win32::Networking::WinSock::{
    WSACloseEvent, WSACreateEvent, WSAEnumNetworkEvents, WSAEventSelect, WSAPoll, FD_ACCEPT,
    FD_CLOSE, FD_CONNECT, FD_READ, FD_WRITE, SOCKET, WSANETWORKEVENTS, WSAPOLLFD,
};
use windows_sys::Win32::System::Threading::{
    DuplicateHandle, GetCurrentProcess, GetCurrentThread, QueueUserAPC,
    WaitForMultipleObjectsEx, DUPLICATE_SAME_ACCESS,
};

use crate::context::{FinishOutcome, InterruptContext, PrepareOutcome};
use crate::error::{I11eError, Result};
use crate::hook::WakeHook;

use super::{Events, PollFd};

/// Slots available to [`poll_i11e`]: one per socket, minus one reserved so
/// the wait always has room to be alertable. See
/// [`crate::config::Options::max_windows_wait_fds`].
fn max_interruptible_fds() -> usize {
    crate::config::Options::default().max_windows_wait_fds
}

fn events_to_network_mask(events: Events) -> i32 {
    let mut mask = 0;
    if events.contains(Events::IN) {
        mask |= FD_READ | FD_ACCEPT | FD_CLOSE;
    }
    if events.contains(Events::OUT) {
        mask |= FD_WRITE | FD_CONNECT;
    }
    mask
}

fn network_mask_to_events(mask: u32) -> Events {
    let mut out = Events::NONE;
    if mask & (FD_READ | FD_ACCEPT) as u32 != 0 {
        out = out | Events::IN;
    }
    if mask & FD_WRITE as u32 != 0 {
        out = out | Events::OUT;
    }
    if mask & FD_CLOSE as u32 != 0 {
        out = out | Events::HUP;
    }
    out
}

pub(super) fn poll_plain(fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
    let mut raw: Vec<WSAPOLLFD> = fds
        .iter()
        .map(|p| WSAPOLLFD {
            fd: p.fd as SOCKET,
            events: p.events.bits(),
            revents: 0,
        })
        .collect();

    let ret = unsafe { WSAPoll(raw.as_mut_ptr(), raw.len() as u32, timeout_ms) };
    if ret < 0 {
        return Err(I11eError::Io(std::io::Error::last_os_error()));
    }

    let mut ready = 0;
    for (pfd, r) in fds.iter_mut().zip(raw.iter()) {
        pfd.revents = Events::from_bits(r.revents);
        if r.revents != 0 {
            ready += 1;
        }
    }
    Ok(ready)
}

/// No-op APC callback: its only purpose is to make `WaitForMultipleObjectsEx`
/// return `WAIT_IO_COMPLETION`.
unsafe extern "system" fn wake_apc(_data: usize) {}

struct DuplicatedThreadHandle(HANDLE);

unsafe impl Send for DuplicatedThreadHandle {}
unsafe impl Sync for DuplicatedThreadHandle {}

impl DuplicatedThreadHandle {
    fn current() -> std::io::Result<Self> {
        let mut handle: HANDLE = std::ptr::null_mut();
        let ok = unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                GetCurrentThread(),
                GetCurrentProcess(),
                &mut handle,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if ok == 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(DuplicatedThreadHandle(handle))
    }

    fn queue_wake(&self) {
        unsafe {
            QueueUserAPC(Some(wake_apc), self.0, 0);
        }
    }
}

impl Drop for DuplicatedThreadHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

struct SocketEvent(HANDLE);

impl SocketEvent {
    fn create() -> std::io::Result<Self> {
        let h = unsafe { WSACreateEvent() };
        if h.is_null() {
            return Err(std::io::Error::last_os_error());
        }
        Ok(SocketEvent(h))
    }
}

impl Drop for SocketEvent {
    fn drop(&mut self) {
        unsafe {
            WSACloseEvent(self.0);
        }
    }
}

pub(super) fn poll_i11e(
    fds: &mut [PollFd],
    timeout_ms: i32,
    ctx: &Arc<InterruptContext>,
) -> Result<usize> {
    if fds.len() > max_interruptible_fds() {
        return Err(I11eError::Unsupported);
    }

    let thread_handle =
        DuplicatedThreadHandle::current().map_err(I11eError::ResourceExhausted)?;
    let thread_handle = Arc::new(thread_handle);
    let hook_handle = Arc::clone(&thread_handle);
    let hook = WakeHook::new(move || hook_handle.queue_wake());

    if matches!(ctx.prepare(hook), PrepareOutcome::AlreadyPending) {
        return Err(I11eError::Interrupted);
    }

    let events: Vec<SocketEvent> = match fds
        .iter()
        .map(|_| SocketEvent::create())
        .collect::<std::io::Result<Vec<_>>>()
    {
        Ok(events) => events,
        Err(e) => {
            ctx.finish();
            return Err(I11eError::ResourceExhausted(e));
        }
    };

    for (pfd, ev) in fds.iter().zip(events.iter()) {
        unsafe {
            WSAEventSelect(pfd.fd as SOCKET, ev.0, events_to_network_mask(pfd.events));
        }
    }

    let handles: Vec<HANDLE> = events.iter().map(|e| e.0).collect();
    let wait_result = unsafe {
        WaitForMultipleObjectsEx(
            handles.len() as u32,
            handles.as_ptr(),
            0,
            timeout_ms as u32,
            1,
        )
    };

    match ctx.finish() {
        FinishOutcome::Interrupted => Err(I11eError::Interrupted),
        FinishOutcome::Ok => {
            if wait_result == WAIT_FAILED {
                return Err(I11eError::Io(std::io::Error::last_os_error()));
            }
            if wait_result == WAIT_TIMEOUT {
                return Ok(0);
            }

            let mut ready = 0;
            for ((pfd, ev), _) in fds.iter_mut().zip(events.iter()).zip(0..) {
                let mut net_events = WSANETWORKEVENTS {
                    lNetworkEvents: 0,
                    iErrorCode: [0; 10],
                };
                let rc =
                    unsafe { WSAEnumNetworkEvents(pfd.fd as SOCKET, ev.0, &mut net_events) };
                if rc == 0 {
                    pfd.revents = network_mask_to_events(net_events.lNetworkEvents as u32);
                    if net_events.lNetworkEvents != 0 {
                        ready += 1;
                    }
                }
            }
            Ok(ready)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_mask_round_trip_for_read_interest() {
        let mask = events_to_network_mask(Events::IN);
        assert_eq!(network_mask_to_events(mask as u32), Events::IN);
    }

    #[test]
    fn event_mask_round_trip_for_write_interest() {
        let mask = events_to_network_mask(Events::OUT);
        assert_eq!(network_mask_to_events(mask as u32), Events::OUT);
    }

    #[test]
    fn default_interruptible_fd_cap_matches_configured_options() {
        assert_eq!(
            max_interruptible_fds(),
            crate::config::Options::default().max_windows_wait_fds
        );
    }
}
