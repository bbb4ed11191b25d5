//! Interruptible I/O wrappers (C6): arm the readiness multiplexer for a
//! single descriptor, then perform the underlying blocking call exactly
//! once.
//!
//! Grounded on `vlc_read_i11e`/`vlc_write_i11e`/`vlc_readv_i11e`/
//! `vlc_writev_i11e`/`vlc_recvmsg_i11e`/`vlc_recvfrom_i11e`/
//! `vlc_sendmsg_i11e`/`vlc_sendto_i11e` in `src/misc/interrupt.c`. Every
//! wrapper shares the same shape: wait via [`crate::poll::poll_interruptible`]
//! for the one descriptor to become ready, then make the real syscall. As
//! the C original's comment notes, there is no portable way to make the
//! syscall itself atomically non-blocking, so a second thread racing on the
//! same descriptor could still observe a block despite an interruption; this
//! is inherited as-is rather than "fixed" with platform-specific workarounds
//! the original doesn't use either.
//!
//! Once the readiness wait returns, a partial transfer is *not* retried --
//! same as `write_i11e` calling `writev` once, the caller sees however many
//! bytes the single underlying call moved.

use std::io;

use crate::error::{I11eError, Result};
use crate::poll::{poll_interruptible, Events, PollFd, RawDescriptor};

fn cvt_isize(ret: isize) -> Result<usize> {
    if ret < 0 {
        Err(I11eError::Io(io::Error::last_os_error()))
    } else {
        Ok(ret as usize)
    }
}

fn await_ready(fd: RawDescriptor, events: Events) -> Result<()> {
    let mut pfd = [PollFd::new(fd, events)];
    poll_interruptible(&mut pfd, -1)?;
    Ok(())
}

#[cfg(unix)]
mod unix_ops {
    use super::*;

    pub fn read_i11e(fd: RawDescriptor, buf: &mut [u8]) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        cvt_isize(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) } as isize)
    }

    /// # Note
    /// Like `write(2)`, once some but not all bytes are written this can
    /// block for the rest of the transfer regardless of a later
    /// interruption: the readiness wait only covers the initial wait, not
    /// the write call itself.
    pub fn write_i11e(fd: RawDescriptor, buf: &[u8]) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        cvt_isize(unsafe { libc::write(fd, buf.as_ptr() as *const _, buf.len()) } as isize)
    }

    /// Ignores the descriptor's non-blocking flag, same as `vlc_readv_i11e`.
    ///
    /// # Safety
    /// `iov` must describe valid, writable memory for the duration of the
    /// call, as for `readv(2)`.
    pub unsafe fn readv_i11e(fd: RawDescriptor, iov: &mut [libc::iovec]) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        cvt_isize(libc::readv(fd, iov.as_ptr(), iov.len() as libc::c_int) as isize)
    }

    /// # Safety
    /// `iov` must describe valid, readable memory for the duration of the
    /// call, as for `writev(2)`.
    pub unsafe fn writev_i11e(fd: RawDescriptor, iov: &[libc::iovec]) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        cvt_isize(libc::writev(fd, iov.as_ptr(), iov.len() as libc::c_int) as isize)
    }

    /// `MSG_OOB` and `MSG_PEEK` behave as documented; `MSG_WAITALL` is not
    /// supported, matching the C original's note.
    ///
    /// # Safety
    /// `msg` must be a valid `msghdr` as for `recvmsg(2)`.
    pub unsafe fn recvmsg_i11e(
        fd: RawDescriptor,
        msg: &mut libc::msghdr,
        flags: libc::c_int,
    ) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        cvt_isize(libc::recvmsg(fd, msg, flags) as isize)
    }

    /// # Safety
    /// `buf`, `addr`, and `addrlen` must be valid for `recvfrom(2)`.
    pub unsafe fn recvfrom_i11e(
        fd: RawDescriptor,
        buf: &mut [u8],
        flags: libc::c_int,
        addr: *mut libc::sockaddr,
        addrlen: *mut libc::socklen_t,
    ) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        cvt_isize(
            libc::recvfrom(fd, buf.as_mut_ptr() as *mut _, buf.len(), flags, addr, addrlen)
                as isize,
        )
    }

    /// `MSG_EOR`, `MSG_OOB`, and `MSG_NOSIGNAL` all behave as documented.
    ///
    /// # Safety
    /// `msg` must be a valid `msghdr` as for `sendmsg(2)`.
    pub unsafe fn sendmsg_i11e(
        fd: RawDescriptor,
        msg: &libc::msghdr,
        flags: libc::c_int,
    ) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        cvt_isize(libc::sendmsg(fd, msg, flags) as isize)
    }

    /// # Safety
    /// `buf` and `addr` must be valid for `sendto(2)`.
    pub unsafe fn sendto_i11e(
        fd: RawDescriptor,
        buf: &[u8],
        flags: libc::c_int,
        addr: *const libc::sockaddr,
        addrlen: libc::socklen_t,
    ) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        cvt_isize(
            libc::sendto(fd, buf.as_ptr() as *const _, buf.len(), flags, addr, addrlen) as isize,
        )
    }
}

#[cfg(unix)]
pub use unix_ops::*;

#[cfg(windows)]
mod windows_ops {
    use super::*;
    use windows_sys::Win32::Networking::WinSock::{recv, recvfrom, send, sendto, SOCKADDR, SOCKET};

    /// The C original dispatches to the plain CRT `read`/`write` here; this
    /// crate's Windows descriptors are always sockets, so the equivalent
    /// calls are `recv`/`send`.
    pub fn read_i11e(fd: RawDescriptor, buf: &mut [u8]) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        let ret = unsafe { recv(fd as SOCKET, buf.as_mut_ptr(), buf.len() as i32, 0) };
        cvt_isize(ret as isize)
    }

    pub fn write_i11e(fd: RawDescriptor, buf: &[u8]) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        let ret = unsafe { send(fd as SOCKET, buf.as_ptr(), buf.len() as i32, 0) };
        cvt_isize(ret as isize)
    }

    /// Unsupported on this platform, matching `vlc_assert_unreachable()` in
    /// the C original's `_WIN32` branch.
    pub fn readv_i11e(_fd: RawDescriptor, _iov: &mut [()]) -> Result<usize> {
        Err(I11eError::Unsupported)
    }

    pub fn writev_i11e(_fd: RawDescriptor, _iov: &[()]) -> Result<usize> {
        Err(I11eError::Unsupported)
    }

    pub fn sendmsg_i11e(_fd: RawDescriptor, _msg: &(), _flags: i32) -> Result<usize> {
        Err(I11eError::Unsupported)
    }

    pub unsafe fn recvmsg_i11e(
        _fd: RawDescriptor,
        _msg: &mut (),
        _flags: i32,
    ) -> Result<usize> {
        Err(I11eError::Unsupported)
    }

    /// Reports `EAGAIN` as the io::Error kind for `WSAEWOULDBLOCK`, matching
    /// the C original's translation.
    pub unsafe fn recvfrom_i11e(
        fd: RawDescriptor,
        buf: &mut [u8],
        flags: i32,
        addr: *mut SOCKADDR,
        addrlen: *mut i32,
    ) -> Result<usize> {
        await_ready(fd, Events::IN)?;
        let ret = recvfrom(
            fd as SOCKET,
            buf.as_mut_ptr(),
            buf.len() as i32,
            flags,
            addr,
            addrlen,
        );
        cvt_isize(ret as isize)
    }

    pub unsafe fn sendto_i11e(
        fd: RawDescriptor,
        buf: &[u8],
        flags: i32,
        addr: *const SOCKADDR,
        addrlen: i32,
    ) -> Result<usize> {
        await_ready(fd, Events::OUT)?;
        let ret = sendto(fd as SOCKET, buf.as_ptr(), buf.len() as i32, flags, addr, addrlen);
        cvt_isize(ret as isize)
    }
}

#[cfg(windows)]
pub use windows_ops::*;
