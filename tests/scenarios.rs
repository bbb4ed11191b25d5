//! The literal scenarios from this crate's interruption-core design
//! (pre-arm raise, in-flight raise against both a semaphore and a
//! readiness wait, the real-readiness/raise race, and a vectored write),
//! plus the FD-leak stress check.
//!
//! Pipes are POSIX-only, so this whole suite is unix-only; the Windows
//! backend has its own smaller unit-test coverage in `src/poll/windows.rs`.
#![cfg(unix)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use i11e::context::{attach, current, InterruptContext};
use i11e::poll::{poll_interruptible, Events, PollFd};
use i11e::sem::{sem_wait_interruptible, SemWaitOutcome, Semaphore};
use i11e::I11eError;

fn make_pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe(2) failed: {}", std::io::Error::last_os_error());
    (fds[0], fds[1])
}

fn close(fd: i32) {
    unsafe {
        libc::close(fd);
    }
}

/// S1 -- no context attached: poll_interruptible behaves like a plain
/// poll(2) and times out cleanly with nothing ready, across a few
/// representative timeouts.
#[rstest::rstest]
#[case::immediate(0)]
#[case::short(10)]
#[case::moderate(50)]
fn s1_no_context_attached_times_out_cleanly(#[case] timeout_ms: i32) {
    assert!(current().is_none());

    let (r, w) = make_pipe();
    let mut fds = [PollFd::new(r, Events::IN)];

    let ready =
        poll_interruptible(&mut fds, timeout_ms).expect("no context attached: must not fail");
    assert_eq!(ready, 0);
    assert_eq!(fds[0].revents, Events::NONE);

    close(r);
    close(w);
}

/// S2 -- pre-arm raise: raising before the wait begins must return
/// Interrupted immediately and must not touch the semaphore's value.
#[test]
fn s2_pre_arm_raise_returns_interrupted_immediately() {
    let ctx = InterruptContext::new();
    let _guard = attach(Arc::clone(&ctx));
    let sem = Semaphore::new(0);

    ctx.raise();
    let outcome = sem_wait_interruptible(&sem);

    assert_eq!(outcome, SemWaitOutcome::Interrupted);
    assert_eq!(sem.value(), 0);
}

/// S3 -- in-flight raise against a semaphore wait: the waiter unblocks
/// with Interrupted well within a scheduling quantum of the raise.
#[test]
fn s3_in_flight_raise_unblocks_semaphore_wait() {
    let ctx = InterruptContext::new();
    let sem = Semaphore::new(0);

    let waiter_ctx = Arc::clone(&ctx);
    let waiter_sem = Arc::clone(&sem);
    let start = std::time::Instant::now();
    let waiter = thread::spawn(move || {
        let _guard = attach(waiter_ctx);
        let outcome = sem_wait_interruptible(&waiter_sem);
        (outcome, start.elapsed())
    });

    thread::sleep(Duration::from_millis(10));
    ctx.raise();

    let (outcome, elapsed) = waiter.join().unwrap();
    assert_eq!(outcome, SemWaitOutcome::Interrupted);
    assert!(elapsed < Duration::from_secs(1), "unblocked too slowly: {elapsed:?}");
}

/// S4 -- in-flight raise against a poll wait: returns Interrupted, and
/// the wake object is fully closed afterward (checked indirectly by the
/// leak-stress test below, and directly here by the call simply
/// returning instead of hanging).
#[test]
fn s4_in_flight_raise_unblocks_poll_wait() {
    let ctx = InterruptContext::new();
    let (r, w) = make_pipe();

    let waiter_ctx = Arc::clone(&ctx);
    let waiter = thread::spawn(move || {
        let _guard = attach(waiter_ctx);
        let mut fds = [PollFd::new(r, Events::IN)];
        poll_interruptible(&mut fds, -1)
    });

    thread::sleep(Duration::from_millis(10));
    ctx.raise();

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(I11eError::Interrupted)));

    close(r);
    close(w);
}

/// S5 -- real readiness racing a raise: exactly one of "readiness
/// observed" or "interrupted" happens, never both, never neither.
#[test]
fn s5_real_readiness_races_raise_without_double_or_lost_signal() {
    for _ in 0..50 {
        let ctx = InterruptContext::new();
        let (r, w) = make_pipe();

        let waiter_ctx = Arc::clone(&ctx);
        let waiter = thread::spawn(move || {
            let _guard = attach(waiter_ctx);
            let mut fds = [PollFd::new(r, Events::IN)];
            poll_interruptible(&mut fds, -1).map(|ready| (ready, fds[0].revents))
        });

        // Race the writer and the raiser against the waiter entering its wait.
        thread::sleep(Duration::from_millis(5));
        let w2 = w;
        let writer = thread::spawn(move || {
            let _ = unsafe { libc::write(w2, [1u8].as_ptr() as *const _, 1) };
        });
        ctx.raise();

        let result = waiter.join().unwrap();
        writer.join().unwrap();

        match result {
            Ok((ready, revents)) => {
                assert_eq!(ready, 1);
                assert!(revents.contains(Events::IN));
            }
            Err(I11eError::Interrupted) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }

        close(r);
        close(w);
    }
}

/// S6 -- vectored write: writev_i11e delivers both buffers, in order,
/// and reports the combined length.
#[cfg(unix)]
#[test]
fn s6_vectored_write_delivers_both_buffers_in_order() {
    let (r, w) = make_pipe();

    let first = b"hello, ";
    let second = b"world!";
    let iov = [
        libc::iovec {
            iov_base: first.as_ptr() as *mut _,
            iov_len: first.len(),
        },
        libc::iovec {
            iov_base: second.as_ptr() as *mut _,
            iov_len: second.len(),
        },
    ];

    let written = unsafe { i11e::io::writev_i11e(w, &iov) }.unwrap();
    assert_eq!(written, first.len() + second.len());

    let mut buf = [0u8; 13];
    let read = i11e::io::read_i11e(r, &mut buf).unwrap();
    assert_eq!(read, 13);
    assert_eq!(&buf, b"hello, world!");

    close(r);
    close(w);
}

/// Repeated interrupted and uninterrupted poll waits do not leak the
/// wake object's descriptors.
#[test]
fn invariant6_no_fd_leak_under_stress() {
    fn open_fd_count() -> usize {
        std::fs::read_dir("/proc/self/fd")
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    let ctx = InterruptContext::new();
    let _guard = attach(Arc::clone(&ctx));
    let (r, w) = make_pipe();

    let baseline = open_fd_count();
    if baseline == 0 {
        // /proc not available on this platform/sandbox; nothing to check.
        close(r);
        close(w);
        return;
    }

    for i in 0..200 {
        let mut fds = [PollFd::new(r, Events::IN)];
        if i % 2 == 0 {
            ctx.raise();
        }
        let _ = poll_interruptible(&mut fds, 0);
    }

    assert_eq!(open_fd_count(), baseline, "wake object descriptors leaked");

    close(r);
    close(w);
}
