//! Counting semaphore and its interruptible wait (C4).
//!
//! The semaphore itself is a condvar-guarded counter: a `Mutex<u32>`
//! paired with a `Condvar`. `sem_wait_interruptible` layers
//! the arm/disarm protocol on top, grounded on `vlc_sem_wait_i11e` in
//! `src/misc/interrupt.c`: the wake hook for a semaphore wait is simply
//! "post the semaphore", so a raise unblocks the waiter exactly as a real
//! post would.

use std::sync::Arc;
use std::time::Duration;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::context::{self, FinishOutcome, InterruptContext, PrepareOutcome};
use crate::hook::WakeHook;

/// A counting semaphore usable with [`sem_wait_interruptible`].
pub struct Semaphore {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        })
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Take a permit without blocking if one is immediately available.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Release a permit, waking at most one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }

    pub fn value(&self) -> u32 {
        *self.count.lock()
    }
}

/// Outcome of [`sem_wait_interruptible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemWaitOutcome {
    /// The semaphore was acquired normally.
    Acquired,
    /// The wait was cut short by a cooperative interruption; the semaphore
    /// was not decremented (or, in the post-race case, a genuine post was
    /// consumed "instead of" the interruption -- see module docs on C4).
    Interrupted,
}

/// Wait on `sem`, cooperating with the calling thread's attached
/// interruption context (if any).
///
/// If no context is attached, this delegates straight to
/// [`Semaphore::wait`] and always returns `Acquired`, matching
/// `vlc_sem_wait_i11e`'s `ctx == NULL` fast path.
pub fn sem_wait_interruptible(sem: &Arc<Semaphore>) -> SemWaitOutcome {
    let ctx = match context::current() {
        Some(ctx) => ctx,
        None => {
            sem.wait();
            return SemWaitOutcome::Acquired;
        }
    };

    let hook_sem = Arc::clone(sem);
    let hook = WakeHook::new(move || hook_sem.post());

    match ctx.prepare(hook) {
        PrepareOutcome::AlreadyPending => {
            trace!("sem_wait_interruptible: interruption was already pending");
            SemWaitOutcome::Interrupted
        }
        PrepareOutcome::Armed => {
            sem.wait();
            match ctx.finish() {
                FinishOutcome::Interrupted => SemWaitOutcome::Interrupted,
                FinishOutcome::Ok => SemWaitOutcome::Acquired,
            }
        }
    }
}

/// As [`sem_wait_interruptible`], but bounded by `timeout`. Not present in
/// the C original (which has no timed semaphore wait at all) but a natural
/// extension once the arm/disarm protocol is in place, and useful for
/// callers that want to poll for shutdown without an unbounded block.
pub fn sem_wait_interruptible_timeout(
    sem: &Arc<Semaphore>,
    timeout: Duration,
) -> Option<SemWaitOutcome> {
    let ctx = match context::current() {
        Some(ctx) => ctx,
        None => {
            let mut count = sem.count.lock();
            let deadline = std::time::Instant::now() + timeout;
            while *count == 0 {
                let now = std::time::Instant::now();
                if now >= deadline {
                    return None;
                }
                let (guard, timed_out) = sem.condvar.wait_for(&mut count, deadline - now);
                count = guard;
                if timed_out.timed_out() && *count == 0 {
                    return None;
                }
            }
            *count -= 1;
            return Some(SemWaitOutcome::Acquired);
        }
    };

    let hook_sem = Arc::clone(sem);
    let hook = WakeHook::new(move || hook_sem.post());

    match ctx.prepare(hook) {
        PrepareOutcome::AlreadyPending => Some(SemWaitOutcome::Interrupted),
        PrepareOutcome::Armed => {
            let mut count = sem.count.lock();
            let deadline = std::time::Instant::now() + timeout;
            let mut acquired = false;
            while *count == 0 {
                let now = std::time::Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, timed_out) = sem.condvar.wait_for(&mut count, deadline - now);
                count = guard;
                if timed_out.timed_out() && *count == 0 {
                    break;
                }
            }
            if *count > 0 {
                *count -= 1;
                acquired = true;
            }
            drop(count);

            match ctx.finish() {
                FinishOutcome::Interrupted => Some(SemWaitOutcome::Interrupted),
                FinishOutcome::Ok if acquired => Some(SemWaitOutcome::Acquired),
                FinishOutcome::Ok => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{attach, InterruptContext};
    use std::thread;

    #[test]
    fn semaphore_post_and_wait_roundtrip() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_wait());
        sem.post();
        assert_eq!(sem.value(), 1);
        sem.wait();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn wait_with_no_attached_context_always_acquires() {
        let sem = Semaphore::new(1);
        assert_eq!(sem_wait_interruptible(&sem), SemWaitOutcome::Acquired);
    }

    #[test]
    fn pre_arm_raise_returns_interrupted_without_consuming_the_semaphore() {
        let ctx = InterruptContext::new();
        let _guard = attach(Arc::clone(&ctx));
        let sem = Semaphore::new(0);

        ctx.raise();
        let outcome = sem_wait_interruptible(&sem);

        assert_eq!(outcome, SemWaitOutcome::Interrupted);
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn in_flight_raise_unblocks_the_waiter() {
        let ctx = InterruptContext::new();
        let sem = Semaphore::new(0);

        let waiter_ctx = Arc::clone(&ctx);
        let waiter_sem = Arc::clone(&sem);
        let waiter = thread::spawn(move || {
            let _guard = attach(waiter_ctx);
            sem_wait_interruptible(&waiter_sem)
        });

        thread::sleep(std::time::Duration::from_millis(20));
        ctx.raise();

        assert_eq!(waiter.join().unwrap(), SemWaitOutcome::Interrupted);
    }

    #[test]
    fn timeout_variant_returns_none_when_nothing_posts_in_time() {
        let sem = Semaphore::new(0);
        let outcome = sem_wait_interruptible_timeout(&sem, Duration::from_millis(20));
        assert_eq!(outcome, None);
    }

    proptest::proptest! {
        #[test]
        fn any_number_of_raises_before_wait_still_yields_interrupted(n in 1u32..20) {
            let ctx = InterruptContext::new();
            let _guard = attach(Arc::clone(&ctx));
            let sem = Semaphore::new(0);

            for _ in 0..n {
                ctx.raise();
            }

            let outcome = sem_wait_interruptible(&sem);
            proptest::prop_assert_eq!(outcome, SemWaitOutcome::Interrupted);
            proptest::prop_assert_eq!(sem.value(), 0);
        }
    }
}
