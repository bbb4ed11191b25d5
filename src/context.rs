//! Interruption context (C1) and thread attachment (C2).
//!
//! Grounded on `vlc_interrupt_init`/`_deinit`/`_set`/`_raise` in
//! `src/misc/interrupt.c`. The C original manages a process-wide reference
//! count and a lazily created/destroyed `pthread_key_t` because POSIX TLS
//! keys are a scarce, explicitly-managed resource. Rust's `thread_local!`
//! is compiled in rather than allocated at runtime, so there is no key to
//! create or destroy; `CONTEXT_REFS` below is kept anyway so the
//! single-context-alive-iff-slot-exists property stays directly testable,
//! and because it costs nothing to maintain.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::hook::WakeHook;

static CONTEXT_REFS: AtomicUsize = AtomicUsize::new(0);

/// Number of [`InterruptContext`]s currently alive. Exposed for tests that
/// check that the thread-local slot exists if and only if a context is
/// alive; not meant for production decision-making.
pub fn live_context_count() -> usize {
    CONTEXT_REFS.load(Ordering::SeqCst)
}

struct Inner {
    pending: bool,
    hook: Option<WakeHook>,
}

/// Per-waiter interruption state: the pending flag, the serializing lock,
/// and the optional wake hook. See module docs and the design's C1.
pub struct InterruptContext {
    inner: Mutex<Inner>,
    #[cfg(debug_assertions)]
    attached: AtomicBool,
}

impl InterruptContext {
    /// Create a fresh, detached context.
    pub fn new() -> Arc<Self> {
        CONTEXT_REFS.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                pending: false,
                hook: None,
            }),
            #[cfg(debug_assertions)]
            attached: AtomicBool::new(false),
        })
    }

    /// Request cancellation of whatever is waiting under this context.
    ///
    /// Reentrant and callable from any thread. Matches `vlc_interrupt_raise`:
    /// takes the lock, sets the pending flag, and fires the installed hook
    /// (if any) before releasing it, so a concurrent `finish` cannot observe
    /// the hook mid-invocation.
    pub fn raise(&self) {
        let mut inner = self.inner.lock();
        inner.pending = true;
        if let Some(hook) = inner.hook.as_mut() {
            trace!("raise: waking an armed wait");
            hook.fire();
        } else {
            trace!("raise: no wait armed yet, leaving pending flag set");
        }
    }

    /// Arm the context with a wake hook ahead of a blocking wait.
    ///
    /// Returns [`Armed`](PrepareOutcome::Armed) with the hook installed, or
    /// [`AlreadyPending`](PrepareOutcome::AlreadyPending) if an interruption
    /// was already pending -- in which case the flag is consumed and no hook
    /// is installed, so the caller must not enter the blocking wait.
    pub(crate) fn prepare(&self, hook: WakeHook) -> PrepareOutcome {
        let mut inner = self.inner.lock();
        debug_assert!(inner.hook.is_none(), "prepare() called while already armed");
        if inner.pending {
            inner.pending = false;
            PrepareOutcome::AlreadyPending
        } else {
            inner.hook = Some(hook);
            PrepareOutcome::Armed
        }
    }

    /// Retract the wake hook and report whether an interruption landed.
    ///
    /// Must be called by the same thread that called `prepare`, after the
    /// blocking wait returns (for any reason, including asynchronous
    /// cancellation of the waiter). Taking the lock here means any `raise`
    /// already in progress finishes firing the hook before `finish` returns,
    /// so the caller may safely free resources the hook would have touched.
    pub(crate) fn finish(&self) -> FinishOutcome {
        let mut inner = self.inner.lock();
        inner.hook = None;
        if inner.pending {
            inner.pending = false;
            FinishOutcome::Interrupted
        } else {
            FinishOutcome::Ok
        }
    }
}

impl Drop for InterruptContext {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(
            !self.attached.load(Ordering::SeqCst),
            "InterruptContext dropped while still attached to a thread"
        );
        debug_assert!(
            self.inner.lock().hook.is_none(),
            "InterruptContext dropped with a hook still armed"
        );
        CONTEXT_REFS.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrepareOutcome {
    Armed,
    AlreadyPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinishOutcome {
    Ok,
    Interrupted,
}

struct CurrentSlot(RefCell<Option<Arc<InterruptContext>>>);

impl Drop for CurrentSlot {
    fn drop(&mut self) {
        // Matches `vlc_interrupt_destructor`: a context still attached when
        // its owning thread exits means some scope forgot to detach it.
        #[cfg(debug_assertions)]
        if let Some(ctx) = self.0.get_mut().take() {
            ctx.attached.store(false, Ordering::SeqCst);
            debug_assert!(
                false,
                "thread exited with an interruption context still attached"
            );
        }
    }
}

thread_local! {
    static CURRENT: CurrentSlot = const { CurrentSlot(RefCell::new(None)) };
}

/// Install `new` as this thread's active interruption context, returning
/// whatever was previously attached. Matches `vlc_interrupt_set`.
///
/// # Panics
/// In debug builds, panics if `new` is already attached to some thread, or
/// if the bookkeeping otherwise indicates a double-attach.
pub fn set(new: Option<Arc<InterruptContext>>) -> Option<Arc<InterruptContext>> {
    CURRENT.with(|slot| {
        let mut guard = slot.0.borrow_mut();
        let old = guard.take();

        #[cfg(debug_assertions)]
        {
            if let Some(o) = &old {
                let was_attached = o.attached.swap(false, Ordering::SeqCst);
                debug_assert!(was_attached, "detached context was not marked attached");
            }
            if let Some(n) = &new {
                let already = n.attached.swap(true, Ordering::SeqCst);
                debug_assert!(!already, "context is already attached to another thread");
            }
        }

        debug!(
            "thread-local interruption context updated: had_previous={}, installing_new={}",
            old.is_some(),
            new.is_some()
        );
        *guard = new;
        old
    })
}

/// Attach `ctx` to the calling thread, returning a guard that restores the
/// previous attachment (if any) when dropped. Prefer this over raw `set`
/// calls: it pairs attach/detach exception-safely, including across panics.
pub fn attach(ctx: Arc<InterruptContext>) -> AttachGuard {
    let previous = set(Some(ctx));
    AttachGuard { previous }
}

/// RAII guard returned by [`attach`]. Restores the previous context on drop.
pub struct AttachGuard {
    previous: Option<Arc<InterruptContext>>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        set(self.previous.take());
    }
}

/// The context currently attached to the calling thread, if any.
pub fn current() -> Option<Arc<InterruptContext>> {
    CURRENT.with(|slot| slot.0.borrow().clone())
}
