//! The wake hook installed by [`crate::context::prepare`].
//!
//! The C original represents this as a `(callback, opaque)` pair
//! (`void (*callback)(void *); void *data;`) invoked under the context lock
//! by `vlc_interrupt_raise`. A raw function pointer plus an untyped `void *`
//! is exactly the shape of a closure, so we use one: a boxed `FnMut()` that
//! the specific wrapper (semaphore wait, poll wait) supplies when it arms
//! the context, per the "Hook as callback -> message" design note.

/// An action `raise` performs to unblock whichever thread armed it.
///
/// Boxed rather than a bare function pointer because each wrapper closes
/// over different state (a semaphore reference, a wake-object file
/// descriptor, a duplicated thread handle) and the hook must be `Send` so a
/// raising thread, never the armed thread, can invoke it.
pub struct WakeHook(Box<dyn FnMut() + Send>);

impl WakeHook {
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        WakeHook(Box::new(f))
    }

    /// Invoke the hook. Called by `raise` while holding the context lock.
    pub fn fire(&mut self) {
        (self.0)()
    }
}

impl std::fmt::Debug for WakeHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WakeHook(..)")
    }
}
