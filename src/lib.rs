//! A cooperative interruption core for blocking waits.
//!
//! A thread can attach an [`InterruptContext`](context::InterruptContext) to
//! itself; any other thread holding a clone of that context can then
//! [`raise`](context::InterruptContext::raise) it to cut short whatever
//! blocking wait the attached thread is currently performing through this
//! crate -- a semaphore wait ([`sem`]), a readiness wait
//! ([`poll_interruptible`]), or one of the I/O wrappers in [`io`].
//!
//! This is a direct port of the interruption mechanism at the heart of
//! VLC's input/demux pipeline (`src/misc/interrupt.c`): cancelling a blocked
//! network read or a stalled semaphore wait without `pthread_cancel`,
//! signals, or giving every blocking primitive a bespoke shutdown flag.
//!
//! ```
//! use std::sync::Arc;
//! use i11e::context::{attach, InterruptContext};
//! use i11e::sem::{sem_wait_interruptible, Semaphore, SemWaitOutcome};
//!
//! let ctx = InterruptContext::new();
//! let sem = Semaphore::new(0);
//!
//! let worker_ctx = Arc::clone(&ctx);
//! let worker_sem = Arc::clone(&sem);
//! let worker = std::thread::spawn(move || {
//!     let _guard = attach(worker_ctx);
//!     sem_wait_interruptible(&worker_sem)
//! });
//!
//! std::thread::sleep(std::time::Duration::from_millis(10));
//! ctx.raise();
//! assert_eq!(worker.join().unwrap(), SemWaitOutcome::Interrupted);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod hook;
pub mod io;
pub mod poll;
pub mod sem;

pub use context::{attach, current, AttachGuard, InterruptContext};
pub use error::{I11eError, Result};
pub use poll::{poll_interruptible, Events, PollFd};
pub use sem::{sem_wait_interruptible, sem_wait_interruptible_timeout, SemWaitOutcome, Semaphore};
