//!
//! Blocking Regions
//!
//! Free-function entry points for giving up the global lock. `blocking`
//! wraps an arbitrary native call; `sleep`, `usleep` and `yield_now` are the
//! built-in suspension points; `unprotect` / `protect` expose the raw
//! release/re-acquire pair for callers that manage the region themselves.
//!

use std::time::Duration;

use crate::error::Result;
use crate::identity::ThreadId;
use crate::runtime::Runtime;

/// Run `op` with the global lock released and return its result unchanged.
pub fn blocking<R>(op: impl FnOnce() -> R) -> Result<R> {
    Runtime::current()?.blocking(op)
}

pub fn sleep(duration: Duration) -> Result<()> {
    blocking(|| std::thread::sleep(duration))
}

pub fn usleep(micros: u64) -> Result<()> {
    sleep(Duration::from_micros(micros))
}

/// Let every thread already queued for the global lock run once before the
/// caller continues.
pub fn yield_now() -> Result<()> {
    blocking(std::thread::yield_now)
}

/// Release the global lock without a scope. Must be paired with `protect`.
pub fn unprotect() -> Result<()> {
    Runtime::current()?.global_lock().release(ThreadId::current())
}

pub fn protect() -> Result<()> {
    Runtime::current()?.global_lock().acquire(ThreadId::current())
}

/// Whether the calling thread currently holds its runtime's global lock.
pub fn is_protected() -> bool {
    Runtime::current()
        .map(|rt| rt.global_lock().is_held_by(ThreadId::current()))
        .unwrap_or(false)
}
