//!
//! Logical Thread Identity
//!
//! Every OS thread that touches cothread gets a process-unique `ThreadId`.
//! Threads created through `spawn` are assigned their id by the creator
//! before they start, so the id is known to both sides of the handle;
//! any other thread (e.g. the one calling `init`) is assigned one lazily.
//!

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Comparable identity of a logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Reserve a fresh id for a thread that has not started yet.
    pub(crate) fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Id of the calling OS thread.
    pub fn current() -> Self {
        CURRENT_ID.with(|id| match id.get() {
            Some(id) => id,
            None => {
                let fresh = ThreadId::next();
                id.set(Some(fresh));
                fresh
            }
        })
    }

    /// Bind a reserved id to the calling thread. Called first thing in a
    /// newly spawned thread.
    pub(crate) fn adopt(id: ThreadId) {
        CURRENT_ID.with(|slot| slot.set(Some(id)));
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        ThreadId(raw)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable() {
        assert_eq!(ThreadId::current(), ThreadId::current());
    }

    #[test]
    fn test_distinct_threads_get_distinct_ids() {
        let here = ThreadId::current();
        let there = std::thread::spawn(ThreadId::current).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_adopt_overrides_lazy_id() {
        let reserved = ThreadId::next();
        let seen = std::thread::spawn(move || {
            ThreadId::adopt(reserved);
            ThreadId::current()
        })
        .join()
        .unwrap();
        assert_eq!(seen, reserved);
    }
}
