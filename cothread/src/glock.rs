//!
//! Global Lock
//!
//! The single lock that lets at most one logical thread of a runtime run
//! application code at a time. Waiters are admitted strictly in arrival
//! order: `release` hands the lock directly to the head of the queue, so a
//! thread that releases and immediately re-acquires cannot barge ahead of
//! threads that were already waiting.
//!
//! ## Scoped release
//!
//! `Unprotected` is the only way the rest of the crate gives up the lock
//! around a native blocking call. Constructing it releases the lock, dropping
//! it re-acquires, so the pairing holds on early returns and unwinding.
//!

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{error, trace};

use crate::error::{Error, Result};
use crate::identity::ThreadId;

struct LockState {
    holder: Option<ThreadId>,
    queue: VecDeque<ThreadId>,
}

pub struct GlobalLock {
    state: Mutex<LockState>,
    handoff: Condvar,
}

impl GlobalLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                holder: None,
                queue: VecDeque::new(),
            }),
            handoff: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `id` holds the lock.
    pub fn acquire(&self, id: ThreadId) -> Result<()> {
        let mut state = self.state();
        if state.holder == Some(id) {
            return Err(Error::WouldDeadlock { object: "global lock" });
        }
        if state.holder.is_none() && state.queue.is_empty() {
            state.holder = Some(id);
            return Ok(());
        }

        state.queue.push_back(id);
        trace!(thread = %id, queued = state.queue.len(), "waiting for global lock");
        while state.holder != Some(id) {
            state = self
                .handoff
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Give up the lock held by `id`, handing it to the oldest waiter.
    pub fn release(&self, id: ThreadId) -> Result<()> {
        let mut state = self.state();
        if state.holder != Some(id) {
            return Err(Error::NotOwner {
                caller: id,
                object: "global lock",
            });
        }

        state.holder = state.queue.pop_front();
        if let Some(next) = state.holder {
            trace!(from = %id, to = %next, "global lock handoff");
            drop(state);
            self.handoff.notify_all();
        }
        Ok(())
    }

    pub fn holder(&self) -> Option<ThreadId> {
        self.state().holder
    }

    pub fn is_held_by(&self, id: ThreadId) -> bool {
        self.state().holder == Some(id)
    }

    /// Number of threads parked waiting for the lock.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Run `op` with the lock released, re-acquiring it before returning.
    /// The value produced by `op` is passed through untouched.
    pub fn blocking<R>(&self, id: ThreadId, op: impl FnOnce() -> R) -> Result<R> {
        let _unprotected = Unprotected::new(self, id)?;
        Ok(op())
    }
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the global lock for as long as it lives.
pub struct Unprotected<'a> {
    lock: &'a GlobalLock,
    id: ThreadId,
}

impl<'a> Unprotected<'a> {
    pub fn new(lock: &'a GlobalLock, id: ThreadId) -> Result<Self> {
        lock.release(id)?;
        Ok(Self { lock, id })
    }
}

impl Drop for Unprotected<'_> {
    fn drop(&mut self) {
        // Only fails if `id` already holds the lock again, which nothing in
        // the crate does while a guard is alive.
        if let Err(e) = self.lock.acquire(self.id) {
            error!(thread = %self.id, "re-acquiring global lock failed: {e}");
        }
    }
}
