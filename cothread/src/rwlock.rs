//!
//! RwLock Implementation for cothread
//!
//! Provides a reader-writer lock with multiple concurrent readers or one
//! exclusive writer.
//!
//! ## Writer preference
//!
//! A new reader is queued while a writer holds the lock or is waiting for
//! it, so a steady stream of readers cannot starve writers. The one
//! exception is a thread that already holds a read lock: its nested read is
//! granted immediately, since queueing it behind a writer that waits on the
//! same thread would deadlock.
//!
//! When the lock becomes free the head of the queue is admitted: either a
//! single writer, or every reader up to the first queued writer.
//!
//! Usage:
//! ```
//! use cothread::{Config, RwLock, Runtime};
//!
//! let rt = Runtime::init(Config::default()).unwrap();
//! let rw = RwLock::new();
//!
//! // Read lock (multiple readers can hold simultaneously)
//! rw.read_lock().unwrap();
//! rw.unlock().unwrap();
//!
//! // Write lock (exclusive access)
//! rw.write_lock().unwrap();
//! rw.unlock().unwrap();
//! rt.shutdown().unwrap();
//! ```
//!

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as NativeMutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identity::ThreadId;
use crate::runtime::Runtime;
use crate::waiter::WaitNode;

const OBJECT: &str = "rwlock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Read,
    Write,
}

struct RwWaiter {
    node: Arc<WaitNode>,
    role: Role,
}

struct RwState {
    /// Read locks held, per thread.
    readers: HashMap<ThreadId, usize>,
    reader_total: usize,
    writer: Option<ThreadId>,
    waiters: VecDeque<RwWaiter>,
    destroyed: bool,
}

impl RwState {
    fn writer_queued(&self) -> bool {
        self.waiters.iter().any(|w| w.role == Role::Write)
    }

    fn add_reader(&mut self, id: ThreadId) {
        *self.readers.entry(id).or_insert(0) += 1;
        self.reader_total += 1;
    }

    /// Hand the lock to the head of the queue once nobody holds it.
    fn admit(&mut self) {
        if self.writer.is_some() || self.reader_total > 0 {
            return;
        }
        match self.waiters.front().map(|w| w.role) {
            Some(Role::Write) => {
                if let Some(waiter) = self.waiters.pop_front() {
                    trace!(thread = %waiter.node.id, "rwlock writer admitted");
                    self.writer = Some(waiter.node.id);
                    waiter.node.grant();
                }
            }
            Some(Role::Read) => {
                while self.waiters.front().is_some_and(|w| w.role == Role::Read) {
                    if let Some(waiter) = self.waiters.pop_front() {
                        trace!(thread = %waiter.node.id, "rwlock reader admitted");
                        self.add_reader(waiter.node.id);
                        waiter.node.grant();
                    }
                }
            }
            None => {}
        }
    }
}

#[derive(Clone)]
pub struct RwLock {
    inner: Arc<NativeMutex<RwState>>,
}

impl RwLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NativeMutex::new(RwState {
                readers: HashMap::new(),
                reader_total: 0,
                writer: None,
                waiters: VecDeque::new(),
                destroyed: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, RwState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the lock in `role` without waiting. `Ok(None)` means it
    /// was granted, `Ok(Some(state))` that the caller has to queue.
    fn acquire_now(&self, me: ThreadId, role: Role) -> Result<Option<MutexGuard<'_, RwState>>> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if state.writer == Some(me) {
            return Err(Error::WouldDeadlock { object: OBJECT });
        }

        let holds_read = state.readers.contains_key(&me);
        match role {
            Role::Read => {
                if holds_read || (state.writer.is_none() && !state.writer_queued()) {
                    state.add_reader(me);
                    return Ok(None);
                }
            }
            Role::Write => {
                if holds_read {
                    return Err(Error::WouldDeadlock { object: OBJECT });
                }
                if state.writer.is_none() && state.reader_total == 0 && state.waiters.is_empty() {
                    state.writer = Some(me);
                    return Ok(None);
                }
            }
        }
        Ok(Some(state))
    }

    fn lock_as(&self, role: Role) -> Result<()> {
        let (runtime, me) = Runtime::protected()?;
        let node = match self.acquire_now(me, role)? {
            None => return Ok(()),
            Some(mut state) => {
                let node = WaitNode::new(me);
                state.waiters.push_back(RwWaiter {
                    node: Arc::clone(&node),
                    role,
                });
                node
            }
        };
        trace!(thread = %me, ?role, "rwlock contended");
        runtime.blocking(|| node.park())
    }

    fn try_lock_as(&self, role: Role) -> Result<()> {
        match self.acquire_now(ThreadId::current(), role)? {
            None => Ok(()),
            Some(_) => Err(Error::Busy { object: OBJECT }),
        }
    }

    pub fn read_lock(&self) -> Result<()> {
        self.lock_as(Role::Read)
    }

    pub fn try_read_lock(&self) -> Result<()> {
        self.try_lock_as(Role::Read)
    }

    pub fn write_lock(&self) -> Result<()> {
        self.lock_as(Role::Write)
    }

    pub fn try_write_lock(&self) -> Result<()> {
        self.try_lock_as(Role::Write)
    }

    /// Release whichever lock the caller holds.
    pub fn unlock(&self) -> Result<()> {
        let me = ThreadId::current();
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }

        if state.writer == Some(me) {
            state.writer = None;
        } else if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
            state.reader_total -= 1;
        } else {
            return Err(Error::NotOwner {
                caller: me,
                object: OBJECT,
            });
        }

        state.admit();
        Ok(())
    }

    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if state.writer.is_some() || state.reader_total > 0 || !state.waiters.is_empty() {
            warn!(
                readers = state.reader_total,
                writer = ?state.writer,
                waiters = state.waiters.len(),
                "refusing to destroy busy rwlock"
            );
            return Err(Error::Busy { object: OBJECT });
        }
        state.destroyed = true;
        Ok(())
    }

    /// Read locks currently held, counting nested ones.
    pub fn reader_count(&self) -> usize {
        self.state().reader_total
    }

    pub fn is_write_locked(&self) -> bool {
        self.state().writer.is_some()
    }

    pub fn waiters(&self) -> usize {
        self.state().waiters.len()
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}
