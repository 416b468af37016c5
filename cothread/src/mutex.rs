//!
//! Mutex Implementation for cothread
//!
//! A non-recursive mutual exclusion lock whose contention path gives up the
//! global lock, so a thread waiting for a mutex never stalls the rest of the
//! runtime. Ownership is handed directly from the unlocking thread to the
//! oldest waiter.
//!
//! Usage:
//! ```
//! use cothread::{Config, Mutex, Runtime};
//!
//! let rt = Runtime::init(Config::default()).unwrap();
//! let m = Mutex::new();
//! m.lock().unwrap();
//! assert!(m.lock().is_err()); // relocking by the owner is rejected
//! m.unlock().unwrap();
//! m.destroy().unwrap();
//! rt.shutdown().unwrap();
//! ```
//!

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as NativeMutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identity::ThreadId;
use crate::runtime::Runtime;
use crate::waiter::WaitNode;

const OBJECT: &str = "mutex";

struct MutexState {
    owner: Option<ThreadId>,
    waiters: VecDeque<Arc<WaitNode>>,
    /// Threads inside a condition wait that will re-acquire this mutex.
    cond_waiters: usize,
    destroyed: bool,
}

pub(crate) struct MutexInner {
    state: NativeMutex<MutexState>,
}

impl MutexInner {
    fn state(&self) -> MutexGuard<'_, MutexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give ownership to `node` right away if the mutex is free, otherwise
    /// queue it behind the current waiters.
    pub(crate) fn enqueue_or_grant(&self, node: Arc<WaitNode>) {
        let mut state = self.state();
        if state.owner.is_none() {
            state.owner = Some(node.id);
            node.grant();
        } else {
            state.waiters.push_back(node);
        }
    }

    fn release(&self, me: ThreadId) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        release_locked(&mut state, me)
    }

    /// Release on behalf of a condition wait. The caller holds the
    /// condition variable's internal lock across this call.
    pub(crate) fn release_for_wait(&self, me: ThreadId) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        release_locked(&mut state, me)?;
        state.cond_waiters += 1;
        Ok(())
    }

    pub(crate) fn end_wait(&self) {
        let mut state = self.state();
        state.cond_waiters = state.cond_waiters.saturating_sub(1);
    }
}

fn release_locked(state: &mut MutexState, me: ThreadId) -> Result<()> {
    if state.owner != Some(me) {
        return Err(Error::NotOwner {
            caller: me,
            object: OBJECT,
        });
    }
    state.owner = state.waiters.pop_front().map(|next| {
        trace!(from = %me, to = %next.id, "mutex handoff");
        next.grant();
        next.id
    });
    Ok(())
}

#[derive(Clone)]
pub struct Mutex {
    pub(crate) inner: Arc<MutexInner>,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MutexInner {
                state: NativeMutex::new(MutexState {
                    owner: None,
                    waiters: VecDeque::new(),
                    cond_waiters: 0,
                    destroyed: false,
                }),
            }),
        }
    }

    /// Lock the mutex, suspending the caller while another thread owns it.
    pub fn lock(&self) -> Result<()> {
        let (runtime, me) = Runtime::protected()?;

        let node = {
            let mut state = self.inner.state();
            if state.destroyed {
                return Err(Error::Destroyed { object: OBJECT });
            }
            match state.owner {
                None => {
                    state.owner = Some(me);
                    return Ok(());
                }
                Some(owner) if owner == me => {
                    return Err(Error::WouldDeadlock { object: OBJECT });
                }
                Some(_) => {}
            }
            let node = WaitNode::new(me);
            state.waiters.push_back(Arc::clone(&node));
            node
        };

        trace!(thread = %me, "mutex contended");
        runtime.blocking(|| node.park())
    }

    pub fn try_lock(&self) -> Result<()> {
        let me = ThreadId::current();
        let mut state = self.inner.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if state.owner.is_some() {
            return Err(Error::Busy { object: OBJECT });
        }
        state.owner = Some(me);
        Ok(())
    }

    pub fn unlock(&self) -> Result<()> {
        self.inner.release(ThreadId::current())
    }

    /// Mark the mutex unusable. Fails while it is owned, contended, or
    /// referenced by a pending condition wait.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.inner.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if state.owner.is_some() || !state.waiters.is_empty() || state.cond_waiters > 0 {
            warn!(owner = ?state.owner, waiters = state.waiters.len(), "refusing to destroy busy mutex");
            return Err(Error::Busy { object: OBJECT });
        }
        state.destroyed = true;
        Ok(())
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.inner.state().owner
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    pub fn is_owned_by_current(&self) -> bool {
        self.owner() == Some(ThreadId::current())
    }

    /// Number of threads suspended in `lock`.
    pub fn waiters(&self) -> usize {
        self.inner.state().waiters.len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
