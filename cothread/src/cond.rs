//!
//! Condition Variables
//!
//! `wait` releases the caller's mutex and joins the wait queue as a single
//! step under the condition variable's internal lock, which `signal` and
//! `broadcast` also take, so a notification can never fall between the two.
//!
//! Woken waiters are not simply unparked. `signal` and `broadcast` move them
//! onto the mutex's own queue (or hand them the mutex outright if it is
//! free), and a waiter only resumes once it owns the mutex again. Waiters
//! woken by one broadcast therefore re-acquire the mutex in the order they
//! started waiting.
//!

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as NativeMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::mutex::{Mutex, MutexInner};
use crate::runtime::Runtime;
use crate::waiter::WaitNode;

const OBJECT: &str = "condition variable";

/// How a timed wait ended. Both outcomes leave the mutex held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Woken,
    TimedOut,
}

struct CondWaiter {
    node: Arc<WaitNode>,
    mutex: Arc<MutexInner>,
}

struct CondState {
    waiters: VecDeque<CondWaiter>,
    destroyed: bool,
}

struct CondInner {
    state: NativeMutex<CondState>,
}

#[derive(Clone)]
pub struct Cond {
    inner: Arc<CondInner>,
}

impl Cond {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CondInner {
                state: NativeMutex::new(CondState {
                    waiters: VecDeque::new(),
                    destroyed: false,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CondState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a notification. `mutex` must be held by the caller and is
    /// held again when this returns.
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        self.wait_inner(mutex, None).map(|_| ())
    }

    pub fn wait_timeout(&self, mutex: &Mutex, timeout: Duration) -> Result<WaitStatus> {
        // An unrepresentable deadline is as good as none.
        let deadline = Instant::now().checked_add(timeout);
        self.wait_inner(mutex, deadline)
    }

    pub fn wait_until(&self, mutex: &Mutex, deadline: Instant) -> Result<WaitStatus> {
        self.wait_inner(mutex, Some(deadline))
    }

    fn wait_inner(&self, mutex: &Mutex, deadline: Option<Instant>) -> Result<WaitStatus> {
        let (runtime, me) = Runtime::protected()?;
        let node = WaitNode::new(me);

        {
            let mut state = self.state();
            if state.destroyed {
                return Err(Error::Destroyed { object: OBJECT });
            }
            if let Some(first) = state.waiters.front() {
                if !Arc::ptr_eq(&first.mutex, &mutex.inner) {
                    return Err(Error::InvalidArgument(
                        "condition variable is already waited on with a different mutex"
                            .to_string(),
                    ));
                }
            }
            mutex.inner.release_for_wait(me)?;
            state.waiters.push_back(CondWaiter {
                node: Arc::clone(&node),
                mutex: Arc::clone(&mutex.inner),
            });
            trace!(thread = %me, waiters = state.waiters.len(), "condition wait");
        }

        let status = runtime.blocking(|| match deadline {
            None => {
                node.park();
                WaitStatus::Woken
            }
            Some(deadline) => {
                if node.park_until(deadline) {
                    return WaitStatus::Woken;
                }
                if self.withdraw(&node) {
                    // Nobody will move us onto the mutex queue; go there
                    // ourselves.
                    mutex.inner.enqueue_or_grant(Arc::clone(&node));
                    node.park();
                    WaitStatus::TimedOut
                } else {
                    // A notification raced the timeout and already queued
                    // us on the mutex.
                    node.park();
                    WaitStatus::Woken
                }
            }
        });
        mutex.inner.end_wait();
        status
    }

    /// Remove `node` from the wait queue. Returns false if a notification
    /// already took it.
    fn withdraw(&self, node: &Arc<WaitNode>) -> bool {
        let mut state = self.state();
        match state.waiters.iter().position(|w| Arc::ptr_eq(&w.node, node)) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Wake the longest-waiting thread, if any.
    pub fn signal(&self) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if let Some(waiter) = state.waiters.pop_front() {
            trace!(thread = %waiter.node.id, "condition signal");
            waiter.mutex.enqueue_or_grant(waiter.node);
        }
        Ok(())
    }

    /// Wake every thread currently waiting.
    pub fn broadcast(&self) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        trace!(waiters = state.waiters.len(), "condition broadcast");
        for waiter in state.waiters.drain(..) {
            waiter.mutex.enqueue_or_grant(waiter.node);
        }
        Ok(())
    }

    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state();
        if state.destroyed {
            return Err(Error::Destroyed { object: OBJECT });
        }
        if !state.waiters.is_empty() {
            warn!(waiters = state.waiters.len(), "refusing to destroy condition variable with waiters");
            return Err(Error::Busy { object: OBJECT });
        }
        state.destroyed = true;
        Ok(())
    }

    /// Number of threads currently waiting.
    pub fn waiters(&self) -> usize {
        self.state().waiters.len()
    }
}

impl Default for Cond {
    fn default() -> Self {
        Self::new()
    }
}
