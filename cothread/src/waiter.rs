//!
//! Wait Nodes
//!
//! One node per suspended thread. Whoever hands a resource to the waiter
//! records the hand-off in the node and wakes it; the waiter only ever
//! checks its own node, so a grant made before it parks is never lost.
//!

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::identity::ThreadId;

pub(crate) struct WaitNode {
    pub(crate) id: ThreadId,
    granted: Mutex<bool>,
    wake: Condvar,
}

impl WaitNode {
    pub(crate) fn new(id: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            id,
            granted: Mutex::new(false),
            wake: Condvar::new(),
        })
    }

    fn granted(&self) -> MutexGuard<'_, bool> {
        self.granted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn grant(&self) {
        *self.granted() = true;
        self.wake.notify_one();
    }

    pub(crate) fn park(&self) {
        let mut granted = self.granted();
        while !*granted {
            granted = self.wake.wait(granted).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Park until granted or `deadline` passes. Returns whether the grant
    /// arrived.
    pub(crate) fn park_until(&self, deadline: Instant) -> bool {
        let mut granted = self.granted();
        while !*granted {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            granted = self
                .wake
                .wait_timeout(granted, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_grant_before_park() {
        let node = WaitNode::new(ThreadId::current());
        node.grant();
        node.park();
        assert!(node.park_until(Instant::now()));
    }

    #[test]
    fn test_grant_from_other_thread() {
        let node = WaitNode::new(ThreadId::current());
        let granter = {
            let node = Arc::clone(&node);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                node.grant();
            })
        };
        node.park();
        granter.join().unwrap();
    }

    #[test]
    fn test_park_until_times_out() {
        let node = WaitNode::new(ThreadId::current());
        let start = Instant::now();
        assert!(!node.park_until(start + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
