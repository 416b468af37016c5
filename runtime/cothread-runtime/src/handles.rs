//!
//! Handle Tables
//!
//! Attributes and synchronization objects live in global tables and are
//! handed to C callers as integer handles, so no Rust type crosses the ABI.
//! Handles are positive and never reused; `0` is never a valid handle.
//!
//! Objects are cloned out of a table before a blocking operation runs, so a
//! table lock is never held across a suspension point.
//!

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

static HANDLE_COUNTER: AtomicI64 = AtomicI64::new(1);

pub(crate) fn next_handle() -> i64 {
    HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct HandleTable<T> {
    items: OnceLock<Mutex<HashMap<i64, T>>>,
}

impl<T> HandleTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            items: OnceLock::new(),
        }
    }

    fn items(&self) -> MutexGuard<'_, HashMap<i64, T>> {
        self.items
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, item: T) -> i64 {
        let handle = next_handle();
        self.items().insert(handle, item);
        handle
    }

    pub(crate) fn remove(&self, handle: i64) -> Option<T> {
        self.items().remove(&handle)
    }

    /// Run `f` on the object behind `handle` with the table locked.
    pub(crate) fn with<R>(&self, handle: i64, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.items().get_mut(&handle).map(f)
    }
}

impl<T: Clone> HandleTable<T> {
    pub(crate) fn get(&self, handle: i64) -> Option<T> {
        self.items().get(&handle).cloned()
    }
}
