//!
//! Runtime Context
//!
//! A `Runtime` owns one global lock and the bookkeeping for the logical
//! threads created under it. The OS thread that calls `Runtime::init`
//! becomes the first logical thread and holds the global lock on return;
//! every thread spawned from it inherits the same runtime.
//!
//! The runtime of the calling thread is reachable through a thread-local
//! handle, which is what the free functions and the synchronization
//! primitives use. Independent runtimes can coexist in one process (each
//! test creates its own), but a thread belongs to at most one at a time.
//!

use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::glock::{GlobalLock, Unprotected};
use crate::identity::ThreadId;
use crate::thread::Registry;

thread_local! {
    static CURRENT_RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

pub(crate) struct Shared {
    pub(crate) glock: GlobalLock,
    pub(crate) config: Config,
    pub(crate) registry: Mutex<Registry>,
    /// Signalled whenever a thread stores its outcome.
    pub(crate) finished: Condvar,
}

#[derive(Clone)]
pub struct Runtime {
    pub(crate) shared: Arc<Shared>,
}

impl Runtime {
    /// Create a runtime and make the calling thread its first logical
    /// thread, holding the global lock.
    pub fn init(config: Config) -> Result<Runtime> {
        if CURRENT_RUNTIME.with(|rt| rt.borrow().is_some()) {
            return Err(Error::AlreadyInitialized);
        }

        let runtime = Runtime {
            shared: Arc::new(Shared {
                glock: GlobalLock::new(),
                config,
                registry: Mutex::new(Registry::default()),
                finished: Condvar::new(),
            }),
        };

        let me = ThreadId::current();
        runtime.shared.glock.acquire(me)?;
        set_current(Some(runtime.clone()));
        debug!(thread = %me, "runtime initialized");
        Ok(runtime)
    }

    /// Tear the runtime down from the thread that initialized it.
    ///
    /// Fails with `Busy` while any spawned thread is still registered,
    /// i.e. running, or finished but not yet joined.
    pub fn shutdown(self) -> Result<()> {
        let me = ThreadId::current();
        if !self.is_current() {
            return Err(Error::NotInitialized);
        }

        let live = self.registry().live();
        if live > 0 {
            debug!(live, "runtime shutdown refused");
            return Err(Error::Busy { object: "runtime" });
        }

        self.registry().names.remove(&me);
        self.shared.glock.release(me)?;
        set_current(None);
        debug!(thread = %me, "runtime shut down");
        Ok(())
    }

    /// Runtime of the calling thread.
    pub fn current() -> Result<Runtime> {
        CURRENT_RUNTIME.with(|rt| rt.borrow().clone().ok_or(Error::NotInitialized))
    }

    /// Runtime of the calling thread, provided the caller holds its global
    /// lock. Every operation that may suspend the caller starts here.
    pub(crate) fn protected() -> Result<(Runtime, ThreadId)> {
        let runtime = Runtime::current()?;
        let me = ThreadId::current();
        if !runtime.shared.glock.is_held_by(me) {
            return Err(Error::NotOwner {
                caller: me,
                object: "global lock",
            });
        }
        Ok((runtime, me))
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn global_lock(&self) -> &GlobalLock {
        &self.shared.glock
    }

    /// Release the global lock around `op`, re-acquiring it afterwards.
    pub fn blocking<R>(&self, op: impl FnOnce() -> R) -> Result<R> {
        self.shared.glock.blocking(ThreadId::current(), op)
    }

    /// Scoped release for callers that need the guard itself.
    pub fn unprotected(&self) -> Result<Unprotected<'_>> {
        Unprotected::new(&self.shared.glock, ThreadId::current())
    }

    /// Number of spawned threads not yet joined or reclaimed.
    pub fn live_threads(&self) -> usize {
        self.registry().live()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn make_current(&self) {
        set_current(Some(self.clone()));
    }

    pub(crate) fn clear_current() {
        set_current(None);
    }

    fn is_current(&self) -> bool {
        CURRENT_RUNTIME.with(|rt| {
            rt.borrow()
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(&current.shared, &self.shared))
        })
    }
}

fn set_current(runtime: Option<Runtime>) {
    CURRENT_RUNTIME.with(|rt| *rt.borrow_mut() = runtime);
}

/// Initialize a runtime for the calling thread using `Config::from_env`.
pub fn init() -> Result<Runtime> {
    Runtime::init(Config::from_env()?)
}
