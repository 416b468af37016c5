//!
//! Thread Lifecycle
//!
//! Logical threads map 1:1 onto native threads. A new thread's first action
//! is to queue for the global lock, so the creator keeps running until it
//! reaches a suspension point and the child's entry function never overlaps
//! with other application code.
//!
//! ## Bookkeeping
//!
//! Each spawned thread has a slot in the runtime's registry until it is
//! reclaimed: joinable threads by a successful join, detached threads by
//! themselves when they finish. The slot holds the exit value between the
//! thread finishing and the join collecting it.
//!

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::PoisonError;

use tracing::{debug, error, trace, warn};

use crate::attr::{DetachState, ThreadAttr};
use crate::error::{Error, Result};
use crate::identity::ThreadId;
use crate::runtime::Runtime;

type Outcome = std::thread::Result<Box<dyn Any + Send>>;

pub(crate) struct ThreadSlot {
    detached: bool,
    joining: bool,
    outcome: Option<Outcome>,
    native: Option<std::thread::JoinHandle<()>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    threads: HashMap<ThreadId, ThreadSlot>,
    pub(crate) names: HashMap<ThreadId, String>,
}

impl Registry {
    pub(crate) fn live(&self) -> usize {
        self.threads.len()
    }

    fn reclaim(&mut self, id: ThreadId) -> Option<ThreadSlot> {
        self.names.remove(&id);
        self.threads.remove(&id)
    }
}

/// Owned permission to join a thread and collect its exit value.
///
/// Dropping the handle does not detach the thread; it stays joinable through
/// `Runtime::join_raw` with its id, like an unjoined pthread.
pub struct JoinHandle<T> {
    id: ThreadId,
    runtime: Runtime,
    _result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Wait for the thread to finish and return its exit value.
    pub fn join(self) -> Result<T> {
        let value = self.runtime.join_raw(self.id)?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::InvalidArgument(format!("thread {} returned another type", self.id)))
    }

    pub fn detach(self) -> Result<()> {
        self.runtime.detach(self.id)
    }
}

impl Runtime {
    /// Create a logical thread running `entry`.
    pub fn spawn<F, T>(&self, attr: &ThreadAttr, entry: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let me = ThreadId::current();
        if !self.shared.glock.is_held_by(me) {
            return Err(Error::NotOwner {
                caller: me,
                object: "global lock",
            });
        }

        let id = ThreadId::next();
        let name = attr
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{}-{}", self.shared.config.name_prefix, id.as_u64()));
        let mut builder = std::thread::Builder::new().name(name.clone());
        if let Some(bytes) = attr.stack_size().or(self.shared.config.stack_size) {
            builder = builder.stack_size(bytes);
        }
        let detached = attr.detach_state() == DetachState::Detached;

        {
            let mut registry = self.registry();
            registry.threads.insert(
                id,
                ThreadSlot {
                    detached,
                    joining: false,
                    outcome: None,
                    native: None,
                },
            );
            registry.names.insert(id, name);
        }

        let runtime = self.clone();
        match builder.spawn(move || runtime.run(id, entry)) {
            Ok(native) => {
                // The child cannot finish before we give up the global lock,
                // so its slot is still here.
                if let Some(slot) = self.registry().threads.get_mut(&id) {
                    if !slot.detached {
                        slot.native = Some(native);
                    }
                }
            }
            Err(source) => {
                self.registry().reclaim(id);
                warn!(thread = %id, "native thread creation failed: {source}");
                return Err(Error::ResourceExhausted { source });
            }
        }

        debug!(thread = %id, parent = %me, detached, "thread created");
        Ok(JoinHandle {
            id,
            runtime: self.clone(),
            _result: PhantomData,
        })
    }

    fn run<F, T>(self, id: ThreadId, entry: F)
    where
        F: FnOnce() -> T,
        T: Send + 'static,
    {
        ThreadId::adopt(id);
        self.make_current();
        if let Err(e) = self.shared.glock.acquire(id) {
            error!(thread = %id, "thread could not enter the runtime: {e}");
            Runtime::clear_current();
            return;
        }
        trace!(thread = %id, "thread running");

        let outcome = panic::catch_unwind(AssertUnwindSafe(entry))
            .map(|value| Box::new(value) as Box<dyn Any + Send>);
        if outcome.is_err() {
            warn!(thread = %id, "thread body panicked");
        }
        self.finish(id, outcome);

        if let Err(e) = self.shared.glock.release(id) {
            error!(thread = %id, "thread exited without the global lock: {e}");
        }
        Runtime::clear_current();
    }

    fn finish(&self, id: ThreadId, outcome: Outcome) {
        let mut registry = self.registry();
        match registry.threads.get_mut(&id) {
            Some(slot) if !slot.detached => slot.outcome = Some(outcome),
            _ => {
                registry.reclaim(id);
                debug!(thread = %id, "detached thread reclaimed");
            }
        }
        drop(registry);
        self.shared.finished.notify_all();
    }

    /// Join by id, returning the type-erased exit value.
    pub fn join_raw(&self, id: ThreadId) -> Result<Box<dyn Any + Send>> {
        let me = ThreadId::current();
        if id == me {
            return Err(Error::WouldDeadlock { object: "thread" });
        }
        if !self.shared.glock.is_held_by(me) {
            return Err(Error::NotOwner {
                caller: me,
                object: "global lock",
            });
        }

        {
            let mut registry = self.registry();
            let slot = registry.threads.get_mut(&id).ok_or(Error::NoSuchThread(id))?;
            if slot.detached {
                return Err(Error::NotJoinable(id));
            }
            if slot.joining {
                return Err(Error::AlreadyJoined(id));
            }
            slot.joining = true;
        }

        let outcome = self.blocking(|| {
            let mut registry = self.registry();
            let slot = loop {
                let finished = match registry.threads.get(&id) {
                    Some(slot) => slot.outcome.is_some(),
                    None => return Err(Error::NoSuchThread(id)),
                };
                if finished {
                    break registry.reclaim(id);
                }
                registry = self
                    .shared
                    .finished
                    .wait(registry)
                    .unwrap_or_else(PoisonError::into_inner);
            };
            drop(registry);

            let Some(mut slot) = slot else {
                return Err(Error::NoSuchThread(id));
            };
            if let Some(native) = slot.native.take() {
                let _ = native.join();
            }
            slot.outcome.take().ok_or(Error::NoSuchThread(id))
        })??;

        match outcome {
            Ok(value) => {
                debug!(thread = %id, by = %me, "thread joined");
                Ok(value)
            }
            Err(_) => Err(Error::Panicked(id)),
        }
    }

    /// Mark a joinable thread detached. A thread that already finished is
    /// reclaimed on the spot.
    pub fn detach(&self, id: ThreadId) -> Result<()> {
        let mut registry = self.registry();
        let slot = registry.threads.get_mut(&id).ok_or(Error::NoSuchThread(id))?;
        if slot.detached {
            return Err(Error::NotJoinable(id));
        }
        if slot.joining {
            return Err(Error::AlreadyJoined(id));
        }

        if slot.outcome.is_some() {
            registry.reclaim(id);
        } else {
            slot.detached = true;
            slot.native = None;
        }
        debug!(thread = %id, "thread detached");
        Ok(())
    }

    pub fn set_thread_name(&self, id: ThreadId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.contains('\0') {
            return Err(Error::InvalidArgument("thread name contains a NUL byte".to_string()));
        }
        let mut registry = self.registry();
        if !registry.threads.contains_key(&id) && id != ThreadId::current() {
            return Err(Error::NoSuchThread(id));
        }
        registry.names.insert(id, name);
        Ok(())
    }

    /// Name of `id`. The calling thread falls back to its native thread name
    /// when it was never named through the runtime.
    pub fn thread_name(&self, id: ThreadId) -> Option<String> {
        let name = self.registry().names.get(&id).cloned();
        name.or_else(|| {
            (id == ThreadId::current())
                .then(|| std::thread::current().name().map(str::to_owned))
                .flatten()
        })
    }
}

/// Create a logical thread in the calling thread's runtime.
pub fn spawn<F, T>(attr: &ThreadAttr, entry: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Runtime::current()?.spawn(attr, entry)
}

pub fn current() -> ThreadId {
    ThreadId::current()
}

/// Join a thread of the calling thread's runtime by id.
pub fn join(id: ThreadId) -> Result<Box<dyn Any + Send>> {
    Runtime::current()?.join_raw(id)
}

pub fn detach(id: ThreadId) -> Result<()> {
    Runtime::current()?.detach(id)
}

pub fn set_name(name: impl Into<String>) -> Result<()> {
    Runtime::current()?.set_thread_name(ThreadId::current(), name)
}

/// Name of the calling thread, falling back to the native thread name.
pub fn name() -> Option<String> {
    Runtime::current()
        .ok()
        .and_then(|rt| rt.thread_name(ThreadId::current()))
        .or_else(|| std::thread::current().name().map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_spawn_and_join() {
        let rt = Runtime::init(Config::default()).unwrap();

        let handle = rt.spawn(&ThreadAttr::new(), || 6 * 7).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
        assert_eq!(rt.live_threads(), 0);

        rt.shutdown().unwrap();
    }

    #[test]
    fn test_child_waits_for_global_lock() {
        let rt = Runtime::init(Config::default()).unwrap();
        let me = ThreadId::current();

        let handle = rt
            .spawn(&ThreadAttr::new(), || {
                let rt = Runtime::current().unwrap();
                rt.global_lock().holder()
            })
            .unwrap();
        let child = handle.id();

        // The child is queued behind us and cannot have run yet.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(rt.global_lock().is_held_by(me));

        assert_eq!(handle.join().unwrap(), Some(child));
        rt.shutdown().unwrap();
    }

    #[test]
    fn test_join_errors() {
        let rt = Runtime::init(Config::default()).unwrap();

        let handle = rt.spawn(&ThreadAttr::new(), || ()).unwrap();
        let id = handle.id();
        rt.join_raw(id).unwrap();
        assert!(matches!(rt.join_raw(id), Err(Error::NoSuchThread(_))));

        assert!(matches!(
            rt.join_raw(ThreadId::current()),
            Err(Error::WouldDeadlock { .. })
        ));

        let mut attr = ThreadAttr::new();
        attr.set_detach_state(DetachState::Detached).unwrap();
        let detached = rt.spawn(&attr, || ()).unwrap();
        let detached_id = detached.id();
        assert!(matches!(rt.join_raw(detached_id), Err(Error::NotJoinable(_))));
        assert!(matches!(rt.detach(detached_id), Err(Error::NotJoinable(_))));

        // Let the detached thread run to completion.
        while rt.live_threads() > 0 {
            crate::blocking::yield_now().unwrap();
        }
        rt.shutdown().unwrap();
    }

    #[test]
    fn test_detach_running_and_finished() {
        let rt = Runtime::init(Config::default()).unwrap();

        let running = rt.spawn(&ThreadAttr::new(), || ()).unwrap();
        running.detach().unwrap();

        let finished = rt.spawn(&ThreadAttr::new(), || 1u8).unwrap();
        let finished_id = finished.id();
        while rt.registry().threads.get(&finished_id).is_some_and(|s| s.outcome.is_none()) {
            crate::blocking::yield_now().unwrap();
        }
        rt.detach(finished_id).unwrap();
        assert!(matches!(rt.detach(finished_id), Err(Error::NoSuchThread(_))));

        while rt.live_threads() > 0 {
            crate::blocking::yield_now().unwrap();
        }
        rt.shutdown().unwrap();
    }

    #[test]
    fn test_panicking_thread_reports_panicked() {
        let rt = Runtime::init(Config::default()).unwrap();

        let handle = rt
            .spawn(&ThreadAttr::new(), || -> u32 { panic!("boom") })
            .unwrap();
        let id = handle.id();
        assert!(matches!(handle.join(), Err(Error::Panicked(p)) if p == id));
        assert!(rt.global_lock().is_held_by(ThreadId::current()));

        rt.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_refused_with_live_threads() {
        let rt = Runtime::init(Config::default()).unwrap();
        let handle = rt.spawn(&ThreadAttr::new(), || ()).unwrap();

        assert!(matches!(rt.clone().shutdown(), Err(Error::Busy { .. })));

        handle.join().unwrap();
        rt.shutdown().unwrap();
    }

    #[test]
    fn test_thread_names() {
        let rt = Runtime::init(Config::default().name_prefix("unit")).unwrap();

        let handle = rt
            .spawn(&ThreadAttr::new(), || (name(), std::thread::current().name().map(str::to_owned)))
            .unwrap();
        let id = handle.id();
        let (logical, native) = handle.join().unwrap();
        let expected = format!("unit-{}", id.as_u64());
        assert_eq!(logical.as_deref(), Some(expected.as_str()));
        assert_eq!(native.as_deref(), Some(expected.as_str()));

        set_name("main-loop").unwrap();
        assert_eq!(name().as_deref(), Some("main-loop"));
        assert!(set_name("bad\0name").is_err());

        rt.shutdown().unwrap();
    }

    #[test]
    fn test_set_name_rejects_unknown_and_joined_threads() {
        let rt = Runtime::init(Config::default()).unwrap();

        let ghost = ThreadId::from_raw(u64::MAX - 7);
        assert!(matches!(rt.set_thread_name(ghost, "ghost"), Err(Error::NoSuchThread(t)) if t == ghost));
        assert_eq!(rt.thread_name(ghost), None);

        let handle = rt.spawn(&ThreadAttr::new(), || ()).unwrap();
        let id = handle.id();
        rt.set_thread_name(id, "before-join").unwrap();
        assert_eq!(rt.thread_name(id).as_deref(), Some("before-join"));
        handle.join().unwrap();

        assert!(matches!(rt.set_thread_name(id, "after-join"), Err(Error::NoSuchThread(t)) if t == id));
        assert_eq!(rt.thread_name(id), None);

        rt.shutdown().unwrap();
    }

    #[test]
    fn test_unnamed_caller_reports_native_name() {
        let rt = Runtime::init(Config::default()).unwrap();
        let native = std::thread::current().name().map(str::to_owned);
        assert_eq!(rt.thread_name(ThreadId::current()), native);
        assert_eq!(name(), native);
        rt.shutdown().unwrap();
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_spawn_failure_rolls_back() {
        let rt = Runtime::init(Config::default()).unwrap();
        let mut attr = ThreadAttr::new();
        attr.set_stack_size(1 << 62).unwrap();

        let result = rt.spawn(&attr, || ()).map(|h| h.id());
        assert!(matches!(result, Err(Error::ResourceExhausted { .. })));
        assert_eq!(rt.live_threads(), 0);
        assert!(rt.global_lock().is_held_by(ThreadId::current()));

        rt.shutdown().unwrap();
    }

    #[test]
    fn test_spawn_requires_global_lock() {
        let rt = Runtime::init(Config::default()).unwrap();
        let result = rt.blocking(|| spawn(&ThreadAttr::new(), || ()).map(|h| h.id())).unwrap();
        assert!(matches!(result, Err(Error::NotOwner { .. })));
        rt.shutdown().unwrap();
    }
}
