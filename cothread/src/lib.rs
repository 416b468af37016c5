//!
//! cothread - Cooperative Threads on Native Threads
//!
//! A pthread-style threading library in which, outside of explicit blocking
//! regions, only one logical thread of a runtime runs application code at a
//! time. Code between suspension points never interleaves with other
//! logical threads, while blocking system calls still overlap for real
//! because every one of them gives up the global lock for its duration.
//!
//! ## Suspension points
//!
//! - Blocking wrappers (`io::*`, `sleep`, `usleep`, `yield_now`, `blocking`)
//! - Condition variable waits
//! - Mutex and read-write lock contention
//! - Joining a thread
//!
//! ## Lifecycle
//!
//! - `Runtime::init(config)` / `init()` - the calling thread becomes the
//!   first logical thread and holds the global lock
//! - `spawn(attr, entry) -> JoinHandle<T>` - create a logical thread
//! - `JoinHandle::join` / `JoinHandle::detach`
//! - `Runtime::shutdown` - release the global lock and tear down
//!
//! ## Synchronization
//!
//! - `Mutex` - non-recursive, FIFO hand-off
//! - `Cond` - FIFO signal, broadcast with ordered mutex re-acquisition
//! - `RwLock` - writer preference
//!
//! ## Platform Support
//!
//! Unix only: the blocking wrappers call `libc` directly.
//!

pub mod attr;
pub mod blocking;
pub mod cond;
pub mod config;
pub mod error;
pub mod glock;
pub mod identity;
pub mod io;
pub mod mutex;
pub mod runtime;
pub mod rwlock;
pub mod thread;
pub mod version;
mod waiter;

pub use attr::*;
pub use blocking::*;
pub use cond::*;
pub use config::Config;
pub use error::{Error, Result};
pub use glock::{GlobalLock, Unprotected};
pub use identity::ThreadId;
pub use mutex::*;
pub use runtime::{init, Runtime};
pub use rwlock::*;
pub use thread::{current, detach, join, name, set_name, spawn, JoinHandle};
pub use version::{version, VersionSelector};
