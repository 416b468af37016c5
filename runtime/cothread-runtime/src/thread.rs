//!
//! Threads and Thread Attributes
//!
//! ## Functions
//!
//! - `cothread_attr_init` / `cothread_attr_destroy` - attribute handles
//! - `cothread_attr_{set,get}detachstate`, `cothread_attr_{set,get}stacksize`
//! - `cothread_create` - start a thread running a C entry function
//! - `cothread_join` / `cothread_detach`
//! - `cothread_self` / `cothread_equal`
//! - `cothread_setname` / `cothread_getname`
//!
//! Threads are identified by their `u64` thread id. Attribute handle `0`
//! stands for the default attributes.
//!

use std::ffi::{CStr, c_char, c_int, c_void};

use tracing::trace;

use cothread::{DetachState, Runtime, ThreadAttr, ThreadId};

use crate::handles::HandleTable;
use crate::status;

pub const COTHREAD_CREATE_JOINABLE: c_int = 0;
pub const COTHREAD_CREATE_DETACHED: c_int = 1;

pub type StartRoutine = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

static ATTRS: HandleTable<ThreadAttr> = HandleTable::new();

fn with_attr(attr: i64, f: impl FnOnce(&mut ThreadAttr) -> c_int) -> c_int {
    ATTRS.with(attr, f).unwrap_or_else(|| {
        trace!(handle = attr, "unknown attribute handle");
        libc::EINVAL
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_attr_init(attr_out: *mut i64) -> c_int {
    if attr_out.is_null() {
        return libc::EINVAL;
    }
    unsafe { *attr_out = ATTRS.insert(ThreadAttr::new()) };
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_attr_destroy(attr: i64) -> c_int {
    match ATTRS.remove(attr) {
        Some(_) => 0,
        None => libc::EINVAL,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_attr_setdetachstate(attr: i64, state: c_int) -> c_int {
    let state = match state {
        COTHREAD_CREATE_JOINABLE => DetachState::Joinable,
        COTHREAD_CREATE_DETACHED => DetachState::Detached,
        _ => return libc::EINVAL,
    };
    with_attr(attr, |a| status(a.set_detach_state(state)))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_attr_getdetachstate(attr: i64, state_out: *mut c_int) -> c_int {
    if state_out.is_null() {
        return libc::EINVAL;
    }
    with_attr(attr, |a| {
        let state = match a.detach_state() {
            DetachState::Joinable => COTHREAD_CREATE_JOINABLE,
            DetachState::Detached => COTHREAD_CREATE_DETACHED,
        };
        unsafe { *state_out = state };
        0
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_attr_setstacksize(attr: i64, size: usize) -> c_int {
    with_attr(attr, |a| status(a.set_stack_size(size)))
}

/// Reports `0` when no stack size was set and the runtime default applies.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_attr_getstacksize(attr: i64, size_out: *mut usize) -> c_int {
    if size_out.is_null() {
        return libc::EINVAL;
    }
    with_attr(attr, |a| {
        unsafe { *size_out = a.stack_size().unwrap_or(0) };
        0
    })
}

/// Start a thread running `start_routine(arg)`.
///
/// The routine's return value becomes the thread's exit value, collected by
/// `cothread_join`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_create(
    thread_out: *mut u64,
    attr: i64,
    start_routine: Option<StartRoutine>,
    arg: *mut c_void,
) -> c_int {
    let Some(start) = start_routine else {
        return libc::EINVAL;
    };
    if thread_out.is_null() {
        return libc::EINVAL;
    }
    let attr = if attr == 0 {
        ThreadAttr::new()
    } else {
        match ATTRS.get(attr) {
            Some(attr) => attr,
            None => return libc::EINVAL,
        }
    };

    // Raw pointers are not Send; the address is handed over as is.
    let arg = arg as usize;
    match cothread::spawn(&attr, move || unsafe {
        start(arg as *mut c_void) as usize
    }) {
        Ok(handle) => {
            unsafe { *thread_out = handle.id().as_u64() };
            0
        }
        Err(e) => e.errno(),
    }
}

/// Wait for `thread` and store its exit value in `retval` unless NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_join(thread: u64, retval: *mut *mut c_void) -> c_int {
    match Runtime::current().and_then(|rt| rt.join_raw(ThreadId::from_raw(thread))) {
        Ok(value) => {
            if !retval.is_null() {
                let exit = value.downcast::<usize>().map(|v| *v).unwrap_or(0);
                unsafe { *retval = exit as *mut c_void };
            }
            0
        }
        Err(e) => e.errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_detach(thread: u64) -> c_int {
    status(cothread::detach(ThreadId::from_raw(thread)))
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_self() -> u64 {
    cothread::current().as_u64()
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_equal(a: u64, b: u64) -> c_int {
    (ThreadId::from_raw(a) == ThreadId::from_raw(b)) as c_int
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_setname(thread: u64, name: *const c_char) -> c_int {
    if name.is_null() {
        return libc::EINVAL;
    }
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return libc::EINVAL;
    };
    status(Runtime::current().and_then(|rt| rt.set_thread_name(ThreadId::from_raw(thread), name)))
}

/// Copy the thread's name, NUL terminated, into `buf`. Fails with `ERANGE`
/// when `buf` is too small.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_getname(thread: u64, buf: *mut c_char, len: usize) -> c_int {
    if buf.is_null() {
        return libc::EINVAL;
    }
    let rt = match Runtime::current() {
        Ok(rt) => rt,
        Err(e) => return e.errno(),
    };
    let Some(name) = rt.thread_name(ThreadId::from_raw(thread)) else {
        return libc::ESRCH;
    };
    if name.len() >= len {
        return libc::ERANGE;
    }
    unsafe {
        std::ptr::copy_nonoverlapping(name.as_ptr(), buf.cast::<u8>(), name.len());
        *buf.add(name.len()) = 0;
    }
    0
}
