//!
//! Blocking System Call Wrappers
//!
//! Drop-in replacements for the native calls: same arguments, same return
//! values, `errno` set on failure. The global lock is released for the
//! duration of the call.
//!

use std::ffi::{c_int, c_uint, c_void};
use std::io;
use std::time::Duration;

use crate::set_errno;

/// Report `err` through `errno` and return the native failure value.
fn fail<R>(err: io::Error, failure: R) -> R {
    let code = err.raw_os_error().unwrap_or(match err.kind() {
        io::ErrorKind::PermissionDenied => libc::EPERM,
        io::ErrorKind::InvalidInput => libc::EINVAL,
        _ => libc::EIO,
    });
    set_errno(code);
    failure
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_usleep(usec: c_uint) -> c_int {
    match cothread::usleep(u64::from(usec)) {
        Ok(()) => 0,
        Err(e) => fail(e.into(), -1),
    }
}

/// Returns the number of seconds left to sleep, which is always zero.
#[unsafe(no_mangle)]
pub extern "C" fn cothread_sleep(seconds: c_uint) -> c_uint {
    match cothread::sleep(Duration::from_secs(u64::from(seconds))) {
        Ok(()) => 0,
        Err(e) => fail(e.into(), seconds),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_read(fd: c_int, buf: *mut c_void, count: usize) -> isize {
    let buf = if count == 0 {
        &mut [][..]
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), count) }
    };
    match cothread::io::read(fd, buf) {
        Ok(n) => n as isize,
        Err(e) => fail(e, -1),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_write(fd: c_int, buf: *const c_void, count: usize) -> isize {
    let buf = if count == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), count) }
    };
    match cothread::io::write(fd, buf) {
        Ok(n) => n as isize,
        Err(e) => fail(e, -1),
    }
}

/// A negative `timeout` (milliseconds) waits indefinitely.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_poll(fds: *mut libc::pollfd, nfds: libc::nfds_t, timeout: c_int) -> c_int {
    let fds = if nfds == 0 {
        &mut [][..]
    } else {
        unsafe { std::slice::from_raw_parts_mut(fds, nfds as usize) }
    };
    let timeout = u64::try_from(timeout).ok().map(Duration::from_millis);
    match cothread::io::poll(fds, timeout) {
        Ok(n) => n as c_int,
        Err(e) => fail(e, -1),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_select(
    nfds: c_int,
    readfds: *mut libc::fd_set,
    writefds: *mut libc::fd_set,
    exceptfds: *mut libc::fd_set,
    timeout: *mut libc::timeval,
) -> c_int {
    match unsafe { cothread::io::select(nfds, readfds, writefds, exceptfds, timeout) } {
        Ok(n) => n as c_int,
        Err(e) => fail(e, -1),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_connect(
    fd: c_int,
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> c_int {
    match unsafe { cothread::io::connect(fd, addr, len) } {
        Ok(()) => 0,
        Err(e) => fail(e, -1),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_accept(
    fd: c_int,
    addr: *mut libc::sockaddr,
    len: *mut libc::socklen_t,
) -> c_int {
    match unsafe { cothread::io::accept_addr(fd, addr, len) } {
        Ok(conn) => conn,
        Err(e) => fail(e, -1),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_waitpid(
    pid: libc::pid_t,
    status: *mut c_int,
    options: c_int,
) -> libc::pid_t {
    match cothread::io::waitpid(pid, options) {
        Ok((reaped, raw)) => {
            if !status.is_null() {
                unsafe { *status = raw };
            }
            reaped
        }
        Err(e) => fail(e, -1),
    }
}
