//!
//! Wrapped Blocking System Calls
//!
//! Each function takes the same arguments as the native call, releases the
//! global lock for the duration of the call, and hands back the native
//! outcome unchanged: short reads and writes stay short, `EINTR` comes back
//! as an error, and errno is captured before the global lock is re-acquired.
//!
//! ## Functions
//!
//! - `read` / `write` - raw file descriptor I/O
//! - `poll` / `select` - I/O multiplexing
//! - `connect` / `accept` / `accept_addr` - raw socket connection setup
//! - `waitpid` - wait for a child process
//! - `tcp_connect` / `tcp_accept` - the same for `std::net` sockets
//!

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::RawFd;
use std::time::Duration;

use crate::blocking::blocking;

fn wrapped<R>(op: impl FnOnce() -> io::Result<R>) -> io::Result<R> {
    blocking(op)?
}

fn cvt(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn cvt_int(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    wrapped(|| cvt(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) }))
}

pub fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    wrapped(|| cvt(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) }))
}

/// `None` waits indefinitely. Timeouts are rounded up to whole milliseconds.
pub fn poll(fds: &mut [libc::pollfd], timeout: Option<Duration>) -> io::Result<usize> {
    let timeout_ms = match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_millis() + u128::from(t.subsec_nanos() % 1_000_000 != 0);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    };
    wrapped(|| {
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        cvt_int(ready).map(|n| n as usize)
    })
}

/// # Safety
///
/// The set and timeout pointers must each be null or valid for the duration
/// of the call, exactly as for `select(2)`.
pub unsafe fn select(
    nfds: libc::c_int,
    readfds: *mut libc::fd_set,
    writefds: *mut libc::fd_set,
    exceptfds: *mut libc::fd_set,
    timeout: *mut libc::timeval,
) -> io::Result<usize> {
    wrapped(|| {
        let ready = unsafe { libc::select(nfds, readfds, writefds, exceptfds, timeout) };
        cvt_int(ready).map(|n| n as usize)
    })
}

/// # Safety
///
/// `addr` must point to a valid socket address of `len` bytes.
pub unsafe fn connect(
    fd: RawFd,
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> io::Result<()> {
    wrapped(|| cvt_int(unsafe { libc::connect(fd, addr, len) }).map(|_| ()))
}

/// Accept a connection on a listening socket, returning the new descriptor.
pub fn accept(fd: RawFd) -> io::Result<RawFd> {
    unsafe { accept_addr(fd, std::ptr::null_mut(), std::ptr::null_mut()) }
}

/// `accept` that also reports the peer address.
///
/// # Safety
///
/// `addr` and `len` must both be null, or valid for writes as for `accept(2)`.
pub unsafe fn accept_addr(
    fd: RawFd,
    addr: *mut libc::sockaddr,
    len: *mut libc::socklen_t,
) -> io::Result<RawFd> {
    wrapped(|| cvt_int(unsafe { libc::accept(fd, addr, len) }))
}

/// Returns the pid that changed state and its raw wait status.
pub fn waitpid(pid: libc::pid_t, options: libc::c_int) -> io::Result<(libc::pid_t, libc::c_int)> {
    wrapped(|| {
        let mut status: libc::c_int = 0;
        let ret = unsafe { libc::waitpid(pid, &mut status, options) };
        cvt_int(ret).map(|pid| (pid, status))
    })
}

pub fn tcp_accept(listener: &TcpListener) -> io::Result<(TcpStream, SocketAddr)> {
    wrapped(|| listener.accept())
}

pub fn tcp_connect(addr: impl ToSocketAddrs) -> io::Result<TcpStream> {
    wrapped(|| TcpStream::connect(addr))
}
