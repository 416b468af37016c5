///
/// cothread Runtime Static Library
///
/// Exposes the cothread API to C programs. This crate produces a static
/// library (libcothread_runtime.a) that C code links against to get
/// pthread-style threads with cooperative semantics.
///
/// Contains:
/// - Lifecycle and protection control (cothread_init, cothread_protect, ...)
/// - Threads and thread attributes (cothread_create, cothread_join, ...)
/// - Mutexes, condition variables and rwlocks (cothread_mutex_lock, ...)
/// - Blocking system call wrappers (cothread_read, cothread_poll, ...)
///
/// Functions return `0` or an errno value, except the system call wrappers,
/// which return what the native call returns and set `errno` on failure.
///

mod handles;
mod io;
mod sync;
mod thread;

use std::ffi::{CString, c_char, c_int};
use std::sync::OnceLock;

use tracing::debug;

use cothread::{Runtime, VersionSelector};

pub use io::*;
pub use sync::*;
pub use thread::*;

pub(crate) fn status(result: cothread::Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

/// Store `code` in the calling thread's `errno`.
pub(crate) fn set_errno(code: c_int) {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe {
        *libc::__errno_location() = code;
    }
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    unsafe {
        *libc::__error() = code;
    }
}

/// Make the calling thread the first thread of a new runtime.
#[unsafe(no_mangle)]
pub extern "C" fn cothread_init() -> c_int {
    match cothread::init() {
        Ok(_) => {
            debug!("runtime initialized through the C ABI");
            0
        }
        Err(e) => e.errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_shutdown() -> c_int {
    status(Runtime::current().and_then(Runtime::shutdown))
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_unprotect() -> c_int {
    status(cothread::unprotect())
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_protect() -> c_int {
    status(cothread::protect())
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_is_protected() -> c_int {
    cothread::is_protected() as c_int
}

/// Return a static version string.
///
/// A selector starting with the bytes `1, 1` asks for the long banner,
/// `1, 2` for the commit id. NULL or anything else gives the version number.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_get_version(selector: *const c_char) -> *const c_char {
    let selector = if selector.is_null() {
        VersionSelector::Short
    } else {
        let first = unsafe { *selector } as u8;
        if first == 0 {
            VersionSelector::Short
        } else {
            let second = unsafe { *selector.add(1) } as u8;
            VersionSelector::from_code(&[first, second])
        }
    };
    version_cstr(selector).as_ptr()
}

fn version_cstr(selector: VersionSelector) -> &'static CString {
    static SHORT: OnceLock<CString> = OnceLock::new();
    static BANNER: OnceLock<CString> = OnceLock::new();
    static COMMIT: OnceLock<CString> = OnceLock::new();

    let cell = match selector {
        VersionSelector::Short => &SHORT,
        VersionSelector::Banner => &BANNER,
        VersionSelector::CommitId => &COMMIT,
    };
    cell.get_or_init(|| CString::new(cothread::version(selector)).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_init_and_shutdown() {
        assert_eq!(cothread_is_protected(), 0);
        assert_eq!(cothread_shutdown(), libc::EPERM);

        assert_eq!(cothread_init(), 0);
        assert_eq!(cothread_init(), libc::EBUSY);
        assert_eq!(cothread_is_protected(), 1);

        assert_eq!(cothread_unprotect(), 0);
        assert_eq!(cothread_is_protected(), 0);
        assert_eq!(cothread_unprotect(), libc::EPERM);
        assert_eq!(cothread_protect(), 0);
        assert_eq!(cothread_protect(), libc::EDEADLK);

        assert_eq!(cothread_shutdown(), 0);
        assert_eq!(cothread_is_protected(), 0);
    }

    #[test]
    fn test_get_version() {
        let read = |sel: *const c_char| unsafe {
            CStr::from_ptr(cothread_get_version(sel)).to_str().unwrap().to_owned()
        };

        assert_eq!(read(std::ptr::null()), cothread::version(VersionSelector::Short));
        assert_eq!(read(c"".as_ptr()), cothread::version(VersionSelector::Short));
        assert!(read(c"\x01\x01".as_ptr()).contains("This is cothread"));
        assert_eq!(read(c"\x01\x02".as_ptr()), cothread::version(VersionSelector::CommitId));
        assert_eq!(read(c"\x01".as_ptr()), cothread::version(VersionSelector::Short));
    }
}
