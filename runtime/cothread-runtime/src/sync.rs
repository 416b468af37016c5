//!
//! Mutex, Condition Variable and RwLock Functions
//!
//! Each object is created by its `*_init` function, which stores a handle in
//! the out-parameter, and stays usable until its `*_destroy` succeeds.
//! Destroying an object that is still in use fails with `EBUSY` and leaves
//! the handle valid; any other call on an unknown handle gives `EINVAL`.
//!

use std::ffi::c_int;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cothread::{Cond, Mutex, RwLock, WaitStatus};

use crate::handles::HandleTable;
use crate::status;

static MUTEXES: HandleTable<Mutex> = HandleTable::new();
static CONDS: HandleTable<Cond> = HandleTable::new();
static RWLOCKS: HandleTable<RwLock> = HandleTable::new();

fn on<T: Clone>(table: &HandleTable<T>, handle: i64, op: impl FnOnce(&T) -> cothread::Result<()>) -> c_int {
    match table.get(handle) {
        Some(object) => status(op(&object)),
        None => libc::EINVAL,
    }
}

unsafe fn init<T>(table: &HandleTable<T>, out: *mut i64, object: T) -> c_int {
    if out.is_null() {
        return libc::EINVAL;
    }
    unsafe { *out = table.insert(object) };
    0
}

fn destroy<T: Clone>(table: &HandleTable<T>, handle: i64, op: impl FnOnce(&T) -> cothread::Result<()>) -> c_int {
    let rc = on(table, handle, op);
    if rc == 0 {
        table.remove(handle);
    }
    rc
}

// Mutex

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_mutex_init(mutex_out: *mut i64) -> c_int {
    unsafe { init(&MUTEXES, mutex_out, Mutex::new()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_mutex_lock(mutex: i64) -> c_int {
    on(&MUTEXES, mutex, Mutex::lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_mutex_trylock(mutex: i64) -> c_int {
    on(&MUTEXES, mutex, Mutex::try_lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_mutex_unlock(mutex: i64) -> c_int {
    on(&MUTEXES, mutex, Mutex::unlock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_mutex_destroy(mutex: i64) -> c_int {
    destroy(&MUTEXES, mutex, Mutex::destroy)
}

// Condition variable

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_cond_init(cond_out: *mut i64) -> c_int {
    unsafe { init(&CONDS, cond_out, Cond::new()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_cond_wait(cond: i64, mutex: i64) -> c_int {
    let Some(mutex) = MUTEXES.get(mutex) else {
        return libc::EINVAL;
    };
    on(&CONDS, cond, |c| c.wait(&mutex))
}

/// Convert an absolute `CLOCK_REALTIME` deadline into an `Instant`.
/// Deadlines in the past map to now.
fn deadline_from(abstime: &libc::timespec) -> Instant {
    let secs = u64::try_from(abstime.tv_sec).unwrap_or(0);
    let nanos = u32::try_from(abstime.tv_nsec).unwrap_or(0).min(999_999_999);
    let target = UNIX_EPOCH + Duration::new(secs, nanos);
    let remaining = target
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Instant::now() + remaining
}

/// Like `cothread_cond_wait`, giving up at the absolute time `abstime`.
/// Returns `ETIMEDOUT` on timeout, with the mutex re-acquired.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_cond_timedwait(
    cond: i64,
    mutex: i64,
    abstime: *const libc::timespec,
) -> c_int {
    if abstime.is_null() {
        return libc::EINVAL;
    }
    let deadline = deadline_from(unsafe { &*abstime });
    let (Some(cond), Some(mutex)) = (CONDS.get(cond), MUTEXES.get(mutex)) else {
        return libc::EINVAL;
    };
    match cond.wait_until(&mutex, deadline) {
        Ok(WaitStatus::Woken) => 0,
        Ok(WaitStatus::TimedOut) => libc::ETIMEDOUT,
        Err(e) => e.errno(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_cond_signal(cond: i64) -> c_int {
    on(&CONDS, cond, Cond::signal)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_cond_broadcast(cond: i64) -> c_int {
    on(&CONDS, cond, Cond::broadcast)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_cond_destroy(cond: i64) -> c_int {
    destroy(&CONDS, cond, Cond::destroy)
}

// Read-write lock

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cothread_rwlock_init(rwlock_out: *mut i64) -> c_int {
    unsafe { init(&RWLOCKS, rwlock_out, RwLock::new()) }
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_rdlock(rwlock: i64) -> c_int {
    on(&RWLOCKS, rwlock, RwLock::read_lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_tryrdlock(rwlock: i64) -> c_int {
    on(&RWLOCKS, rwlock, RwLock::try_read_lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_wrlock(rwlock: i64) -> c_int {
    on(&RWLOCKS, rwlock, RwLock::write_lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_trywrlock(rwlock: i64) -> c_int {
    on(&RWLOCKS, rwlock, RwLock::try_write_lock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_unlock(rwlock: i64) -> c_int {
    on(&RWLOCKS, rwlock, RwLock::unlock)
}

#[unsafe(no_mangle)]
pub extern "C" fn cothread_rwlock_destroy(rwlock: i64) -> c_int {
    destroy(&RWLOCKS, rwlock, RwLock::destroy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{cothread_create, cothread_join};
    use std::ffi::c_void;

    static PAIR: std::sync::OnceLock<(i64, i64)> = std::sync::OnceLock::new();

    /// Returns the first failing return code, or zero.
    unsafe extern "C" fn signal_pair(_arg: *mut c_void) -> *mut c_void {
        let Some(&(mutex, cond)) = PAIR.get() else {
            return libc::EINVAL as usize as *mut c_void;
        };
        let rc = [
            cothread_mutex_lock(mutex),
            cothread_cond_signal(cond),
            cothread_mutex_unlock(mutex),
        ]
        .into_iter()
        .find(|&rc| rc != 0)
        .unwrap_or(0);
        rc as usize as *mut c_void
    }

    #[test]
    fn test_mutex_calls() {
        assert_eq!(crate::cothread_init(), 0);
        let mut m = 0i64;
        assert_eq!(unsafe { cothread_mutex_init(&mut m) }, 0);

        assert_eq!(cothread_mutex_lock(m), 0);
        assert_eq!(cothread_mutex_lock(m), libc::EDEADLK);
        assert_eq!(cothread_mutex_trylock(m), libc::EBUSY);
        assert_eq!(cothread_mutex_destroy(m), libc::EBUSY);
        assert_eq!(cothread_mutex_unlock(m), 0);
        assert_eq!(cothread_mutex_unlock(m), libc::EPERM);

        assert_eq!(cothread_mutex_destroy(m), 0);
        assert_eq!(cothread_mutex_lock(m), libc::EINVAL);
        assert_eq!(unsafe { cothread_mutex_init(std::ptr::null_mut()) }, libc::EINVAL);
        assert_eq!(crate::cothread_shutdown(), 0);
    }

    #[test]
    fn test_cond_signal_from_thread() {
        assert_eq!(crate::cothread_init(), 0);
        let (mut m, mut c) = (0i64, 0i64);
        assert_eq!(unsafe { cothread_mutex_init(&mut m) }, 0);
        assert_eq!(unsafe { cothread_cond_init(&mut c) }, 0);
        PAIR.set((m, c)).unwrap();

        assert_eq!(cothread_mutex_lock(m), 0);
        let mut t = 0u64;
        assert_eq!(unsafe { cothread_create(&mut t, 0, Some(signal_pair), std::ptr::null_mut()) }, 0);
        assert_eq!(cothread_cond_wait(c, m), 0);
        assert_eq!(cothread_mutex_unlock(m), 0);
        let mut ret: *mut c_void = std::ptr::null_mut();
        assert_eq!(unsafe { cothread_join(t, &mut ret) }, 0);
        assert_eq!(ret as usize, 0);

        assert_eq!(cothread_cond_destroy(c), 0);
        assert_eq!(cothread_mutex_destroy(m), 0);
        assert_eq!(crate::cothread_shutdown(), 0);
    }

    #[test]
    fn test_cond_timedwait_times_out() {
        assert_eq!(crate::cothread_init(), 0);
        let (mut m, mut c) = (0i64, 0i64);
        assert_eq!(unsafe { cothread_mutex_init(&mut m) }, 0);
        assert_eq!(unsafe { cothread_cond_init(&mut c) }, 0);

        let soon = SystemTime::now() + Duration::from_millis(20);
        let since_epoch = soon.duration_since(UNIX_EPOCH).unwrap();
        let abstime = libc::timespec {
            tv_sec: since_epoch.as_secs() as libc::time_t,
            tv_nsec: since_epoch.subsec_nanos() as _,
        };

        assert_eq!(unsafe { cothread_cond_timedwait(c, m, &abstime) }, libc::EPERM);
        assert_eq!(cothread_mutex_lock(m), 0);
        assert_eq!(unsafe { cothread_cond_timedwait(c, m, &abstime) }, libc::ETIMEDOUT);
        // The mutex is held again after a timeout.
        assert_eq!(cothread_mutex_trylock(m), libc::EBUSY);
        assert_eq!(cothread_mutex_unlock(m), 0);

        assert_eq!(cothread_cond_destroy(c), 0);
        assert_eq!(cothread_cond_signal(c), libc::EINVAL);
        assert_eq!(cothread_mutex_destroy(m), 0);
        assert_eq!(crate::cothread_shutdown(), 0);
    }

    #[test]
    fn test_rwlock_calls() {
        assert_eq!(crate::cothread_init(), 0);
        let mut rw = 0i64;
        assert_eq!(unsafe { cothread_rwlock_init(&mut rw) }, 0);

        assert_eq!(cothread_rwlock_rdlock(rw), 0);
        assert_eq!(cothread_rwlock_tryrdlock(rw), 0);
        assert_eq!(cothread_rwlock_trywrlock(rw), libc::EDEADLK);
        assert_eq!(cothread_rwlock_unlock(rw), 0);
        assert_eq!(cothread_rwlock_unlock(rw), 0);
        assert_eq!(cothread_rwlock_unlock(rw), libc::EPERM);

        assert_eq!(cothread_rwlock_wrlock(rw), 0);
        assert_eq!(cothread_rwlock_destroy(rw), libc::EBUSY);
        assert_eq!(cothread_rwlock_unlock(rw), 0);
        assert_eq!(cothread_rwlock_destroy(rw), 0);
        assert_eq!(cothread_rwlock_rdlock(rw), libc::EINVAL);
        assert_eq!(crate::cothread_shutdown(), 0);
    }
}
