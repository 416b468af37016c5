///
/// Error types for cothread.
///
/// Every fallible operation reports its outcome to the immediate caller.
/// Timeouts are not errors: a timed condition wait that elapses returns
/// `WaitStatus::TimedOut` instead. Each variant maps to exactly one errno so
/// the C ABI can report it as a plain result code.
///

use thiserror::Error;

use crate::identity::ThreadId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot start a new thread: {source}")]
    ResourceExhausted {
        #[source]
        source: std::io::Error,
    },

    #[error("calling thread {caller} does not own this {object}")]
    NotOwner { caller: ThreadId, object: &'static str },

    #[error("operation on {object} would deadlock")]
    WouldDeadlock { object: &'static str },

    #[error("{object} is busy")]
    Busy { object: &'static str },

    #[error("{object} has been destroyed")]
    Destroyed { object: &'static str },

    #[error("thread {0} is detached")]
    NotJoinable(ThreadId),

    #[error("thread {0} is already being joined")]
    AlreadyJoined(ThreadId),

    #[error("no thread {0} in this runtime")]
    NoSuchThread(ThreadId),

    #[error("thread {0} panicked")]
    Panicked(ThreadId),

    #[error("calling thread has no cothread runtime")]
    NotInitialized,

    #[error("calling thread already belongs to a cothread runtime")]
    AlreadyInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The errno reported for this error by the C ABI.
    pub fn errno(&self) -> i32 {
        match self {
            Error::ResourceExhausted { .. } => libc::EAGAIN,
            Error::NotOwner { .. } => libc::EPERM,
            Error::WouldDeadlock { .. } => libc::EDEADLK,
            Error::Busy { .. } => libc::EBUSY,
            Error::Destroyed { .. } => libc::EINVAL,
            Error::NotJoinable(_) => libc::EINVAL,
            Error::AlreadyJoined(_) => libc::EINVAL,
            Error::NoSuchThread(_) => libc::ESRCH,
            Error::Panicked(_) => libc::ECANCELED,
            Error::NotInitialized => libc::EPERM,
            Error::AlreadyInitialized => libc::EBUSY,
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::InvalidConfig { .. } => libc::EINVAL,
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => match other.errno() {
                libc::EPERM => std::io::Error::new(std::io::ErrorKind::PermissionDenied, other),
                libc::EINVAL => std::io::Error::new(std::io::ErrorKind::InvalidInput, other),
                _ => std::io::Error::other(other),
            },
        }
    }
}
