//! Error taxonomy shared by the shared memory handle and the system semaphore.
//!
//! Platform error codes are translated once, at the layer that made the
//! system call, into a [`ShmError`]. Messages follow the
//! `"<operation>: <reason>"` convention so that a single line is enough to
//! tell which step failed.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a shared memory or semaphore failure.
///
/// `NoError` never appears inside a [`ShmError`]; it is what
/// [`ErrorKind::of`] reports for a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The operation succeeded.
    NoError,
    /// The caller lacks the permissions required by the operation.
    PermissionDenied,
    /// A create operation was given an invalid size.
    InvalidSize,
    /// The key is empty or could not be turned into a native identifier.
    KeyError,
    /// The object already exists (or the handle is already attached).
    AlreadyExists,
    /// The object does not exist (or the handle is not attached).
    NotFound,
    /// Locking or unlocking failed.
    LockError,
    /// The system ran out of memory, descriptors or IPC identifiers.
    OutOfResources,
    /// Anything else; the message carries the raw platform code.
    UnknownError,
}

impl ErrorKind {
    /// Kind of a result: [`ErrorKind::NoError`] for `Ok`.
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::NoError,
            Err(e) => e.kind(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "no error",
            Self::PermissionDenied => "permission denied",
            Self::InvalidSize => "invalid size",
            Self::KeyError => "key error",
            Self::AlreadyExists => "already exists",
            Self::NotFound => "not found",
            Self::LockError => "lock error",
            Self::OutOfResources => "out of resources",
            Self::UnknownError => "unknown error",
        };
        f.write_str(name)
    }
}

/// Errors reported by shared memory and semaphore operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShmError {
    /// Access-control failure.
    #[error("{0}")]
    PermissionDenied(String),

    /// Invalid segment size.
    #[error("{0}")]
    InvalidSize(String),

    /// Empty or malformed key.
    #[error("{0}")]
    KeyError(String),

    /// Object already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// Object not found.
    #[error("{0}")]
    NotFound(String),

    /// Lock could not be taken or released.
    #[error("{0}")]
    LockError(String),

    /// System resources exhausted.
    #[error("{0}")]
    OutOfResources(String),

    /// Unclassified platform failure.
    #[error("{0}")]
    UnknownError(String),
}

/// Result type for shared memory operations.
pub type Result<T> = std::result::Result<T, ShmError>;

impl ShmError {
    /// Build an error of the given kind with a `"<function>: <reason>"` message.
    ///
    /// `ErrorKind::NoError` has no error counterpart and is folded into
    /// `UnknownError`.
    pub fn new(kind: ErrorKind, function: &str, reason: &str) -> Self {
        let message = format!("{function}: {reason}");
        match kind {
            ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            ErrorKind::InvalidSize => Self::InvalidSize(message),
            ErrorKind::KeyError => Self::KeyError(message),
            ErrorKind::AlreadyExists => Self::AlreadyExists(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::LockError => Self::LockError(message),
            ErrorKind::OutOfResources => Self::OutOfResources(message),
            ErrorKind::NoError | ErrorKind::UnknownError => Self::UnknownError(message),
        }
    }

    /// The taxonomy bucket of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InvalidSize(_) => ErrorKind::InvalidSize,
            Self::KeyError(_) => ErrorKind::KeyError,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::LockError(_) => ErrorKind::LockError,
            Self::OutOfResources(_) => ErrorKind::OutOfResources,
            Self::UnknownError(_) => ErrorKind::UnknownError,
        }
    }

    /// The human readable message, without the kind.
    pub fn message(&self) -> &str {
        match self {
            Self::PermissionDenied(m)
            | Self::InvalidSize(m)
            | Self::KeyError(m)
            | Self::AlreadyExists(m)
            | Self::NotFound(m)
            | Self::LockError(m)
            | Self::OutOfResources(m)
            | Self::UnknownError(m) => m,
        }
    }

    /// Same kind, with `function` prepended to the message.
    #[must_use]
    pub fn context(self, function: &str) -> Self {
        let kind = self.kind();
        Self::new(kind, function, self.message())
    }

    /// Translate a Unix `errno` value.
    #[cfg(unix)]
    pub fn from_errno(function: &str, errno: i32) -> Self {
        match errno {
            libc::EACCES | libc::EPERM => {
                Self::new(ErrorKind::PermissionDenied, function, "permission denied")
            }
            libc::EEXIST => Self::new(ErrorKind::AlreadyExists, function, "already exists"),
            libc::ENOENT => Self::new(ErrorKind::NotFound, function, "doesn't exist"),
            libc::EMFILE | libc::ENFILE | libc::ENOMEM | libc::ENOSPC => {
                Self::new(ErrorKind::OutOfResources, function, "out of resources")
            }
            libc::ENAMETOOLONG => Self::new(ErrorKind::KeyError, function, "key too long"),
            code => Self::new(
                ErrorKind::UnknownError,
                function,
                &format!("unknown error {code}"),
            ),
        }
    }

    /// Translate the calling thread's current `errno`.
    #[cfg(unix)]
    pub fn last_os_error(function: &str) -> Self {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::from_errno(function, errno)
    }

    /// Translate a Win32 `GetLastError` value.
    #[cfg(windows)]
    pub fn from_win32(function: &str, code: u32) -> Self {
        use winapi::shared::winerror::{
            ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS, ERROR_COMMITMENT_LIMIT,
            ERROR_FILE_NOT_FOUND, ERROR_INVALID_NAME, ERROR_NO_SYSTEM_RESOURCES,
            ERROR_NOT_ENOUGH_MEMORY,
        };

        match code {
            ERROR_ALREADY_EXISTS => Self::new(ErrorKind::AlreadyExists, function, "already exists"),
            ERROR_FILE_NOT_FOUND => Self::new(ErrorKind::NotFound, function, "doesn't exist"),
            ERROR_COMMITMENT_LIMIT => Self::new(ErrorKind::InvalidSize, function, "invalid size"),
            ERROR_NO_SYSTEM_RESOURCES | ERROR_NOT_ENOUGH_MEMORY => {
                Self::new(ErrorKind::OutOfResources, function, "out of resources")
            }
            ERROR_ACCESS_DENIED => {
                Self::new(ErrorKind::PermissionDenied, function, "permission denied")
            }
            ERROR_INVALID_NAME => Self::new(ErrorKind::KeyError, function, "invalid key"),
            other => Self::new(
                ErrorKind::UnknownError,
                function,
                &format!("unknown error {other}"),
            ),
        }
    }

    /// Translate the calling thread's `GetLastError`.
    #[cfg(windows)]
    #[allow(unsafe_code)]
    pub fn last_os_error(function: &str) -> Self {
        let code = unsafe { winapi::um::errhandlingapi::GetLastError() };
        Self::from_win32(function, code)
    }

    /// Translate a [`std::io::Error`], preferring the raw OS code when present.
    pub fn from_io(function: &str, err: &std::io::Error) -> Self {
        #[cfg(unix)]
        {
            if let Some(code) = err.raw_os_error() {
                return Self::from_errno(function, code);
            }
        }

        match err.kind() {
            std::io::ErrorKind::NotFound => {
                Self::new(ErrorKind::NotFound, function, "doesn't exist")
            }
            std::io::ErrorKind::PermissionDenied => {
                Self::new(ErrorKind::PermissionDenied, function, "permission denied")
            }
            std::io::ErrorKind::AlreadyExists => {
                Self::new(ErrorKind::AlreadyExists, function, "already exists")
            }
            _ => Self::new(ErrorKind::UnknownError, function, &err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        let err = ShmError::new(ErrorKind::NotFound, "SharedMemory::attach", "doesn't exist");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "SharedMemory::attach: doesn't exist");
    }

    #[test]
    fn test_no_error_is_not_an_error_kind() {
        let err = ShmError::new(ErrorKind::NoError, "f", "odd");
        assert_eq!(err.kind(), ErrorKind::UnknownError);

        let ok: Result<()> = Ok(());
        assert_eq!(ErrorKind::of(&ok), ErrorKind::NoError);
        let failed: Result<()> = Err(ShmError::LockError("x".to_string()));
        assert_eq!(ErrorKind::of(&failed), ErrorKind::LockError);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = ShmError::new(ErrorKind::KeyError, "inner", "key is empty")
            .context("SharedMemory::create");
        assert_eq!(err.kind(), ErrorKind::KeyError);
        assert_eq!(err.message(), "SharedMemory::create: inner: key is empty");
    }

    #[cfg(unix)]
    #[test]
    fn test_errno_mapping() {
        assert_eq!(
            ShmError::from_errno("f", libc::EACCES).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            ShmError::from_errno("f", libc::EEXIST).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(ShmError::from_errno("f", libc::ENOENT).kind(), ErrorKind::NotFound);
        assert_eq!(
            ShmError::from_errno("f", libc::ENOSPC).kind(),
            ErrorKind::OutOfResources
        );

        let unknown = ShmError::from_errno("f", libc::EBADF);
        assert_eq!(unknown.kind(), ErrorKind::UnknownError);
        assert!(unknown.message().contains(&libc::EBADF.to_string()));
    }

    #[test]
    fn test_io_error_mapping() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ShmError::from_io("f", &err).kind(), ErrorKind::NotFound);
    }
}
