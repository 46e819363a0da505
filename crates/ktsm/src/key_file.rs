//! Marker files backing System V IPC keys.
//!
//! `ftok` turns the identity of an existing file into a `key_t`, so every
//! System V object needs a file on disk whose path is the native key. The
//! file carries no data.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use libc::{c_int, key_t};

use crate::error::{ErrorKind, Result, ShmError};

/// Project id passed to `ftok`.
const FTOK_PROJECT_ID: c_int = b'Q' as c_int;

/// Create the marker file at `path` if it is missing.
///
/// Returns `true` when this call created the file.
pub fn create_key_file(path: &Path) -> Result<bool> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o640)
        .open(path)
    {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(ShmError::new(
            ErrorKind::KeyError,
            "create_key_file",
            &format!("unable to make key file {}: {e}", path.display()),
        )),
    }
}

/// Remove the marker file; a missing file is not an error.
pub fn remove_key_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShmError::from_io("remove_key_file", &e)),
    }
}

/// Derive the System V key of the marker file at `path`.
#[allow(unsafe_code)]
pub fn ftok(path: &Path) -> Result<key_t> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| ShmError::new(ErrorKind::KeyError, "ftok", &format!("invalid key: {e}")))?;

    let key = unsafe { libc::ftok(c_path.as_ptr(), FTOK_PROJECT_ID) };
    if key == -1 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(match errno {
            libc::ENOENT => ShmError::new(ErrorKind::NotFound, "ftok", "key file doesn't exist"),
            _ => ShmError::new(
                ErrorKind::KeyError,
                "ftok",
                &format!("ftok failed (errno {errno})"),
            ),
        });
    }
    Ok(key)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_key_file_reports_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("marker");

        assert!(create_key_file(&path).expect("create"));
        assert!(!create_key_file(&path).expect("exists"));
        assert!(path.exists());

        remove_key_file(&path).expect("remove");
        assert!(!path.exists());
        remove_key_file(&path).expect("remove missing");
    }

    #[test]
    fn test_ftok_is_stable_per_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        create_key_file(&a).expect("a");
        create_key_file(&b).expect("b");

        assert_eq!(ftok(&a).expect("a"), ftok(&a).expect("a again"));
        assert_ne!(ftok(&a).expect("a"), ftok(&b).expect("b"));
    }

    #[test]
    fn test_ftok_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ftok(&dir.path().join("missing")).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
