//! Native key derivation.
//!
//! A user key can be any string. The kernel objects backing a segment and
//! its lock need identifiers the platform accepts, so the key is reduced to
//! its ASCII letters, prefixed with a purpose tag and suffixed with a digest
//! of the untouched key:
//!
//! ```text
//! "my key #1" -> ktsm_sharedmemory_mykey<sha256 hex of "my key #1">
//! ```
//!
//! The digest keeps two keys that differ only in filtered-out characters
//! apart, and the purpose tag keeps the segment and semaphore namespaces
//! apart even for the same user key.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Prefix for shared memory segment identifiers.
pub const SHARED_MEMORY_PREFIX: &str = "ktsm_sharedmemory_";

/// Prefix for system semaphore identifiers.
pub const SEMAPHORE_PREFIX: &str = "ktsm_systemsem_";

/// Length of the hex digest suffix.
pub const DIGEST_HEX_LEN: usize = 64;

/// What a native key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// A shared memory segment.
    SharedMemory,
    /// A system semaphore.
    Semaphore,
}

impl Purpose {
    /// Fixed prefix for this purpose.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::SharedMemory => SHARED_MEMORY_PREFIX,
            Self::Semaphore => SEMAPHORE_PREFIX,
        }
    }
}

/// Where native identifiers live on a given platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Kernel object namespace (Windows); names are used as-is.
    Kernel,
    /// POSIX named objects; names need a single leading `/`.
    PosixName,
    /// System V IPC; the name becomes a file path inside this directory,
    /// and the file's identity is turned into a `key_t` with `ftok`.
    TempFile(PathBuf),
}

impl Namespace {
    /// Namespace used by the compiled-in backend, with marker files in the
    /// system temporary directory.
    pub fn platform_default() -> Self {
        Self::platform_default_in(&std::env::temp_dir())
    }

    /// Namespace used by the compiled-in backend, with marker files in `dir`.
    #[cfg_attr(any(windows, feature = "posix-ipc"), allow(unused_variables))]
    pub fn platform_default_in(dir: &Path) -> Self {
        #[cfg(windows)]
        {
            Self::Kernel
        }
        #[cfg(all(unix, feature = "posix-ipc"))]
        {
            Self::PosixName
        }
        #[cfg(all(unix, not(feature = "posix-ipc")))]
        {
            Self::TempFile(dir.to_path_buf())
        }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Derive the native identifier for `key` in `namespace`.
///
/// An empty key yields an empty identifier, which callers treat as
/// "no native key available".
pub fn derive_native_key(key: &str, purpose: Purpose, namespace: &Namespace) -> String {
    if key.is_empty() {
        return String::new();
    }

    let prefix = purpose.prefix();
    let mut name = String::with_capacity(prefix.len() + key.len() + DIGEST_HEX_LEN);
    name.push_str(prefix);
    name.extend(key.chars().filter(char::is_ascii_alphabetic));
    name.push_str(&digest(key.as_bytes()));

    match namespace {
        Namespace::Kernel => name,
        Namespace::PosixName => format!("/{name}"),
        Namespace::TempFile(dir) => dir.join(name).to_string_lossy().into_owned(),
    }
}

/// Derive the native identifier for `key` in the platform's default namespace.
pub fn native_key(key: &str, purpose: Purpose) -> String {
    derive_native_key(key, purpose, &Namespace::platform_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_key_has_no_native_key() {
        assert_eq!(derive_native_key("", Purpose::SharedMemory, &Namespace::Kernel), "");
        assert_eq!(derive_native_key("", Purpose::Semaphore, &Namespace::PosixName), "");
    }

    #[test]
    fn test_letters_are_kept() {
        let key = derive_native_key("test_key", Purpose::SharedMemory, &Namespace::Kernel);
        assert!(key.starts_with("ktsm_sharedmemory_testkey"));
        assert_eq!(
            key.len(),
            SHARED_MEMORY_PREFIX.len() + "testkey".len() + DIGEST_HEX_LEN
        );
    }

    #[test]
    fn test_digest_covers_filtered_characters() {
        let a = derive_native_key("key1", Purpose::SharedMemory, &Namespace::Kernel);
        let b = derive_native_key("key2", Purpose::SharedMemory, &Namespace::Kernel);
        assert_ne!(a, b);
        assert!(a.starts_with("ktsm_sharedmemory_key"));
        assert!(b.starts_with("ktsm_sharedmemory_key"));
    }

    #[test]
    fn test_purposes_do_not_collide() {
        let shm = derive_native_key("shared", Purpose::SharedMemory, &Namespace::Kernel);
        let sem = derive_native_key("shared", Purpose::Semaphore, &Namespace::Kernel);
        assert_ne!(shm, sem);
        assert!(sem.starts_with(SEMAPHORE_PREFIX));
    }

    #[test]
    fn test_namespace_adjustment() {
        let plain = derive_native_key("abc", Purpose::Semaphore, &Namespace::Kernel);

        let posix = derive_native_key("abc", Purpose::Semaphore, &Namespace::PosixName);
        assert_eq!(posix, format!("/{plain}"));

        let dir = PathBuf::from("/tmp/ktsm-keys");
        let file = derive_native_key("abc", Purpose::Semaphore, &Namespace::TempFile(dir.clone()));
        assert_eq!(PathBuf::from(&file), dir.join(&plain));
    }

    #[test]
    fn test_non_ascii_key() {
        let key = derive_native_key("clé-été", Purpose::SharedMemory, &Namespace::Kernel);
        assert!(key.starts_with("ktsm_sharedmemory_cl"));
        assert!(key.is_ascii());
    }

    #[test]
    fn test_deterministic() {
        let ns = Namespace::platform_default();
        assert_eq!(
            derive_native_key("again", Purpose::SharedMemory, &ns),
            derive_native_key("again", Purpose::SharedMemory, &ns)
        );
        assert_eq!(
            native_key("again", Purpose::SharedMemory),
            derive_native_key("again", Purpose::SharedMemory, &ns)
        );
    }

    #[test]
    fn test_digest_is_fixed_length() {
        assert_eq!(digest(b"").len(), DIGEST_HEX_LEN);
        assert_eq!(digest(&[0u8; 4096]).len(), DIGEST_HEX_LEN);
    }
}
