//! Cross-process named shared memory with a paired system semaphore lock.
//!
//! Unrelated processes that agree on a key can create, attach to, read,
//! write and detach from the same region of memory. Each region comes with
//! a named counting semaphore that serializes access across processes.
//!
//! - **Key Codec** ([`key`]): turns an arbitrary user key into a platform
//!   legal identifier
//! - **System Semaphore** ([`SystemSemaphore`]): named, kernel-persisted
//!   counting semaphore
//! - **Segment Backend** ([`segment`]): create/open/map/unmap/destroy of the
//!   kernel object, one implementation per platform
//! - **Shared Memory Handle** ([`SharedMemory`]): the façade tying a segment
//!   to its lock
//!
//! # Platforms
//!
//! Windows segments are pagefile-backed file mappings the kernel destroys
//! with the last handle. On Unix the default is System V IPC (`shmget`,
//! `semget`); the `posix-ipc` feature switches to `shm_open` and
//! `sem_open`. Both Unix backends keep the object alive until the last
//! attached handle detaches, see [`Lifecycle`].
//!
//! # Example
//!
//! ```no_run
//! use ktsm::{AccessMode, SharedMemory};
//!
//! // Process A
//! let mut writer = SharedMemory::with_key("demo");
//! writer.create(64, AccessMode::ReadWrite)?;
//! {
//!     let mut guard = writer.lock_guard()?;
//!     if let Some(buffer) = guard.data() {
//!         buffer[..5].copy_from_slice(b"hello");
//!     }
//! }
//!
//! // Process B
//! let mut reader = SharedMemory::with_key("demo");
//! reader.attach(AccessMode::ReadOnly)?;
//! let guard = reader.lock_guard()?;
//! assert_eq!(&guard.const_data().unwrap_or_default()[..5], b"hello");
//! # Ok::<(), ktsm::ShmError>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// Configuration
pub mod config;

// Error taxonomy
pub mod error;

// Native key derivation
pub mod key;

// SysV marker files
#[cfg(all(unix, not(feature = "posix-ipc")))]
mod key_file;

// Platform segments
pub mod segment;

// Named semaphores
pub mod semaphore;

// Shared memory handle
mod shared_memory;

// UTF-16 object names
#[cfg(windows)]
mod wide;

pub use config::IpcConfig;
pub use error::{ErrorKind, Result, ShmError};
pub use key::{Namespace, Purpose, derive_native_key, native_key};
pub use segment::{AccessMode, Lifecycle, Mapping, PlatformSegment, SegmentBackend};
pub use semaphore::{SemaphoreAccess, SystemSemaphore};
pub use shared_memory::{SharedMemory, SharedMemoryGuard};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
