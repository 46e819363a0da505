//! Named shared memory segments.
//!
//! Getting a segment into a process takes two independent steps that fail
//! for different reasons: obtaining the kernel object (it may exist or not)
//! and mapping it into the address space. [`SegmentBackend`] keeps them
//! apart so the handle can reuse the mapping step after either creating or
//! opening a segment.
//!
//! ## Ownership models
//!
//! - Windows ([`Lifecycle::HandleRefcounted`]): the kernel destroys the file
//!   mapping when the last handle to it is closed, including on process
//!   exit or crash. There is no explicit destroy.
//! - Unix ([`Lifecycle::Persistent`]): the object outlives every mapping and
//!   has to be destroyed by whoever detaches last. A process that crashes
//!   while attached leaves an orphaned segment behind.

#[cfg(all(unix, feature = "posix-ipc"))]
mod posix;
#[cfg(all(unix, not(feature = "posix-ipc")))]
mod sysv;
#[cfg(windows)]
mod windows;

#[cfg(all(unix, feature = "posix-ipc"))]
pub use posix::{PosixResource, PosixSegment};
#[cfg(all(unix, not(feature = "posix-ipc")))]
pub use sysv::{SysvResource, SysvSegment};
#[cfg(windows)]
pub use windows::{WindowsResource, WindowsSegment};

use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Segment backend compiled in for this target.
#[cfg(all(unix, feature = "posix-ipc"))]
pub type PlatformSegment = PosixSegment;
/// Segment backend compiled in for this target.
#[cfg(all(unix, not(feature = "posix-ipc")))]
pub type PlatformSegment = SysvSegment;
/// Segment backend compiled in for this target.
#[cfg(windows)]
pub type PlatformSegment = WindowsSegment;

/// How a segment may be accessed once mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Reads only; writing through the mapping faults.
    ReadOnly,
    /// Reads and writes.
    #[default]
    ReadWrite,
}

/// Who destroys the kernel object behind a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// The kernel destroys the object when the last handle anywhere is
    /// closed.
    HandleRefcounted,
    /// The object persists until the last detaching process destroys it.
    Persistent,
}

/// A region mapped into this process.
///
/// Plain address and length; unmapping goes through
/// [`SegmentBackend::unmap_segment`].
#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is process-wide; moving its address to another
// thread does not change who may touch the memory.
#[allow(unsafe_code)]
unsafe impl Send for Mapping {}

impl Mapping {
    /// Wrap a mapped address.
    pub(crate) const fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Start of the usable region.
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Usable length as reported by the OS.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Platform operations on a named shared memory object.
///
/// Implementations are marker types; the per-segment state lives in
/// [`SegmentBackend::Resource`].
pub trait SegmentBackend {
    /// Local reference to the kernel object (handle, key and id, or
    /// descriptor). Dropping it releases the local reference.
    type Resource;

    /// Ownership model of this backend.
    const LIFECYCLE: Lifecycle;

    /// Create a new object of at least `size` bytes.
    ///
    /// Fails with `AlreadyExists` if one exists under `native_key`,
    /// `InvalidSize` for a zero size and `KeyError` for an empty key.
    fn create_segment(native_key: &str, size: usize) -> Result<Self::Resource>;

    /// Open an existing object.
    ///
    /// Fails with `NotFound` if it does not exist and `KeyError` for an empty
    /// key.
    fn open_segment(native_key: &str, mode: AccessMode) -> Result<Self::Resource>;

    /// Map the object. The returned length may exceed the requested size.
    fn map_segment(resource: &mut Self::Resource, mode: AccessMode) -> Result<Mapping>;

    /// Unmap a mapping obtained from [`map_segment`](Self::map_segment).
    ///
    /// Never destroys a persistent object.
    fn unmap_segment(resource: &mut Self::Resource, mapping: &Mapping) -> Result<()>;

    /// Whether no process is attached any more, as seen after the last
    /// [`unmap_segment`](Self::unmap_segment). Always `false` for
    /// [`Lifecycle::HandleRefcounted`] backends.
    fn is_orphaned(resource: &Self::Resource) -> Result<bool>;

    /// Destroy the kernel object. A no-op for handle-refcounted backends.
    fn destroy_segment(resource: Self::Resource) -> Result<()>;

    /// Release the local reference without unmapping or destroying.
    fn close_handle(resource: Self::Resource) {
        drop(resource);
    }
}
