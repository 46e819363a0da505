//! POSIX shared memory segments (`shm_open` / `mmap`).
//!
//! POSIX objects carry no attach count, so the first page of every object
//! is a control page holding one. The data region starts right after it.
//!
//! ```text
//! +-----------------+------------------------------+
//! | control page    | data (size rounded to pages) |
//! | u64 attach count|                              |
//! +-----------------+------------------------------+
//! ```
//!
//! The count is only changed while the handle's semaphore is held. A
//! process that crashes while attached leaves it too high, and the object
//! is then never destroyed automatically.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use libc::{MAP_FAILED, MAP_SHARED, O_CREAT, O_EXCL, O_RDWR, PROT_READ, PROT_WRITE};
use libc::{c_int, c_uint, c_void, off_t};
use tracing::debug;

use crate::error::{ErrorKind, Result, ShmError};

use super::{AccessMode, Lifecycle, Mapping, SegmentBackend};

/// Owner read/write.
const SHM_PERMISSIONS: c_uint = 0o600;

/// POSIX segment backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixSegment;

/// An open POSIX shared memory object.
#[derive(Debug)]
pub struct PosixResource {
    name: CString,
    fd: RawFd,
    page_size: usize,
    /// Control page while mapped.
    control: Option<NonNull<c_void>>,
    /// Attach count left after the last unmap.
    remaining: u64,
}

// SAFETY: the descriptor and the control page are process-wide.
#[allow(unsafe_code)]
unsafe impl Send for PosixResource {}

impl PosixResource {
    // SAFETY: the control page is mapped read-write, page aligned and
    // outlives the borrow of `self`.
    #[allow(unsafe_code)]
    fn counter(&self) -> Option<&AtomicU64> {
        self.control
            .map(|page| unsafe { &*page.as_ptr().cast::<AtomicU64>() })
    }
}

impl Drop for PosixResource {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            if let Some(page) = self.control.take() {
                libc::munmap(page.as_ptr(), self.page_size);
            }
            libc::close(self.fd);
        }
    }
}

impl SegmentBackend for PosixSegment {
    type Resource = PosixResource;

    const LIFECYCLE: Lifecycle = Lifecycle::Persistent;

    #[allow(unsafe_code)]
    fn create_segment(native_key: &str, size: usize) -> Result<PosixResource> {
        const FUNCTION: &str = "SharedMemory::create";

        if size == 0 {
            return Err(ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size"));
        }
        let name = shm_name(native_key, FUNCTION)?;
        let page_size = page_size();

        let fd = unsafe {
            libc::shm_open(name.as_ptr(), O_CREAT | O_EXCL | O_RDWR, SHM_PERMISSIONS)
        };
        if fd == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        let truncated = match size
            .checked_add(page_size)
            .and_then(|total| off_t::try_from(total).ok())
        {
            Some(total) if unsafe { libc::ftruncate(fd, total) } != -1 => Ok(()),
            Some(_) => Err(match last_errno() {
                libc::EINVAL | libc::EFBIG => {
                    ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size")
                }
                errno => ShmError::from_errno(FUNCTION, errno),
            }),
            None => Err(ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size")),
        };
        if let Err(e) = truncated {
            unsafe {
                libc::close(fd);
                libc::shm_unlink(name.as_ptr());
            }
            return Err(e);
        }

        debug!(name = native_key, size, "created posix segment");
        Ok(PosixResource {
            name,
            fd,
            page_size,
            control: None,
            remaining: 0,
        })
    }

    #[allow(unsafe_code)]
    fn open_segment(native_key: &str, _mode: AccessMode) -> Result<PosixResource> {
        const FUNCTION: &str = "SharedMemory::attach";

        let name = shm_name(native_key, FUNCTION)?;
        // Read-write even for read-only handles: the control page is updated
        // on every attach and detach.
        let fd = unsafe { libc::shm_open(name.as_ptr(), O_RDWR, 0) };
        if fd == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        Ok(PosixResource {
            name,
            fd,
            page_size: page_size(),
            control: None,
            remaining: 0,
        })
    }

    #[allow(unsafe_code)]
    fn map_segment(resource: &mut PosixResource, mode: AccessMode) -> Result<Mapping> {
        const FUNCTION: &str = "SharedMemory::attach (mmap)";

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(resource.fd, &raw mut st) } == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }
        let total = usize::try_from(st.st_size).unwrap_or(0);
        if total <= resource.page_size {
            return Err(ShmError::new(
                ErrorKind::InvalidSize,
                FUNCTION,
                "object has no data region",
            ));
        }
        let len = total - resource.page_size;

        let control = unsafe {
            libc::mmap(
                ptr::null_mut(),
                resource.page_size,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                resource.fd,
                0,
            )
        };
        if control == MAP_FAILED {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        let prot = match mode {
            AccessMode::ReadOnly => PROT_READ,
            AccessMode::ReadWrite => PROT_READ | PROT_WRITE,
        };
        let data = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                prot,
                MAP_SHARED,
                resource.fd,
                resource.page_size as off_t,
            )
        };
        if data == MAP_FAILED {
            let err = ShmError::last_os_error(FUNCTION);
            unsafe { libc::munmap(control, resource.page_size) };
            return Err(err);
        }

        resource.control = NonNull::new(control);
        let attached = resource
            .counter()
            .map_or(0, |count| count.fetch_add(1, Ordering::AcqRel) + 1);

        let ptr = NonNull::new(data.cast::<u8>())
            .ok_or_else(|| ShmError::new(ErrorKind::UnknownError, FUNCTION, "null mapping"))?;
        debug!(size = len, attached, "attached posix segment");
        Ok(Mapping::new(ptr, len))
    }

    #[allow(unsafe_code)]
    fn unmap_segment(resource: &mut PosixResource, mapping: &Mapping) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::detach (munmap)";

        if unsafe { libc::munmap(mapping.as_ptr().cast::<c_void>(), mapping.len()) } == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        resource.remaining = resource.counter().map_or(0, |count| {
            count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
        });
        if let Some(page) = resource.control.take() {
            unsafe { libc::munmap(page.as_ptr(), resource.page_size) };
        }
        Ok(())
    }

    fn is_orphaned(resource: &PosixResource) -> Result<bool> {
        Ok(resource.remaining == 0)
    }

    #[allow(unsafe_code)]
    fn destroy_segment(resource: PosixResource) -> Result<()> {
        if unsafe { libc::shm_unlink(resource.name.as_ptr()) } == -1 {
            let errno = last_errno();
            if errno != libc::ENOENT {
                return Err(ShmError::from_errno("SharedMemory::detach (shm_unlink)", errno));
            }
        }
        debug!(name = ?resource.name, "unlinked posix segment");
        Ok(())
    }
}

fn shm_name(native_key: &str, function: &str) -> Result<CString> {
    if native_key.is_empty() {
        return Err(ShmError::new(ErrorKind::KeyError, function, "key is empty"));
    }
    CString::new(native_key)
        .map_err(|e| ShmError::new(ErrorKind::KeyError, function, &format!("invalid key: {e}")))
}

#[allow(unsafe_code)]
fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
