//! Windows shared memory using pagefile-backed file mappings.
//!
//! The kernel destroys a named mapping when its last handle closes, so
//! detaching only unmaps and closes; there is never anything to destroy.

use std::ptr::{self, NonNull};

use winapi::ctypes::c_void;
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::winerror::ERROR_ALREADY_EXISTS;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, FILE_MAP_READ, MapViewOfFile, OpenFileMappingW,
    UnmapViewOfFile, VirtualQuery,
};
use winapi::um::winnt::{HANDLE, MEMORY_BASIC_INFORMATION, PAGE_READWRITE};

use crate::error::{ErrorKind, Result, ShmError};
use crate::wide::to_wide;

use super::{AccessMode, Lifecycle, Mapping, SegmentBackend};

/// File mapping backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsSegment;

/// Handle to a named file mapping.
#[derive(Debug)]
pub struct WindowsResource {
    handle: HANDLE,
}

// SAFETY: kernel handles are process-wide and usable from any thread.
#[allow(unsafe_code)]
unsafe impl Send for WindowsResource {}

impl Drop for WindowsResource {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}

const fn map_access(mode: AccessMode) -> DWORD {
    match mode {
        AccessMode::ReadOnly => FILE_MAP_READ,
        AccessMode::ReadWrite => FILE_MAP_ALL_ACCESS,
    }
}

impl SegmentBackend for WindowsSegment {
    type Resource = WindowsResource;

    const LIFECYCLE: Lifecycle = Lifecycle::HandleRefcounted;

    #[allow(unsafe_code)]
    fn create_segment(native_key: &str, size: usize) -> Result<WindowsResource> {
        const FUNCTION: &str = "SharedMemory::create";

        if native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }
        if size == 0 {
            return Err(ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size"));
        }

        let name = to_wide(native_key);
        let size = size as u64;
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null_mut(),
                PAGE_READWRITE,
                (size >> 32) as DWORD,
                size as DWORD,
                name.as_ptr(),
            )
        };
        if handle.is_null() {
            return Err(ShmError::last_os_error(FUNCTION));
        }
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            unsafe { CloseHandle(handle) };
            return Err(ShmError::new(ErrorKind::AlreadyExists, FUNCTION, "already exists"));
        }

        Ok(WindowsResource { handle })
    }

    #[allow(unsafe_code)]
    fn open_segment(native_key: &str, mode: AccessMode) -> Result<WindowsResource> {
        const FUNCTION: &str = "SharedMemory::attach";

        if native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }

        let name = to_wide(native_key);
        let handle = unsafe { OpenFileMappingW(map_access(mode), FALSE, name.as_ptr()) };
        if handle.is_null() {
            return Err(ShmError::last_os_error(FUNCTION));
        }
        Ok(WindowsResource { handle })
    }

    #[allow(unsafe_code)]
    fn map_segment(resource: &mut WindowsResource, mode: AccessMode) -> Result<Mapping> {
        const FUNCTION: &str = "SharedMemory::attach (MapViewOfFile)";

        let view = unsafe { MapViewOfFile(resource.handle, map_access(mode), 0, 0, 0) };
        if view.is_null() {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
        let queried = unsafe {
            VirtualQuery(
                view,
                &raw mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if queried == 0 {
            let err = ShmError::last_os_error("SharedMemory::attach (VirtualQuery)");
            unsafe { UnmapViewOfFile(view) };
            return Err(err);
        }

        let ptr = NonNull::new(view.cast::<u8>())
            .ok_or_else(|| ShmError::new(ErrorKind::UnknownError, FUNCTION, "null mapping"))?;
        Ok(Mapping::new(ptr, info.RegionSize))
    }

    #[allow(unsafe_code)]
    fn unmap_segment(_resource: &mut WindowsResource, mapping: &Mapping) -> Result<()> {
        if unsafe { UnmapViewOfFile(mapping.as_ptr().cast::<c_void>().cast_const()) } == 0 {
            return Err(ShmError::last_os_error("SharedMemory::detach (UnmapViewOfFile)"));
        }
        Ok(())
    }

    fn is_orphaned(_resource: &WindowsResource) -> Result<bool> {
        Ok(false)
    }

    fn destroy_segment(resource: WindowsResource) -> Result<()> {
        drop(resource);
        Ok(())
    }
}
