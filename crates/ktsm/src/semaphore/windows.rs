//! Windows semaphore implementation using `CreateSemaphoreW`.
//!
//! The kernel keeps the semaphore alive while any process holds a handle
//! to it, so there is nothing to remove explicitly.

use std::ptr;

use winapi::shared::winerror::ERROR_ALREADY_EXISTS;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::synchapi::{ReleaseSemaphore, WaitForSingleObjectEx};
use winapi::um::winbase::{CreateSemaphoreW, INFINITE, WAIT_OBJECT_0};
use winapi::um::winnt::{HANDLE, LONG, MAXLONG};

use crate::config::IpcConfig;
use crate::error::{ErrorKind, Result, ShmError};
use crate::wide::to_wide;

use super::SemaphoreAccess;

/// Platform semaphore handle for Windows.
#[derive(Debug)]
pub struct PlatformSemaphore {
    handle: HANDLE,
    created: bool,
}

// SAFETY: kernel handles are process-wide and usable from any thread.
#[allow(unsafe_code)]
unsafe impl Send for PlatformSemaphore {}

impl PlatformSemaphore {
    /// Create the semaphore, or open it if it already exists.
    ///
    /// Windows cannot reset the count of an existing semaphore, so
    /// [`SemaphoreAccess::Create`] behaves like `Open`.
    #[allow(unsafe_code)]
    pub fn open(
        native_key: &str,
        initial_value: u32,
        _mode: SemaphoreAccess,
        _config: &IpcConfig,
    ) -> Result<Self> {
        let name = to_wide(native_key);
        let initial = LONG::try_from(initial_value).map_err(|_| {
            ShmError::new(
                ErrorKind::UnknownError,
                "SystemSemaphore::handle",
                "initial value too large",
            )
        })?;

        let handle = unsafe { CreateSemaphoreW(ptr::null_mut(), initial, MAXLONG, name.as_ptr()) };
        if handle.is_null() {
            return Err(ShmError::last_os_error("SystemSemaphore::handle"));
        }
        let created = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;

        Ok(Self { handle, created })
    }

    /// Whether this call created the kernel object.
    pub const fn is_creator(&self) -> bool {
        self.created
    }

    /// Infinite wait on the semaphore handle.
    #[allow(unsafe_code)]
    pub fn acquire(&mut self) -> Result<()> {
        if unsafe { WaitForSingleObjectEx(self.handle, INFINITE, 0) } != WAIT_OBJECT_0 {
            return Err(ShmError::last_os_error("SystemSemaphore::acquire"));
        }
        Ok(())
    }

    /// Atomic increment by `n`.
    #[allow(unsafe_code)]
    pub fn release(&mut self, n: u32) -> Result<()> {
        let count = LONG::try_from(n).map_err(|_| {
            ShmError::new(
                ErrorKind::UnknownError,
                "SystemSemaphore::release",
                "release count too large",
            )
        })?;
        if unsafe { ReleaseSemaphore(self.handle, count, ptr::null_mut()) } == 0 {
            return Err(ShmError::last_os_error("SystemSemaphore::release"));
        }
        Ok(())
    }

    /// Closing the handle is all there is; the kernel owns the object.
    pub fn remove(self) -> Result<()> {
        Ok(())
    }

    /// Give back the held count and close the handle.
    pub fn remove_held(mut self) -> Result<()> {
        self.release(1)
    }

    /// Nothing to remove by name on Windows.
    pub fn remove_by_name(_native_key: &str) -> Result<()> {
        Ok(())
    }
}

impl Drop for PlatformSemaphore {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
