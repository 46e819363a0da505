//! POSIX named semaphore implementation using `sem_open`.

use std::ffi::CString;

use libc::{O_CREAT, O_EXCL, c_int, c_uint, sem_t};
use tracing::debug;

use crate::config::IpcConfig;
use crate::error::{ErrorKind, Result, ShmError};

use super::SemaphoreAccess;

/// Owner read/write.
const SEM_PERMISSIONS: c_uint = 0o600;

/// Attempts to win the create/open race against concurrent unlinks.
const OPEN_RETRIES: usize = 10;

/// Platform semaphore handle for POSIX named semaphores.
#[derive(Debug)]
pub struct PlatformSemaphore {
    name: CString,
    semaphore: *mut sem_t,
    created: bool,
}

// SAFETY: a named semaphore handle may be used from any thread; the
// operations on it are thread-safe by definition.
#[allow(unsafe_code)]
unsafe impl Send for PlatformSemaphore {}

impl PlatformSemaphore {
    /// Open or create the semaphore named `native_key` (`/name`).
    #[allow(unsafe_code)]
    pub fn open(
        native_key: &str,
        initial_value: u32,
        mode: SemaphoreAccess,
        _config: &IpcConfig,
    ) -> Result<Self> {
        const FUNCTION: &str = "SystemSemaphore::handle";

        let name = CString::new(native_key).map_err(|e| {
            ShmError::new(ErrorKind::KeyError, FUNCTION, &format!("invalid key: {e}"))
        })?;

        if mode == SemaphoreAccess::Create {
            // Start over with a fresh object; holders of the old one keep it
            // until they close it.
            unsafe { libc::sem_unlink(name.as_ptr()) };
        }

        for _ in 0..OPEN_RETRIES {
            let semaphore = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    O_CREAT | O_EXCL,
                    SEM_PERMISSIONS,
                    initial_value as c_uint,
                )
            };
            if semaphore != libc::SEM_FAILED {
                debug!(name = native_key, initial_value, "created posix semaphore");
                return Ok(Self {
                    name,
                    semaphore,
                    created: true,
                });
            }
            let errno = last_errno();
            if errno != libc::EEXIST {
                return Err(ShmError::from_errno(FUNCTION, errno));
            }

            let semaphore = unsafe { libc::sem_open(name.as_ptr(), 0) };
            if semaphore != libc::SEM_FAILED {
                return Ok(Self {
                    name,
                    semaphore,
                    created: false,
                });
            }
            let errno = last_errno();
            if errno != libc::ENOENT {
                return Err(ShmError::from_errno(FUNCTION, errno));
            }
            // Unlinked between the two calls; try again.
        }

        Err(ShmError::new(
            ErrorKind::UnknownError,
            FUNCTION,
            "semaphore kept disappearing while opening",
        ))
    }

    /// Whether this process created the semaphore.
    pub const fn is_creator(&self) -> bool {
        self.created
    }

    /// `sem_wait`, retried on `EINTR`.
    #[allow(unsafe_code)]
    pub fn acquire(&mut self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.semaphore) } == 0 {
                return Ok(());
            }
            let errno = last_errno();
            if errno != libc::EINTR {
                return Err(ShmError::from_errno("SystemSemaphore::acquire", errno));
            }
        }
    }

    /// `sem_post`, `n` times.
    #[allow(unsafe_code)]
    pub fn release(&mut self, n: u32) -> Result<()> {
        for _ in 0..n {
            if unsafe { libc::sem_post(self.semaphore) } == -1 {
                return Err(ShmError::last_os_error("SystemSemaphore::release"));
            }
        }
        Ok(())
    }

    /// Unlink the name; the object disappears once every opener closes it.
    pub fn remove(self) -> Result<()> {
        unlink(&self.name)
    }

    /// Unlink the name while holding one count of the object.
    ///
    /// Waiters already blocked on the old object are never told it was
    /// unlinked, so the held count is posted back to let them drain.
    pub fn remove_held(mut self) -> Result<()> {
        unlink(&self.name)?;
        self.release(1)
    }

    /// Unlink `native_key` without having it open.
    pub fn remove_by_name(native_key: &str) -> Result<()> {
        let name = CString::new(native_key).map_err(|e| {
            ShmError::new(
                ErrorKind::KeyError,
                "SystemSemaphore::remove",
                &format!("invalid key: {e}"),
            )
        })?;
        unlink(&name)
    }
}

impl Drop for PlatformSemaphore {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.semaphore);
        }
    }
}

#[allow(unsafe_code)]
fn unlink(name: &CString) -> Result<()> {
    if unsafe { libc::sem_unlink(name.as_ptr()) } == -1 {
        let errno = last_errno();
        if errno != libc::ENOENT {
            return Err(ShmError::from_errno("SystemSemaphore::remove", errno));
        }
    }
    Ok(())
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
