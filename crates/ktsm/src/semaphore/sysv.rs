//! System V semaphore implementation.
//!
//! Each semaphore is a set of one element obtained with `semget` on the key
//! of a marker file. The process that creates the set initializes it with a
//! `semop`, which also stamps `sem_otime`; every other process waits for
//! that stamp before its first operation, so nobody can decrement a count
//! that has not been set yet.
//!
//! All operations use `SEM_UNDO`, so the kernel gives back a count held by
//! a process that exits without releasing it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use libc::{IPC_CREAT, IPC_EXCL, IPC_RMID, IPC_STAT, SEM_UNDO, SETVAL};
use libc::{c_int, c_short, key_t, sembuf};
use tracing::{debug, warn};

use crate::config::IpcConfig;
use crate::error::{ErrorKind, Result, ShmError};
use crate::key_file::{create_key_file, ftok, remove_key_file};

use super::SemaphoreAccess;

/// Owner read/write.
const SEM_PERMISSIONS: c_int = 0o600;

/// Platform semaphore handle for System V IPC.
#[derive(Debug)]
pub struct PlatformSemaphore {
    /// Marker file the key is derived from.
    path: PathBuf,
    /// `ftok` key of the marker file.
    key: key_t,
    /// Semaphore set identifier.
    id: c_int,
    /// Initial count, kept to re-create a set removed by a peer.
    initial_value: u32,
    /// Whether this process created the marker file.
    created_file: bool,
    /// Whether this process created (or reset) the semaphore set.
    created_semaphore: bool,
    config: IpcConfig,
}

impl PlatformSemaphore {
    /// Open or create the semaphore whose marker file is `native_key`.
    pub fn open(
        native_key: &str,
        initial_value: u32,
        mode: SemaphoreAccess,
        config: &IpcConfig,
    ) -> Result<Self> {
        const FUNCTION: &str = "SystemSemaphore::handle";

        let path = PathBuf::from(native_key);
        let created_file = create_key_file(&path).map_err(|e| e.context(FUNCTION))?;
        let key = match ftok(&path) {
            Ok(key) => key,
            Err(e) => {
                if created_file {
                    let _ = remove_key_file(&path);
                }
                return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, e.message()));
            }
        };

        let (id, fresh) = get_or_create_set(key).map_err(|e| {
            if created_file {
                let _ = remove_key_file(&path);
            }
            e.context(FUNCTION)
        })?;

        let mut semaphore = Self {
            path,
            key,
            id,
            initial_value,
            created_file,
            created_semaphore: fresh,
            config: config.clone(),
        };

        if fresh {
            semaphore.initialize()?;
        } else if mode == SemaphoreAccess::Create {
            semaphore.reset()?;
            semaphore.created_semaphore = true;
        } else {
            semaphore.wait_for_initialization()?;
        }

        Ok(semaphore)
    }

    /// Whether this process created or reset the set.
    pub const fn is_creator(&self) -> bool {
        self.created_semaphore
    }

    /// Decrement by one, blocking while the count is zero.
    pub fn acquire(&mut self) -> Result<()> {
        self.modify(-1, "SystemSemaphore::acquire")
    }

    /// Increment by `n`.
    pub fn release(&mut self, n: u32) -> Result<()> {
        let count = c_short::try_from(n).map_err(|_| {
            ShmError::new(
                ErrorKind::UnknownError,
                "SystemSemaphore::release",
                "release count too large",
            )
        })?;
        self.modify(count, "SystemSemaphore::release")
    }

    /// Remove the set and its marker file.
    #[allow(unsafe_code)]
    pub fn remove(self) -> Result<()> {
        let result = unsafe { libc::semctl(self.id, 0, IPC_RMID) };
        if result == -1 {
            let errno = last_errno();
            if errno != libc::EINVAL && errno != libc::EIDRM {
                return Err(ShmError::from_errno("SystemSemaphore::remove", errno));
            }
        }
        debug!(path = %self.path.display(), id = self.id, "removed semaphore set");
        remove_key_file(&self.path)
    }

    /// Remove the set while holding one count of it.
    ///
    /// Blocked peers fail with `EIDRM` and re-open, so nobody inherits the
    /// held count.
    pub fn remove_held(self) -> Result<()> {
        self.remove()
    }

    /// Remove the set behind `native_key` without having it open.
    #[allow(unsafe_code)]
    pub fn remove_by_name(native_key: &str) -> Result<()> {
        let path = Path::new(native_key);
        if !path.exists() {
            return Ok(());
        }
        let key = ftok(path)?;
        let id = unsafe { libc::semget(key, 1, 0) };
        if id != -1 {
            unsafe { libc::semctl(id, 0, IPC_RMID) };
        }
        remove_key_file(path)
    }

    #[allow(unsafe_code)]
    fn modify(&mut self, count: c_short, function: &str) -> Result<()> {
        let mut reopened = false;
        loop {
            let mut op = sembuf {
                sem_num: 0,
                sem_op: count,
                sem_flg: SEM_UNDO as c_short,
            };
            if unsafe { libc::semop(self.id, &raw mut op, 1) } != -1 {
                return Ok(());
            }

            match last_errno() {
                libc::EINTR => {}
                libc::EINVAL | libc::EIDRM if !reopened => {
                    // A peer removed the set. Re-open (or re-create) it.
                    warn!(path = %self.path.display(), "semaphore set removed, re-opening");
                    self.reopen()?;
                    reopened = true;
                    if count > 0 {
                        // The count being returned belonged to the removed set.
                        return Ok(());
                    }
                }
                errno => return Err(ShmError::from_errno(function, errno)),
            }
        }
    }

    fn reopen(&mut self) -> Result<()> {
        let native_key = self.path.to_string_lossy().into_owned();
        let fresh = Self::open(
            &native_key,
            self.initial_value,
            SemaphoreAccess::Open,
            &self.config,
        )?;
        self.created_file |= fresh.created_file;
        self.key = fresh.key;
        self.id = fresh.id;
        self.created_semaphore = fresh.created_semaphore;
        Ok(())
    }

    /// Set the initial count of a fresh set.
    ///
    /// Both operations run atomically; the pair leaves the count at
    /// `initial_value` and stamps `sem_otime` even when that value is 0.
    #[allow(unsafe_code)]
    fn initialize(&mut self) -> Result<()> {
        let raise = c_short::try_from(self.initial_value.saturating_add(1)).map_err(|_| {
            ShmError::new(
                ErrorKind::UnknownError,
                "SystemSemaphore::initialize",
                "initial value too large",
            )
        })?;
        let mut ops = [
            sembuf {
                sem_num: 0,
                sem_op: raise,
                sem_flg: 0,
            },
            sembuf {
                sem_num: 0,
                sem_op: -1,
                sem_flg: 0,
            },
        ];

        loop {
            if unsafe { libc::semop(self.id, ops.as_mut_ptr(), ops.len()) } != -1 {
                debug!(
                    path = %self.path.display(),
                    id = self.id,
                    value = self.initial_value,
                    "initialized semaphore set"
                );
                return Ok(());
            }
            let errno = last_errno();
            if errno != libc::EINTR {
                return Err(ShmError::from_errno("SystemSemaphore::initialize", errno));
            }
        }
    }

    /// Force the count of an existing set back to `initial_value`.
    #[allow(unsafe_code)]
    fn reset(&mut self) -> Result<()> {
        if unsafe { libc::semctl(self.id, 0, SETVAL, 0 as c_int) } == -1 {
            return Err(ShmError::last_os_error("SystemSemaphore::reset"));
        }
        self.initialize()
    }

    /// Wait until the creator has stamped `sem_otime`.
    ///
    /// A creator that died between `semget` and its first `semop` leaves the
    /// set unstamped forever; after the configured timeout this process
    /// initializes it instead.
    #[allow(unsafe_code)]
    fn wait_for_initialization(&mut self) -> Result<()> {
        let start = Instant::now();
        loop {
            let mut ds: libc::semid_ds = unsafe { std::mem::zeroed() };
            if unsafe { libc::semctl(self.id, 0, IPC_STAT, &raw mut ds) } == -1 {
                return Err(ShmError::last_os_error("SystemSemaphore::handle"));
            }
            if ds.sem_otime != 0 {
                return Ok(());
            }
            if start.elapsed() >= self.config.semaphore_init_timeout {
                warn!(
                    path = %self.path.display(),
                    "semaphore creator never initialized the set, taking over"
                );
                self.created_semaphore = true;
                return self.initialize();
            }
            std::thread::sleep(self.config.semaphore_init_poll);
        }
    }
}

/// `semget` with exclusive create first, falling back to opening.
///
/// Returns the id and whether this call created the set.
#[allow(unsafe_code)]
fn get_or_create_set(key: key_t) -> Result<(c_int, bool)> {
    let id = unsafe { libc::semget(key, 1, SEM_PERMISSIONS | IPC_CREAT | IPC_EXCL) };
    if id != -1 {
        return Ok((id, true));
    }

    let errno = last_errno();
    if errno != libc::EEXIST {
        return Err(ShmError::from_errno("semget", errno));
    }

    let id = unsafe { libc::semget(key, 1, SEM_PERMISSIONS) };
    if id == -1 {
        return Err(ShmError::last_os_error("semget"));
    }
    Ok((id, false))
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
