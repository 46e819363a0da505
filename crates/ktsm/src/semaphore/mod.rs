//! Named system semaphores shared between unrelated processes.
//!
//! A [`SystemSemaphore`] is identified by a user key; the native object is
//! derived from it with the semaphore prefix (see [`crate::key`]). The
//! platform object is opened lazily on first use and kept open until the
//! semaphore is rebound or dropped. Dropping never removes the kernel
//! object; only [`SystemSemaphore::remove`] does.
//!
//! ## Platform support
//!
//! - Unix (default): System V `semget` / `semop` with `SEM_UNDO`, keyed by
//!   `ftok` on a marker file
//! - Unix (`posix-ipc` feature): `sem_open` / `sem_wait` / `sem_post`
//! - Windows: `CreateSemaphoreW` / `WaitForSingleObjectEx` /
//!   `ReleaseSemaphore`

#[cfg(all(unix, feature = "posix-ipc"))]
mod posix;
#[cfg(all(unix, not(feature = "posix-ipc")))]
mod sysv;
#[cfg(windows)]
mod windows;

#[cfg(all(unix, feature = "posix-ipc"))]
pub use posix::PlatformSemaphore;
#[cfg(all(unix, not(feature = "posix-ipc")))]
pub use sysv::PlatformSemaphore;
#[cfg(windows)]
pub use windows::PlatformSemaphore;

use tracing::debug;

use crate::config::IpcConfig;
use crate::error::{ErrorKind, Result, ShmError};
use crate::key::{Purpose, derive_native_key};

/// How [`SystemSemaphore::set_key`] treats an existing kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemaphoreAccess {
    /// Open the semaphore if it exists, create it with the initial count
    /// otherwise.
    #[default]
    Open,
    /// Take ownership: create the semaphore, or reset an existing one to
    /// the initial count. Used to recover from a peer that crashed while
    /// holding it.
    Create,
}

/// A named counting semaphore visible to every process on the machine.
pub struct SystemSemaphore {
    key: String,
    native_key: String,
    initial_value: u32,
    config: IpcConfig,
    handle: Option<PlatformSemaphore>,
}

impl std::fmt::Debug for SystemSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSemaphore")
            .field("key", &self.key)
            .field("native_key", &self.native_key)
            .field("initial_value", &self.initial_value)
            .field("open", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl SystemSemaphore {
    /// Bind a semaphore to `key` with the default configuration.
    pub fn new(key: &str, initial_value: u32, mode: SemaphoreAccess) -> Result<Self> {
        Self::with_config(key, initial_value, mode, IpcConfig::default())
    }

    /// Bind a semaphore to `key`.
    ///
    /// With [`SemaphoreAccess::Create`] the native object is opened (and its
    /// count reset) immediately; with [`SemaphoreAccess::Open`] that happens
    /// on the first [`acquire`](Self::acquire) or [`release`](Self::release).
    pub fn with_config(
        key: &str,
        initial_value: u32,
        mode: SemaphoreAccess,
        config: IpcConfig,
    ) -> Result<Self> {
        let mut semaphore = Self::unbound(config);
        semaphore.set_key(key, initial_value, mode)?;
        Ok(semaphore)
    }

    /// A semaphore with no key. Every operation fails with `KeyError` until
    /// a key is set.
    pub fn unbound(config: IpcConfig) -> Self {
        Self {
            key: String::new(),
            native_key: String::new(),
            initial_value: 0,
            config,
            handle: None,
        }
    }

    /// Rebind to `key`.
    ///
    /// Rebinding to the same key in [`SemaphoreAccess::Open`] mode is a
    /// no-op. Otherwise the local handle is closed (the kernel object stays)
    /// and the new key takes effect.
    pub fn set_key(&mut self, key: &str, initial_value: u32, mode: SemaphoreAccess) -> Result<()> {
        if key == self.key && mode == SemaphoreAccess::Open {
            return Ok(());
        }

        self.handle = None;
        self.key = key.to_string();
        self.native_key = derive_native_key(key, Purpose::Semaphore, &self.config.namespace());
        self.initial_value = initial_value;

        if mode == SemaphoreAccess::Create && !key.is_empty() {
            self.open_handle(SemaphoreAccess::Create)?;
        }
        Ok(())
    }

    /// User key this semaphore is bound to (empty when unbound).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Derived platform identifier.
    pub fn native_key(&self) -> &str {
        &self.native_key
    }

    /// Count a newly created semaphore starts with.
    pub const fn initial_value(&self) -> u32 {
        self.initial_value
    }

    /// Whether this process created the kernel object it currently has open.
    pub fn is_creator(&self) -> bool {
        self.handle.as_ref().is_some_and(PlatformSemaphore::is_creator)
    }

    /// Block until the count can be decremented.
    ///
    /// Contention blocks; only unrecoverable system errors fail.
    pub fn acquire(&mut self) -> Result<()> {
        self.handle_mut("SystemSemaphore::acquire")?.acquire()
    }

    /// Increment the count by `n`, waking up to `n` blocked acquirers.
    ///
    /// If the object has to be created to release into it, it already holds
    /// its initial count and is left alone.
    pub fn release(&mut self, n: u32) -> Result<()> {
        const FUNCTION: &str = "SystemSemaphore::release";

        if n == 0 {
            return Err(ShmError::new(
                ErrorKind::UnknownError,
                FUNCTION,
                "release count must be positive",
            ));
        }
        let opened = self.handle.is_none();
        let handle = self.handle_mut(FUNCTION)?;
        if opened && handle.is_creator() {
            debug!(key = %self.key, "release into a new semaphore skipped");
            return Ok(());
        }
        handle.release(n)
    }

    /// Destroy the kernel object.
    ///
    /// Peers that still have it open re-create it on their next operation.
    /// A no-op on Windows, where the kernel owns the object.
    pub fn remove(&mut self) -> Result<()> {
        if self.key.is_empty() {
            return Ok(());
        }
        match self.handle.take() {
            Some(handle) => handle.remove(),
            None => PlatformSemaphore::remove_by_name(&self.native_key),
        }
    }

    /// Destroy the kernel object while this process holds one count of it.
    ///
    /// Unlike [`remove`](Self::remove) followed by a release, the held count
    /// never ends up in a semaphore created by someone else.
    pub fn remove_held(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.remove_held(),
            None => Err(ShmError::new(
                ErrorKind::NotFound,
                "SystemSemaphore::remove",
                "semaphore is not open",
            )),
        }
    }

    fn handle_mut(&mut self, function: &str) -> Result<&mut PlatformSemaphore> {
        if self.handle.is_none() {
            self.open_handle(SemaphoreAccess::Open)
                .map_err(|e| e.context(function))?;
        }
        self.handle
            .as_mut()
            .ok_or_else(|| ShmError::new(ErrorKind::UnknownError, function, "no handle"))
    }

    fn open_handle(&mut self, mode: SemaphoreAccess) -> Result<()> {
        if self.native_key.is_empty() {
            return Err(ShmError::new(
                ErrorKind::KeyError,
                "SystemSemaphore::handle",
                "key is empty",
            ));
        }

        let handle =
            PlatformSemaphore::open(&self.native_key, self.initial_value, mode, &self.config)?;
        debug!(
            key = %self.key,
            native_key = %self.native_key,
            ?mode,
            created = handle.is_creator(),
            "opened system semaphore"
        );
        self.handle = Some(handle);
        Ok(())
    }
}
