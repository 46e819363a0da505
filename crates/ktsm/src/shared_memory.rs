//! The shared memory handle.
//!
//! [`SharedMemory`] pairs a named segment with a [`SystemSemaphore`] used as
//! its lock. The handle goes through three states:
//!
//! 1. Unbound: no key.
//! 2. Bound: a key (or a native key) is set.
//! 3. Attached: the segment is mapped into this process.
//!
//! `create`, `attach` and `detach` take the lock themselves unless the
//! handle already holds it. Reading or writing the buffer is only safe
//! while the lock is held; nothing enforces that.

use std::marker::PhantomData;
use std::{ptr, slice};

use tracing::{debug, warn};

use crate::config::IpcConfig;
use crate::error::{ErrorKind, Result, ShmError};
use crate::key::{Purpose, derive_native_key};
use crate::segment::{AccessMode, Lifecycle, Mapping, PlatformSegment, SegmentBackend};
use crate::semaphore::{SemaphoreAccess, SystemSemaphore};

/// A named shared memory segment guarded by a named system semaphore.
///
/// # Example
///
/// ```no_run
/// use ktsm::{AccessMode, SharedMemory};
///
/// let mut memory = SharedMemory::with_key("example");
/// memory.create(1024, AccessMode::ReadWrite)?;
///
/// memory.lock()?;
/// if let Some(buffer) = memory.data() {
///     buffer[..5].copy_from_slice(b"hello");
/// }
/// memory.unlock()?;
/// # Ok::<(), ktsm::ShmError>(())
/// ```
pub struct SharedMemory<B: SegmentBackend = PlatformSegment> {
    key: String,
    native_key: String,
    config: IpcConfig,
    semaphore: SystemSemaphore,
    resource: Option<B::Resource>,
    mapping: Option<Mapping>,
    mode: AccessMode,
    locked_by_me: bool,
    backend: PhantomData<fn() -> B>,
}

impl SharedMemory {
    /// An unbound handle using the platform backend.
    pub fn new() -> Self {
        Self::with_backend("", IpcConfig::default())
    }

    /// A handle bound to `key` using the platform backend.
    pub fn with_key(key: &str) -> Self {
        Self::with_backend(key, IpcConfig::default())
    }

    /// A handle bound to `key` with a custom configuration.
    pub fn with_config(key: &str, config: IpcConfig) -> Self {
        Self::with_backend(key, config)
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SegmentBackend> SharedMemory<B> {
    /// A handle bound to `key` using backend `B`.
    pub fn with_backend(key: &str, config: IpcConfig) -> Self {
        let native_key = derive_native_key(key, Purpose::SharedMemory, &config.namespace());
        Self {
            key: key.to_string(),
            native_key,
            semaphore: SystemSemaphore::unbound(config.clone()),
            config,
            resource: None,
            mapping: None,
            mode: AccessMode::ReadWrite,
            locked_by_me: false,
            backend: PhantomData,
        }
    }

    /// Bind the handle to `key`.
    ///
    /// Does nothing if the key is unchanged. Otherwise the lock is released,
    /// the segment detached and the platform handle closed first.
    pub fn set_key(&mut self, key: &str) {
        let native_key = derive_native_key(key, Purpose::SharedMemory, &self.config.namespace());
        if key == self.key && native_key == self.native_key {
            return;
        }
        self.reset_identity();
        self.key = key.to_string();
        self.native_key = native_key;
    }

    /// Bind the handle directly to a platform identifier.
    ///
    /// The user key becomes empty, which leaves the handle without a lock:
    /// [`lock`](Self::lock) fails and `create`/`attach`/`detach` run
    /// unlocked. Meant for segments created by other programs.
    pub fn set_native_key(&mut self, native_key: &str) {
        if self.key.is_empty() && native_key == self.native_key {
            return;
        }
        self.reset_identity();
        self.key.clear();
        self.native_key = native_key.to_string();
    }

    /// User key; empty when unbound or bound through a native key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Platform identifier of the segment.
    pub fn native_key(&self) -> &str {
        &self.native_key
    }

    /// Configuration the handle was built with.
    pub const fn config(&self) -> &IpcConfig {
        &self.config
    }

    /// Who destroys the segment on this platform.
    pub const fn lifecycle(&self) -> Lifecycle {
        B::LIFECYCLE
    }

    /// Whether the segment is mapped into this process.
    pub const fn is_attached(&self) -> bool {
        self.mapping.is_some()
    }

    /// Size of the mapped region as reported by the OS, 0 when unattached.
    ///
    /// May be larger than the size passed to [`create`](Self::create).
    pub fn size(&self) -> usize {
        self.mapping.as_ref().map_or(0, Mapping::len)
    }

    /// Access mode of the current attachment.
    pub const fn access_mode(&self) -> AccessMode {
        self.mode
    }

    /// Whether this handle currently holds the lock.
    pub const fn is_locked(&self) -> bool {
        self.locked_by_me
    }

    /// Create the segment with at least `size` bytes and attach to it.
    ///
    /// The lock semaphore is reset to a count of 1 first, so a lock left
    /// behind by a crashed process does not block the new segment.
    pub fn create(&mut self, size: usize, mode: AccessMode) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::create";

        if self.is_attached() {
            return Err(ShmError::new(ErrorKind::AlreadyExists, FUNCTION, "already attached"));
        }
        if size == 0 {
            return Err(ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size"));
        }
        if self.native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }

        self.bind_lock(SemaphoreAccess::Create)
            .map_err(|e| e.context(FUNCTION))?;
        let held = self.locked_by_me;

        self.with_lock(FUNCTION, |memory| {
            let mut resource = match B::create_segment(&memory.native_key, size) {
                Ok(resource) => resource,
                Err(e) => {
                    // The segment belongs to someone else on AlreadyExists;
                    // otherwise nothing uses the lock this call set up.
                    if e.kind() != ErrorKind::AlreadyExists
                        && !held
                        && memory.semaphore.is_creator()
                    {
                        memory.retire_lock();
                    }
                    return Err(e);
                }
            };
            match B::map_segment(&mut resource, mode) {
                Ok(mapping) => {
                    memory.install(resource, mapping, mode);
                    Ok(())
                }
                Err(e) => {
                    match B::LIFECYCLE {
                        Lifecycle::Persistent => {
                            if let Err(cleanup) = B::destroy_segment(resource) {
                                warn!(error = %cleanup, "failed to remove half-created segment");
                            }
                        }
                        Lifecycle::HandleRefcounted => B::close_handle(resource),
                    }
                    Err(e)
                }
            }
        })?;

        debug!(key = %self.key, native_key = %self.native_key, size = self.size(), "created segment");
        Ok(())
    }

    /// Attach to an existing segment.
    ///
    /// Fails with `AlreadyExists` when the handle is already attached; the
    /// existing attachment is left untouched.
    pub fn attach(&mut self, mode: AccessMode) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::attach";

        if self.is_attached() {
            return Err(ShmError::new(ErrorKind::AlreadyExists, FUNCTION, "already attached"));
        }
        if self.native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }

        self.bind_lock(SemaphoreAccess::Open)
            .map_err(|e| e.context(FUNCTION))?;
        let held = self.locked_by_me;

        self.with_lock(FUNCTION, |memory| {
            let mut resource = match B::open_segment(&memory.native_key, mode) {
                Ok(resource) => resource,
                Err(e) => {
                    // Nobody owns a segment under this key; do not leave a
                    // lock behind that only this attempt created.
                    if e.kind() == ErrorKind::NotFound && !held && memory.semaphore.is_creator() {
                        memory.retire_lock();
                    }
                    return Err(e);
                }
            };
            match B::map_segment(&mut resource, mode) {
                Ok(mapping) => {
                    memory.install(resource, mapping, mode);
                    Ok(())
                }
                Err(e) => {
                    B::close_handle(resource);
                    Err(e)
                }
            }
        })?;

        debug!(key = %self.key, size = self.size(), ?mode, "attached segment");
        Ok(())
    }

    /// Unmap the segment.
    ///
    /// On [`Lifecycle::Persistent`] platforms the last handle to detach
    /// destroys the segment and its lock semaphore. The semaphore goes away
    /// while still held, so a handle that locked before detaching no longer
    /// holds a lock afterwards and [`unlock`](Self::unlock) fails.
    pub fn detach(&mut self) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::detach";

        if !self.is_attached() {
            return Err(ShmError::new(ErrorKind::NotFound, FUNCTION, "not attached"));
        }

        self.with_lock(FUNCTION, |memory| {
            if memory.release_mapping()? {
                memory.retire_lock();
                debug!(key = %memory.key, native_key = %memory.native_key, "destroyed segment");
            }
            Ok(())
        })
    }

    /// Acquire the lock, blocking while another handle holds it.
    ///
    /// Calling this while already holding the lock logs a warning and
    /// succeeds without blocking.
    pub fn lock(&mut self) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::lock";

        if self.locked_by_me {
            warn!(key = %self.key, "lock() called while already holding the lock");
            return Ok(());
        }
        if self.key.is_empty() {
            return Err(ShmError::new(ErrorKind::LockError, FUNCTION, "no lock key"));
        }

        self.bind_lock(SemaphoreAccess::Open)
            .and_then(|()| self.semaphore.acquire())
            .map_err(|e| {
                ShmError::new(
                    ErrorKind::LockError,
                    FUNCTION,
                    &format!("unable to lock: {}", e.message()),
                )
            })?;
        self.locked_by_me = true;
        Ok(())
    }

    /// Release the lock.
    ///
    /// Fails with `LockError` if this handle does not hold it; the
    /// semaphore is not touched in that case.
    pub fn unlock(&mut self) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::unlock";

        if !self.locked_by_me {
            return Err(ShmError::new(ErrorKind::LockError, FUNCTION, "not locked"));
        }
        self.locked_by_me = false;
        self.semaphore.release(1).map_err(|e| {
            ShmError::new(
                ErrorKind::LockError,
                FUNCTION,
                &format!("unable to unlock: {}", e.message()),
            )
        })
    }

    /// Take the lock for the lifetime of the returned guard.
    ///
    /// If the handle already holds the lock the guard leaves it held when
    /// dropped.
    pub fn lock_guard(&mut self) -> Result<SharedMemoryGuard<'_, B>> {
        let owns_lock = !self.locked_by_me;
        if owns_lock {
            self.lock()?;
        }
        Ok(SharedMemoryGuard {
            memory: self,
            owns_lock,
        })
    }

    /// The mapped buffer for writing.
    ///
    /// `None` when unattached or attached read-only. Hold the lock while
    /// using it.
    #[allow(unsafe_code)]
    pub fn data(&mut self) -> Option<&mut [u8]> {
        if self.mode == AccessMode::ReadOnly {
            return None;
        }
        let mapping = self.mapping.as_ref()?;
        // SAFETY: the mapping is valid and writable until detach, which needs
        // `&mut self` and so cannot overlap this borrow.
        Some(unsafe { slice::from_raw_parts_mut(mapping.as_ptr(), mapping.len()) })
    }

    /// The mapped buffer for reading; `None` when unattached.
    ///
    /// Hold the lock while using it.
    #[allow(unsafe_code)]
    pub fn const_data(&self) -> Option<&[u8]> {
        let mapping = self.mapping.as_ref()?;
        // SAFETY: the mapping stays valid while `self` is borrowed.
        Some(unsafe { slice::from_raw_parts(mapping.as_ptr(), mapping.len()) })
    }

    /// Start of the mapped region, null when unattached.
    pub fn as_ptr(&self) -> *const u8 {
        self.mapping
            .as_ref()
            .map_or(ptr::null(), |mapping| mapping.as_ptr().cast_const())
    }

    /// Bind the lock semaphore to the current key.
    fn bind_lock(&mut self, access: SemaphoreAccess) -> Result<()> {
        if self.key.is_empty() {
            return Ok(());
        }
        self.semaphore.set_key(&self.key, 1, access)
    }

    /// Run `f` with the lock held, taking it only if not already held.
    fn with_lock<T>(
        &mut self,
        function: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let take = !self.key.is_empty() && !self.locked_by_me;
        if take {
            self.lock().map_err(|e| e.context(function))?;
        }

        let result = f(self);

        if take && self.locked_by_me {
            if let Err(e) = self.unlock() {
                warn!(key = %self.key, error = %e, "failed to release lock after {function}");
            }
        }
        result
    }

    /// Remove the lock semaphore while holding it.
    ///
    /// The handle no longer holds a lock afterwards.
    fn retire_lock(&mut self) {
        if !self.locked_by_me {
            return;
        }
        self.locked_by_me = false;
        if let Err(e) = self.semaphore.remove_held() {
            warn!(key = %self.key, error = %e, "failed to remove lock semaphore");
        }
    }

    fn install(&mut self, resource: B::Resource, mapping: Mapping, mode: AccessMode) {
        self.resource = Some(resource);
        self.mapping = Some(mapping);
        self.mode = mode;
    }

    /// Unmap and, when this was the last attachment, destroy the segment.
    ///
    /// Returns whether the segment was destroyed. Runs under the lock.
    fn release_mapping(&mut self) -> Result<bool> {
        let (Some(mut resource), Some(mapping)) = (self.resource.take(), self.mapping.take())
        else {
            return Err(ShmError::new(
                ErrorKind::NotFound,
                "SharedMemory::detach",
                "not attached",
            ));
        };

        if let Err(e) = B::unmap_segment(&mut resource, &mapping) {
            self.install(resource, mapping, self.mode);
            return Err(e);
        }

        if B::LIFECYCLE == Lifecycle::HandleRefcounted {
            B::close_handle(resource);
            return Ok(false);
        }

        match B::is_orphaned(&resource) {
            Ok(true) => match B::destroy_segment(resource) {
                Ok(()) => Ok(true),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "failed to destroy orphaned segment");
                    Ok(false)
                }
            },
            Ok(false) => {
                B::close_handle(resource);
                Ok(false)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "unable to read attach count");
                B::close_handle(resource);
                Ok(false)
            }
        }
    }

    /// Drop the lock, the attachment and the platform handles.
    fn reset_identity(&mut self) {
        if self.locked_by_me {
            if let Err(e) = self.unlock() {
                warn!(key = %self.key, error = %e, "failed to unlock while rebinding");
            }
        }
        if self.is_attached() {
            if let Err(e) = self.detach() {
                warn!(key = %self.key, error = %e, "failed to detach while rebinding");
                self.mapping = None;
            }
        }
        if let Some(resource) = self.resource.take() {
            B::close_handle(resource);
        }
        self.semaphore = SystemSemaphore::unbound(self.config.clone());
    }
}

impl<B: SegmentBackend> std::fmt::Debug for SharedMemory<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("key", &self.key)
            .field("native_key", &self.native_key)
            .field("attached", &self.is_attached())
            .field("size", &self.size())
            .field("mode", &self.mode)
            .field("locked_by_me", &self.locked_by_me)
            .finish_non_exhaustive()
    }
}

impl<B: SegmentBackend> Drop for SharedMemory<B> {
    fn drop(&mut self) {
        if self.locked_by_me {
            if let Err(e) = self.unlock() {
                warn!(key = %self.key, error = %e, "failed to unlock on drop");
            }
        }
        if self.is_attached() {
            if let Err(e) = self.detach() {
                warn!(key = %self.key, error = %e, "failed to detach on drop");
            }
        }
    }
}

/// Holds the lock of a [`SharedMemory`] until dropped.
pub struct SharedMemoryGuard<'a, B: SegmentBackend = PlatformSegment> {
    memory: &'a mut SharedMemory<B>,
    owns_lock: bool,
}

impl<B: SegmentBackend> SharedMemoryGuard<'_, B> {
    /// The buffer for writing; see [`SharedMemory::data`].
    pub fn data(&mut self) -> Option<&mut [u8]> {
        self.memory.data()
    }

    /// The buffer for reading; see [`SharedMemory::const_data`].
    pub fn const_data(&self) -> Option<&[u8]> {
        self.memory.const_data()
    }

    /// Size of the mapped region.
    pub fn size(&self) -> usize {
        self.memory.size()
    }
}

impl<B: SegmentBackend> Drop for SharedMemoryGuard<'_, B> {
    fn drop(&mut self) {
        if self.owns_lock && self.memory.locked_by_me {
            if let Err(e) = self.memory.unlock() {
                warn!(key = %self.memory.key, error = %e, "failed to unlock guard");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn unique_key(name: &str) -> String {
        format!("ktsm-unit-{}-{name}", std::process::id())
    }

    #[test]
    fn test_unbound_handle() {
        let mut memory = SharedMemory::new();
        assert_eq!(memory.key(), "");
        assert_eq!(memory.native_key(), "");
        assert!(!memory.is_attached());
        assert_eq!(memory.size(), 0);
        assert!(memory.as_ptr().is_null());

        let err = memory.create(16, AccessMode::ReadWrite).expect_err("no key");
        assert_eq!(err.kind(), ErrorKind::KeyError);
        let err = memory.attach(AccessMode::ReadWrite).expect_err("no key");
        assert_eq!(err.kind(), ErrorKind::KeyError);
    }

    #[test]
    fn test_detach_unattached_is_not_found() {
        let mut memory = SharedMemory::with_key(&unique_key("detach_unattached"));
        let err = memory.detach().expect_err("unattached");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "SharedMemory::detach: not attached");
    }

    #[test]
    fn test_create_zero_size() {
        let mut memory = SharedMemory::with_key(&unique_key("zero"));
        let err = memory.create(0, AccessMode::ReadWrite).expect_err("zero");
        assert_eq!(err.kind(), ErrorKind::InvalidSize);
        assert!(!memory.is_attached());
    }

    #[test]
    fn test_unlock_without_lock() {
        let mut memory = SharedMemory::with_key(&unique_key("unlock"));
        let err = memory.unlock().expect_err("not locked");
        assert_eq!(err.kind(), ErrorKind::LockError);
    }

    #[test]
    fn test_native_key_has_no_lock() {
        let mut memory = SharedMemory::new();
        memory.set_native_key("custom_native_name");
        assert_eq!(memory.key(), "");
        assert_eq!(memory.native_key(), "custom_native_name");

        let err = memory.lock().expect_err("no lock key");
        assert_eq!(err.kind(), ErrorKind::LockError);
    }

    #[test]
    fn test_set_key_rebinds() {
        let mut memory = SharedMemory::with_key("first");
        let first = memory.native_key().to_string();
        memory.set_key("first");
        assert_eq!(memory.native_key(), first);

        memory.set_key("second");
        assert_eq!(memory.key(), "second");
        assert_ne!(memory.native_key(), first);
    }

    #[test]
    fn test_double_lock_is_harmless() {
        let key = unique_key("double_lock");
        let mut memory = SharedMemory::with_key(&key);
        memory.create(64, AccessMode::ReadWrite).expect("create");

        memory.lock().expect("lock");
        memory.lock().expect("second lock does not block");
        assert!(memory.is_locked());
        memory.unlock().expect("unlock");
        assert!(!memory.is_locked());
        assert!(memory.unlock().is_err());

        memory.detach().expect("detach");
    }

    #[test]
    fn test_create_then_attach_again_fails() {
        let key = unique_key("already_attached");
        let mut memory = SharedMemory::with_key(&key);
        memory.create(64, AccessMode::ReadWrite).expect("create");

        let err = memory.attach(AccessMode::ReadWrite).expect_err("attached");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = memory.create(64, AccessMode::ReadWrite).expect_err("attached");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(memory.is_attached());

        memory.detach().expect("detach");
    }

    #[test]
    fn test_read_only_attachment_has_no_mutable_buffer() {
        let key = unique_key("read_only");
        let mut owner = SharedMemory::with_key(&key);
        owner.create(32, AccessMode::ReadWrite).expect("create");
        owner.data().expect("writable")[0] = 7;

        let mut reader = SharedMemory::with_key(&key);
        reader.attach(AccessMode::ReadOnly).expect("attach");
        assert_eq!(reader.access_mode(), AccessMode::ReadOnly);
        assert!(reader.data().is_none());
        assert_eq!(reader.const_data().expect("readable")[0], 7);

        reader.detach().expect("reader detach");
        owner.detach().expect("owner detach");
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let key = unique_key("guard");
        let mut memory = SharedMemory::with_key(&key);
        memory.create(16, AccessMode::ReadWrite).expect("create");

        {
            let mut guard = memory.lock_guard().expect("guard");
            guard.data().expect("buffer")[..2].copy_from_slice(b"ok");
            assert!(guard.size() >= 16);
        }
        assert!(!memory.is_locked());

        memory.lock().expect("lock");
        {
            let guard = memory.lock_guard().expect("nested guard");
            assert_eq!(&guard.const_data().expect("buffer")[..2], b"ok");
        }
        assert!(memory.is_locked());
        memory.unlock().expect("unlock");
    }

    #[cfg(all(unix, not(feature = "posix-ipc")))]
    fn lock_marker(key: &str, config: &IpcConfig) -> std::path::PathBuf {
        std::path::PathBuf::from(derive_native_key(
            key,
            Purpose::Semaphore,
            &config.namespace(),
        ))
    }

    #[cfg(all(unix, not(feature = "posix-ipc")))]
    #[test]
    fn test_failed_create_removes_new_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IpcConfig::new(dir.path());
        let key = unique_key("huge");

        let mut memory = SharedMemory::with_config(&key, config.clone());
        let err = memory
            .create(usize::MAX, AccessMode::ReadWrite)
            .expect_err("larger than the kernel allows");
        assert_eq!(err.kind(), ErrorKind::InvalidSize);
        assert!(!memory.is_attached());
        assert!(!memory.is_locked());
        assert!(!lock_marker(&key, &config).exists());
    }

    #[cfg(all(unix, not(feature = "posix-ipc")))]
    #[test]
    fn test_failed_create_keeps_lock_of_existing_segment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IpcConfig::new(dir.path());
        let key = unique_key("kept_lock");

        let mut owner = SharedMemory::with_config(&key, config.clone());
        owner.create(64, AccessMode::ReadWrite).expect("create");

        let mut other = SharedMemory::with_config(&key, config.clone());
        let err = other
            .create(64, AccessMode::ReadWrite)
            .expect_err("already exists");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(lock_marker(&key, &config).exists());

        owner.detach().expect("detach");
        assert!(!lock_marker(&key, &config).exists());
    }

    #[cfg(all(unix, not(feature = "posix-ipc")))]
    #[test]
    fn test_failed_attach_removes_new_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = IpcConfig::new(dir.path());
        let key = unique_key("attach_missing");

        let mut memory = SharedMemory::with_config(&key, config.clone());
        let err = memory.attach(AccessMode::ReadWrite).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!memory.is_locked());
        assert!(!lock_marker(&key, &config).exists());

        // The next user starts from a fresh lock with a count of 1.
        memory.lock().expect("lock");
        memory.unlock().expect("unlock");
        memory.semaphore.remove().expect("cleanup");
    }

    #[test]
    fn test_lifecycle_matches_backend() {
        let memory = SharedMemory::new();
        assert_eq!(memory.lifecycle(), PlatformSegment::LIFECYCLE);
    }
}
