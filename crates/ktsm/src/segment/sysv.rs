//! System V shared memory segments (`shmget` / `shmat`).
//!
//! The native key is the path of a marker file; `ftok` on that file gives
//! the IPC key. The kernel counts attachments in `shm_nattch`, which is
//! also what tells the last detaching process to remove the segment.

use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use libc::{IPC_CREAT, IPC_EXCL, IPC_RMID, IPC_STAT, SHM_RDONLY};
use libc::{c_int, c_void, key_t};
use tracing::debug;

use crate::error::{ErrorKind, Result, ShmError};
use crate::key_file::{create_key_file, ftok, remove_key_file};

use super::{AccessMode, Lifecycle, Mapping, SegmentBackend};

/// Owner read/write for newly created segments.
const SHM_PERMISSIONS: c_int = 0o600;

/// System V segment backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysvSegment;

/// An identified System V segment.
#[derive(Debug)]
pub struct SysvResource {
    path: PathBuf,
    key: key_t,
    id: c_int,
}

impl SysvResource {
    /// Marker file the key was derived from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Segment identifier returned by `shmget`.
    pub const fn id(&self) -> c_int {
        self.id
    }
}

impl SegmentBackend for SysvSegment {
    type Resource = SysvResource;

    const LIFECYCLE: Lifecycle = Lifecycle::Persistent;

    #[allow(unsafe_code)]
    fn create_segment(native_key: &str, size: usize) -> Result<SysvResource> {
        const FUNCTION: &str = "SharedMemory::create";

        if native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }
        if size == 0 {
            return Err(ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size"));
        }

        let path = PathBuf::from(native_key);
        let created_file = create_key_file(&path).map_err(|e| e.context(FUNCTION))?;
        let cleanup = |path: &Path| {
            if created_file {
                let _ = remove_key_file(path);
            }
        };

        let key = match ftok(&path) {
            Ok(key) => key,
            Err(e) => {
                cleanup(&path);
                return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, e.message()));
            }
        };

        let id = unsafe { libc::shmget(key, size, SHM_PERMISSIONS | IPC_CREAT | IPC_EXCL) };
        if id == -1 {
            let errno = last_errno();
            return Err(match errno {
                // Someone else's segment; its marker file stays.
                libc::EEXIST => ShmError::new(ErrorKind::AlreadyExists, FUNCTION, "already exists"),
                libc::EINVAL => {
                    cleanup(&path);
                    ShmError::new(ErrorKind::InvalidSize, FUNCTION, "invalid size")
                }
                _ => {
                    cleanup(&path);
                    ShmError::from_errno(FUNCTION, errno)
                }
            });
        }

        debug!(path = %path.display(), id, size, "created sysv segment");
        Ok(SysvResource { path, key, id })
    }

    #[allow(unsafe_code)]
    fn open_segment(native_key: &str, mode: AccessMode) -> Result<SysvResource> {
        const FUNCTION: &str = "SharedMemory::attach";

        if native_key.is_empty() {
            return Err(ShmError::new(ErrorKind::KeyError, FUNCTION, "key is empty"));
        }

        let path = PathBuf::from(native_key);
        if !path.exists() {
            return Err(ShmError::new(ErrorKind::NotFound, FUNCTION, "doesn't exist"));
        }
        let key = ftok(&path).map_err(|e| e.context(FUNCTION))?;

        let permissions = match mode {
            AccessMode::ReadOnly => 0o400,
            AccessMode::ReadWrite => SHM_PERMISSIONS,
        };
        let id = unsafe { libc::shmget(key, 0, permissions) };
        if id == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        Ok(SysvResource { path, key, id })
    }

    #[allow(unsafe_code)]
    fn map_segment(resource: &mut SysvResource, mode: AccessMode) -> Result<Mapping> {
        const FUNCTION: &str = "SharedMemory::attach (shmat)";

        let flags = match mode {
            AccessMode::ReadOnly => SHM_RDONLY,
            AccessMode::ReadWrite => 0,
        };
        let addr = unsafe { libc::shmat(resource.id, ptr::null(), flags) };
        if addr as isize == -1 {
            return Err(ShmError::last_os_error(FUNCTION));
        }

        let size = match segment_stat(resource.id) {
            Ok(ds) => ds.shm_segsz,
            Err(errno) => {
                unsafe { libc::shmdt(addr) };
                return Err(ShmError::from_errno(FUNCTION, errno));
            }
        };

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| ShmError::new(ErrorKind::UnknownError, FUNCTION, "null mapping"))?;
        debug!(key = resource.key, id = resource.id, size, "attached sysv segment");
        Ok(Mapping::new(ptr, size))
    }

    #[allow(unsafe_code)]
    fn unmap_segment(_resource: &mut SysvResource, mapping: &Mapping) -> Result<()> {
        const FUNCTION: &str = "SharedMemory::detach (shmdt)";

        if unsafe { libc::shmdt(mapping.as_ptr().cast::<c_void>().cast_const()) } == -1 {
            let errno = last_errno();
            return Err(match errno {
                libc::EINVAL => ShmError::new(ErrorKind::NotFound, FUNCTION, "not attached"),
                _ => ShmError::from_errno(FUNCTION, errno),
            });
        }
        Ok(())
    }

    fn is_orphaned(resource: &SysvResource) -> Result<bool> {
        match segment_stat(resource.id) {
            Ok(ds) => Ok(ds.shm_nattch == 0),
            // Already removed by someone else.
            Err(libc::EINVAL | libc::EIDRM) => Ok(false),
            Err(errno) => Err(ShmError::from_errno("SharedMemory::detach (IPC_STAT)", errno)),
        }
    }

    #[allow(unsafe_code)]
    fn destroy_segment(resource: SysvResource) -> Result<()> {
        if unsafe { libc::shmctl(resource.id, IPC_RMID, ptr::null_mut()) } == -1 {
            let errno = last_errno();
            if errno != libc::EINVAL && errno != libc::EIDRM {
                return Err(ShmError::from_errno("SharedMemory::detach (IPC_RMID)", errno));
            }
        }
        debug!(path = %resource.path.display(), id = resource.id, "removed sysv segment");
        remove_key_file(&resource.path).map_err(|e| e.context("SharedMemory::detach"))
    }
}

/// `IPC_STAT` on segment `id`, returning the raw `errno` on failure.
#[allow(unsafe_code)]
fn segment_stat(id: c_int) -> std::result::Result<libc::shmid_ds, c_int> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    if unsafe { libc::shmctl(id, IPC_STAT, &raw mut ds) } == -1 {
        return Err(last_errno());
    }
    Ok(ds)
}

fn last_errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn marker(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_create_map_destroy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = marker(&dir, "segment");

        let mut resource = SysvSegment::create_segment(&key, 1024).expect("create");
        let mapping =
            SysvSegment::map_segment(&mut resource, AccessMode::ReadWrite).expect("map");
        assert!(mapping.len() >= 1024);

        SysvSegment::unmap_segment(&mut resource, &mapping).expect("unmap");
        assert!(SysvSegment::is_orphaned(&resource).expect("stat"));
        SysvSegment::destroy_segment(resource).expect("destroy");
        assert!(!Path::new(&key).exists());
    }

    #[test]
    fn test_create_twice_is_already_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = marker(&dir, "twice");

        let resource = SysvSegment::create_segment(&key, 64).expect("create");
        let err = SysvSegment::create_segment(&key, 64).expect_err("second create");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(Path::new(&key).exists());

        SysvSegment::destroy_segment(resource).expect("destroy");
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SysvSegment::open_segment(&marker(&dir, "missing"), AccessMode::ReadWrite)
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_second_mapping_keeps_segment_alive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = marker(&dir, "shared");

        let mut owner = SysvSegment::create_segment(&key, 128).expect("create");
        let owner_map = SysvSegment::map_segment(&mut owner, AccessMode::ReadWrite).expect("map");

        let mut peer = SysvSegment::open_segment(&key, AccessMode::ReadOnly).expect("open");
        let peer_map = SysvSegment::map_segment(&mut peer, AccessMode::ReadOnly).expect("map");

        SysvSegment::unmap_segment(&mut owner, &owner_map).expect("unmap owner");
        assert!(!SysvSegment::is_orphaned(&owner).expect("stat"));

        SysvSegment::unmap_segment(&mut peer, &peer_map).expect("unmap peer");
        assert!(SysvSegment::is_orphaned(&peer).expect("stat"));
        SysvSegment::destroy_segment(peer).expect("destroy");
    }
}
