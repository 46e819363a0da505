//! File <-> segment copies.
//!
//! The segment holds a little-endian `u64` payload length followed by the
//! payload itself. Both sides touch the buffer only while holding the lock.

use std::path::Path;

use anyhow::{Context, Result, bail};
use ktsm::{AccessMode, IpcConfig, SharedMemory};
use tracing::{debug, info};

/// Bytes taken by the length prefix.
pub const LENGTH_PREFIX: usize = std::mem::size_of::<u64>();

/// Create a segment for `key` holding the contents of `path`.
///
/// The segment lives as long as the returned handle.
pub fn load(key: &str, path: &Path, config: IpcConfig) -> Result<(SharedMemory, usize)> {
    let payload = std::fs::read(path).context("unable to load file")?;

    let mut memory = SharedMemory::with_config(key, config);
    memory
        .create(LENGTH_PREFIX + payload.len(), AccessMode::ReadWrite)
        .context("unable to create system memory share")?;
    write_payload(&mut memory, &payload)?;

    info!(key, bytes = payload.len(), path = %path.display(), "loaded file into segment");
    Ok((memory, payload.len()))
}

/// Copy the payload of the segment for `key` into `path`.
pub fn save(key: &str, path: &Path, config: IpcConfig) -> Result<usize> {
    let mut memory = SharedMemory::with_config(key, config);
    memory
        .attach(AccessMode::ReadOnly)
        .context("unable to attach to shared memory")?;

    let payload = read_payload(&mut memory)?;
    std::fs::write(path, &payload).context("unable to write file")?;

    memory
        .detach()
        .context("unable to detach from shared memory")?;
    info!(key, bytes = payload.len(), path = %path.display(), "saved segment to file");
    Ok(payload.len())
}

/// Write the length prefix and `payload` under the lock.
pub fn write_payload(memory: &mut SharedMemory, payload: &[u8]) -> Result<()> {
    let mut guard = memory.lock_guard()?;
    let Some(buffer) = guard.data() else {
        bail!("segment is not writable");
    };
    let end = LENGTH_PREFIX + payload.len();
    if buffer.len() < end {
        bail!(
            "segment too small: {} bytes for a {} byte payload",
            buffer.len(),
            payload.len()
        );
    }

    buffer[..LENGTH_PREFIX].copy_from_slice(&(payload.len() as u64).to_le_bytes());
    buffer[LENGTH_PREFIX..end].copy_from_slice(payload);
    debug!(bytes = payload.len(), "wrote payload");
    Ok(())
}

/// Read the length prefix and payload under the lock.
///
/// A prefix claiming more bytes than the segment holds is rejected.
pub fn read_payload(memory: &mut SharedMemory) -> Result<Vec<u8>> {
    let guard = memory.lock_guard()?;
    let Some(buffer) = guard.const_data() else {
        bail!("not attached");
    };
    if buffer.len() < LENGTH_PREFIX {
        bail!("segment too small for a length prefix");
    }

    let mut prefix = [0_u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&buffer[..LENGTH_PREFIX]);
    let declared = u64::from_le_bytes(prefix);
    let available = buffer.len() - LENGTH_PREFIX;
    let len = usize::try_from(declared)
        .ok()
        .filter(|&len| len <= available)
        .with_context(|| {
            format!("corrupt length prefix: {declared} bytes declared, {available} available")
        })?;

    Ok(buffer[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unique_key(name: &str) -> String {
        format!("ktsm-tools-{}-{name}", std::process::id())
    }

    #[test]
    fn test_load_then_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        let contents: Vec<u8> = (0..=255).cycle().take(3000).collect();
        std::fs::write(&input, &contents).expect("write input");

        let key = unique_key("roundtrip");
        let (memory, loaded) = load(&key, &input, IpcConfig::default()).expect("load");
        assert_eq!(loaded, contents.len());

        let saved = save(&key, &output, IpcConfig::default()).expect("save");
        assert_eq!(saved, contents.len());
        assert_eq!(std::fs::read(&output).expect("read output"), contents);

        drop(memory);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("empty");
        let output = dir.path().join("copy");
        std::fs::write(&input, b"").expect("write");

        let key = unique_key("empty");
        let (_memory, loaded) = load(&key, &input, IpcConfig::default()).expect("load");
        assert_eq!(loaded, 0);
        assert_eq!(save(&key, &output, IpcConfig::default()).expect("save"), 0);
        assert!(std::fs::read(&output).expect("read").is_empty());
    }

    #[test]
    fn test_save_without_segment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = save(&unique_key("absent"), &dir.path().join("out"), IpcConfig::default())
            .expect_err("no segment");
        assert_eq!(err.to_string(), "unable to attach to shared memory");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(
            &unique_key("no_file"),
            &dir.path().join("missing"),
            IpcConfig::default(),
        )
        .expect_err("missing file");
        assert_eq!(err.to_string(), "unable to load file");
    }

    #[test]
    fn test_corrupt_prefix_is_rejected() {
        let key = unique_key("corrupt");
        let mut memory = SharedMemory::with_key(&key);
        memory.create(16, AccessMode::ReadWrite).expect("create");
        {
            let mut guard = memory.lock_guard().expect("lock");
            let buffer = guard.data().expect("writable");
            buffer[..LENGTH_PREFIX].copy_from_slice(&u64::MAX.to_le_bytes());
        }

        let err = read_payload(&mut memory).expect_err("corrupt");
        assert!(err.to_string().starts_with("corrupt length prefix"));
        assert!(!memory.is_locked());
    }
}
