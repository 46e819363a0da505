//! Configuration for shared memory handles and system semaphores

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::key::Namespace;

/// Configuration shared by a [`SharedMemory`](crate::SharedMemory) and its lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Directory holding the marker files that System V keys are derived
    /// from. `None` uses the system temporary directory.
    pub key_dir: Option<PathBuf>,

    /// How long an opener waits for the creator of a System V semaphore to
    /// finish initializing its count.
    pub semaphore_init_timeout: Duration,

    /// Poll interval while waiting for semaphore initialization
    pub semaphore_init_poll: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            key_dir: None,
            semaphore_init_timeout: Duration::from_secs(10),
            semaphore_init_poll: Duration::from_millis(1),
        }
    }
}

impl IpcConfig {
    /// Create a configuration that keeps marker files in `key_dir`
    pub fn new<P: AsRef<Path>>(key_dir: P) -> Self {
        Self {
            key_dir: Some(key_dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Set the marker file directory
    #[must_use]
    pub fn with_key_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.key_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the semaphore initialization timeout
    #[must_use]
    pub const fn with_semaphore_init_timeout(mut self, timeout: Duration) -> Self {
        self.semaphore_init_timeout = timeout;
        self
    }

    /// Resolved marker file directory
    pub fn key_dir(&self) -> PathBuf {
        self.key_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Native key namespace for the current platform under this configuration
    pub fn namespace(&self) -> Namespace {
        Namespace::platform_default_in(&self.key_dir())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_temp_dir() {
        let config = IpcConfig::default();
        assert_eq!(config.key_dir(), std::env::temp_dir());
        assert_eq!(config.semaphore_init_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder() {
        let config = IpcConfig::default()
            .with_key_dir("/var/run/ktsm")
            .with_semaphore_init_timeout(Duration::from_millis(250));
        assert_eq!(config.key_dir(), PathBuf::from("/var/run/ktsm"));
        assert_eq!(config.semaphore_init_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = IpcConfig::new("/tmp/keys");
        let json = serde_json::to_string(&config).expect("serialize");
        let back: IpcConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
