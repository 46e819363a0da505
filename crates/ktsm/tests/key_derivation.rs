#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Property tests for native key derivation.

use std::collections::HashSet;

use ktsm::key::{DIGEST_HEX_LEN, SEMAPHORE_PREFIX, SHARED_MEMORY_PREFIX};
use ktsm::{Namespace, Purpose, derive_native_key};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn distinct_keys_never_collide(
        keys in prop::collection::hash_set("[a-zA-Z0-9 _#./-]{1,24}", 1000..1200)
    ) {
        let native: HashSet<String> = keys
            .iter()
            .map(|key| derive_native_key(key, Purpose::SharedMemory, &Namespace::Kernel))
            .collect();
        prop_assert_eq!(native.len(), keys.len());
    }

    #[test]
    fn native_key_is_prefix_letters_digest(key in "[ -~]{1,40}") {
        let native = derive_native_key(&key, Purpose::SharedMemory, &Namespace::Kernel);
        let letters: String = key.chars().filter(char::is_ascii_alphabetic).collect();

        prop_assert!(native.starts_with(SHARED_MEMORY_PREFIX));
        prop_assert_eq!(
            &native[SHARED_MEMORY_PREFIX.len()..native.len() - DIGEST_HEX_LEN],
            letters.as_str()
        );
        prop_assert!(native[native.len() - DIGEST_HEX_LEN..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn purposes_never_share_a_name(key in "\\PC{1,32}") {
        let segment = derive_native_key(&key, Purpose::SharedMemory, &Namespace::PosixName);
        let semaphore = derive_native_key(&key, Purpose::Semaphore, &Namespace::PosixName);
        prop_assert_ne!(segment, semaphore);
    }

    #[test]
    fn derivation_is_deterministic(key in "\\PC{0,32}") {
        let first = derive_native_key(&key, Purpose::Semaphore, &Namespace::Kernel);
        let second = derive_native_key(&key, Purpose::Semaphore, &Namespace::Kernel);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn keys_differing_only_in_symbols_stay_apart() {
    let a = derive_native_key("queue #1", Purpose::SharedMemory, &Namespace::Kernel);
    let b = derive_native_key("queue #2", Purpose::SharedMemory, &Namespace::Kernel);
    assert_ne!(a, b);
    assert!(a.starts_with(&format!("{SHARED_MEMORY_PREFIX}queue")));
    assert!(b.starts_with(&format!("{SHARED_MEMORY_PREFIX}queue")));
}

#[test]
fn namespaces_shape_the_identifier() {
    let kernel = derive_native_key("abc", Purpose::Semaphore, &Namespace::Kernel);
    let posix = derive_native_key("abc", Purpose::Semaphore, &Namespace::PosixName);
    let dir = tempfile::tempdir().unwrap();
    let file = derive_native_key(
        "abc",
        Purpose::Semaphore,
        &Namespace::TempFile(dir.path().to_path_buf()),
    );

    assert!(kernel.starts_with(SEMAPHORE_PREFIX));
    assert_eq!(posix, format!("/{kernel}"));
    assert_eq!(std::path::Path::new(&file), dir.path().join(&kernel));
}
