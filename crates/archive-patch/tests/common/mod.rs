//! Common test utilities and fixtures

#![allow(dead_code)]

use archive_patch::store::{PatchStoreBuilder, SequentialStore};
use archive_patch::{Archive, MemoryArchive, RenameMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Opt into log output for a test run
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a temporary directory for tests
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Generate deterministic test data of a specific size
pub fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

/// Generate seeded pseudo-random data
pub fn random_data(seed: u64, size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size).map(|_| rng.random()).collect()
}

/// Copy of `data` with a few scattered edits and an insertion
pub fn mutate(data: &[u8], seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = data.to_vec();
    if out.is_empty() {
        out.extend_from_slice(b"fresh");
        return out;
    }
    for _ in 0..(out.len() / 500).max(1) {
        let index = rng.random_range(0..out.len());
        out[index] = out[index].wrapping_add(1);
    }
    let at = rng.random_range(0..=out.len());
    out.splice(at..at, b"-inserted-".iter().copied());
    out
}

/// Build an archive from `(name, content)` pairs
pub fn archive_of(entries: &[(&str, &str)]) -> MemoryArchive {
    let mut archive = MemoryArchive::new();
    for (name, content) in entries {
        archive
            .add(name, content.as_bytes().to_vec())
            .expect("Failed to add entry");
    }
    archive
}

/// Derive a sequential store that patches any of `sources` into `target`
pub fn store_for(
    sources: &[&MemoryArchive],
    target: &MemoryArchive,
    renames: &RenameMap,
) -> SequentialStore {
    let sources: Vec<&dyn Archive> = sources.iter().map(|a| *a as &dyn Archive).collect();
    let mut builder = PatchStoreBuilder::new();
    builder
        .add_from_archives(&sources, target, renames)
        .expect("Failed to derive records");
    builder.build_sequential()
}
