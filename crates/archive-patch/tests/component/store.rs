//! Patch store formats and the builder working together

use crate::common::{archive_of, generate_test_data, mutate, temp_dir};
use archive_patch::store::{
    self, Candidate, HashedStore, PatchRecord, PatchStore, PatchStoreBuilder, RobinHoodTable,
    SequentialStore,
};
use archive_patch::{
    Archive, DeltaConfig, DeltaSignature, Error, Fingerprint, RenameMap, Representation,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashMap;

fn builder_with(count: usize) -> PatchStoreBuilder {
    let mut builder = PatchStoreBuilder::new();
    for i in 0..count {
        let content = format!("content of entry {i}");
        let record = PatchRecord::new(Fingerprint::of(content.as_bytes()).unwrap());
        builder
            .insert(&format!("data/entry_{i:04}.bin"), record)
            .unwrap();
    }
    builder
}

#[test]
fn test_formats_agree() {
    let builder = builder_with(500);
    let dir = temp_dir();
    let seq_path = dir.path().join("patches.pseq");
    let hashed_path = dir.path().join("patches.psrh");

    builder.write_sequential(&seq_path).unwrap();
    builder.write_hashed(&hashed_path, 0.8).unwrap();

    let sequential = store::open(&seq_path).unwrap();
    let hashed = store::open(&hashed_path).unwrap();
    assert_eq!(sequential.len(), 500);
    assert_eq!(hashed.len(), 500);
    assert_eq!(sequential.names(), hashed.names());

    for name in sequential.names() {
        assert_eq!(
            sequential.lookup(&name).unwrap(),
            hashed.lookup(&name).unwrap(),
            "{name}"
        );
    }
    assert!(hashed.lookup("data/entry_9999.bin").unwrap().is_none());
}

#[test]
fn test_hashed_store_decodes_on_demand() {
    let builder = builder_with(64);
    let dir = temp_dir();
    let path = dir.path().join("lazy.psrh");
    builder.write_hashed(&path, 0.5).unwrap();

    let store = HashedStore::open(&path).unwrap();
    assert_eq!(store.capacity(), 128);
    assert_eq!(store.materialized(), 0);

    store.lookup("DATA\\ENTRY_0007.BIN").unwrap().unwrap();
    store.lookup("data/entry_0012.bin").unwrap().unwrap();
    store.lookup("data/entry_0007.bin").unwrap().unwrap();
    assert_eq!(store.materialized(), 2);
}

#[test]
fn test_full_load_factor() {
    let builder = builder_with(40);
    let table = builder.build_table(1.0).unwrap();
    assert_eq!(table.capacity(), 40);
    assert_eq!(table.len(), 40);

    let mut bytes = Vec::new();
    HashedStore::write_table(&table, &mut bytes).unwrap();
    let store = HashedStore::from_bytes(bytes).unwrap();
    for i in 0..40 {
        assert!(store.contains(&format!("data/entry_{i:04}.bin")));
    }
}

#[test]
fn test_record_with_deltas_survives_both_formats() {
    let old = generate_test_data(9000);
    let new = mutate(&old, 3);

    let mut record = PatchRecord::new(Fingerprint::of(&new).unwrap());
    record.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(&old).unwrap(),
        archive_patch::delta::create(&old, &new, DeltaSignature::Lzma).unwrap(),
    ));
    record.push(Candidate::unchanged(
        Representation::Stored,
        Fingerprint::of(b"stored form").unwrap(),
    ));

    let mut builder = PatchStoreBuilder::new();
    builder.insert("textures/wall.dds", record.clone()).unwrap();

    let mut seq = Vec::new();
    builder.build_sequential().write_to(&mut seq).unwrap();
    let from_seq = SequentialStore::read_from(&mut seq.as_slice()).unwrap();

    let mut hashed = Vec::new();
    HashedStore::write_table(&builder.build_table(0.75).unwrap(), &mut hashed).unwrap();
    let from_hashed = HashedStore::from_bytes(hashed).unwrap();

    assert_eq!(*from_seq.lookup("textures/wall.dds").unwrap().unwrap(), record);
    assert_eq!(*from_hashed.lookup("textures/wall.dds").unwrap().unwrap(), record);
}

#[test]
fn test_builder_from_archives_with_codec_choice() {
    let v1 = archive_of(&[("a.txt", "version one of a"), ("b.txt", "b")]);
    let target = archive_of(&[("a.txt", "version two of a"), ("b.txt", "b")]);

    let mut builder =
        PatchStoreBuilder::new().delta_config(DeltaConfig::new().signature(DeltaSignature::Lzma));
    let sources: [&dyn Archive; 1] = [&v1];
    builder
        .add_from_archives(&sources, &target, &RenameMap::new())
        .unwrap();

    let a = builder.get("a.txt").unwrap();
    let delta = a.candidates[0].delta.as_ref().unwrap();
    assert_eq!(delta.signature, DeltaSignature::Lzma);

    // Deriving the same names twice is a builder error
    assert!(matches!(
        builder.add_from_archives(&sources, &target, &RenameMap::new()),
        Err(Error::DuplicateKey(_))
    ));
}

#[test]
fn test_damaged_hashed_file_is_unavailable() {
    let dir = temp_dir();
    let path = dir.path().join("damaged.psrh");
    builder_with(10).write_hashed(&path, 0.5).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 5);
    std::fs::write(&path, bytes).unwrap();

    let err = store::open(&path).unwrap_err();
    assert!(matches!(err, Error::PatchStoreUnavailable { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_persisted_table_returns_latest_value(
        ops in proptest::collection::vec(
            ("[a-z]{1,3}(/[a-z]{1,4}){0,2}", proptest::collection::vec(any::<u8>(), 0..16)),
            1..80,
        )
    ) {
        let mut table = RobinHoodTable::with_capacity(96);
        let mut model = HashMap::new();
        for (key, value) in ops {
            prop_assert!(table.put(key.as_bytes().to_vec(), value.clone()));
            model.insert(key, value);
        }

        for (key, value) in &model {
            prop_assert_eq!(table.get(key.as_bytes()), Some(value));
        }
        prop_assert_eq!(table.len(), model.len());
    }
}
