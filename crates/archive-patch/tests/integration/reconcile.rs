//! Full reconciliation runs over in-memory archives

use crate::common::{archive_of, init_logging, mutate, random_data, store_for, temp_dir};
use archive_patch::delta::{self, Delta, DeltaSignature};
use archive_patch::reconcile::{EntryStatus, IssueKind, Reconciler};
use archive_patch::store::{Candidate, PatchRecord, PatchStoreBuilder, SequentialStore};
use archive_patch::{
    Archive, CompressionPolicy, DeltaConfig, Fingerprint, MemoryArchive, PatchConfig,
    ReconcileOptions, RenameMap, Representation,
};
use pretty_assertions::assert_eq;

fn live(archive: &MemoryArchive, name: &str) -> Vec<u8> {
    archive.read(name, Representation::Live).unwrap()
}

#[test]
fn test_every_known_variant_is_patched() {
    init_logging();
    let v1 = archive_of(&[("a.txt", "abc"), ("b.txt", "shared")]);
    let v2 = archive_of(&[("a.txt", "abx"), ("b.txt", "shared")]);
    let target = archive_of(&[("a.txt", "abcd"), ("b.txt", "shared")]);
    let store = store_for(&[&v1, &v2], &target, &RenameMap::new());

    for installed in [&v1, &v2] {
        let mut archive = installed.clone();
        let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
        let report = reconciler
            .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
            .unwrap();

        assert_eq!(report.status("a.txt"), Some(EntryStatus::Patched));
        assert_eq!(report.status("b.txt"), Some(EntryStatus::UpToDate));
        assert!(report.is_clean(), "{report}");
        assert_eq!(live(&archive, "a.txt"), b"abcd");
    }
}

#[test]
fn test_report_lists_every_failed_entry() {
    let v1 = archive_of(&[("a.txt", "abc"), ("b.txt", "bbb"), ("c.txt", "ccc")]);
    let target = archive_of(&[("a.txt", "abcd"), ("b.txt", "bbbb"), ("c.txt", "cccc")]);
    let store = store_for(&[&v1], &target, &RenameMap::new());

    // a.txt was modified locally, c.txt is gone and orphan.bin is unknown
    let mut archive = archive_of(&[
        ("a.txt", "locally edited"),
        ("b.txt", "bbb"),
        ("orphan.bin", "?"),
    ]);
    let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
    let report = reconciler
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    let failed: Vec<_> = report.failed_entries().collect();
    assert_eq!(
        failed,
        vec![
            ("a.txt", EntryStatus::NoSourceMatch),
            ("orphan.bin", EntryStatus::MissingFromStore),
        ]
    );
    assert_eq!(report.status("b.txt"), Some(EntryStatus::Patched));
    assert_eq!(report.issues_of(IssueKind::NoSourceMatch).count(), 1);
    assert!(report.has_issue("c.txt", IssueKind::MissingSource));
    assert!(
        report
            .to_string()
            .starts_with("3 entries: 0 up to date, 1 patched, 0 failed, 1 unmatched, 1 pruned")
    );

    // Unmatched entries are left as they were
    assert_eq!(live(&archive, "a.txt"), b"locally edited");
    assert!(!archive.contains("orphan.bin"));
}

#[test]
fn test_corrupt_delta_is_recorded_and_run_continues() {
    let mut broken = delta::create(b"abc", b"abcd", DeltaSignature::Uncompressed).unwrap();
    broken.control_block = vec![0u8; 7];
    let mut bad = PatchRecord::new(Fingerprint::of(b"abcd").unwrap());
    bad.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(b"abc").unwrap(),
        broken,
    ));

    let mut good = PatchRecord::new(Fingerprint::of(b"xyz!").unwrap());
    good.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(b"xyz").unwrap(),
        delta::create(b"xyz", b"xyz!", DeltaSignature::Bzip2).unwrap(),
    ));
    let store = SequentialStore::from_records([("bad.txt", bad), ("good.txt", good)]);

    let mut archive = archive_of(&[("bad.txt", "abc"), ("good.txt", "xyz")]);
    let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
    let report = reconciler
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert_eq!(report.status("bad.txt"), Some(EntryStatus::PatchFailed));
    assert_eq!(report.status("good.txt"), Some(EntryStatus::Patched));
    let corrupt: Vec<_> = report.issues_of(IssueKind::CorruptDelta).collect();
    assert_eq!(corrupt.len(), 1);
    assert_eq!(corrupt[0].name, "bad.txt");
    assert_eq!(live(&archive, "bad.txt"), b"abc");
}

#[test]
fn test_delta_with_extreme_seek_is_recorded_on_the_pool() {
    // Parks the old cursor at i64::MAX, then asks for two more add bytes
    let mut control = Vec::new();
    for value in [0, 0, i64::MAX, 2, 0, 0] {
        control.extend_from_slice(&delta::offtout(value));
    }
    let hostile = Delta {
        signature: DeltaSignature::Uncompressed,
        control_block: control,
        diff_block: vec![1, 2],
        extra_block: Vec::new(),
        output_size: 2,
    };
    let mut bad = PatchRecord::new(Fingerprint::of(b"ab").unwrap());
    bad.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(b"abc").unwrap(),
        hostile,
    ));

    let mut records = vec![("data/hostile.bin".to_string(), bad)];
    let mut entries = vec![("data/hostile.bin".to_string(), "abc".to_string())];
    for i in 0..8 {
        let old = format!("entry {i} before");
        let new = format!("entry {i} after");
        let mut record = PatchRecord::new(Fingerprint::of(new.as_bytes()).unwrap());
        record.push(Candidate::with_delta(
            Representation::Live,
            Fingerprint::of(old.as_bytes()).unwrap(),
            delta::create(old.as_bytes(), new.as_bytes(), DeltaSignature::Bzip2).unwrap(),
        ));
        records.push((format!("data/entry_{i}.txt"), record));
        entries.push((format!("data/entry_{i}.txt"), old));
    }
    let store = SequentialStore::from_records(records);
    let pairs: Vec<(&str, &str)> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_str()))
        .collect();
    let mut archive = archive_of(&pairs);

    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true).threads(4))
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert_eq!(
        report.status("data/hostile.bin"),
        Some(EntryStatus::PatchFailed)
    );
    assert!(report.has_issue("data/hostile.bin", IssueKind::CorruptDelta));
    assert_eq!(report.count(EntryStatus::Patched), 8);
    assert_eq!(live(&archive, "data/hostile.bin"), b"abc");
    assert_eq!(live(&archive, "data/entry_3.txt"), b"entry 3 after");
}

#[test]
fn test_unverified_output_is_not_written() {
    // The delta is well formed but produces the wrong content
    let mut record = PatchRecord::new(Fingerprint::of(b"abcd").unwrap());
    record.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(b"abc").unwrap(),
        delta::create(b"abc", b"wxyz", DeltaSignature::Lzma).unwrap(),
    ));
    let store = SequentialStore::from_records([("a.txt", record)]);

    let mut archive = archive_of(&[("a.txt", "abc")]);
    let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
    let report = reconciler
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert_eq!(report.status("a.txt"), Some(EntryStatus::PatchFailed));
    assert_eq!(report.issues_of(IssueKind::PatchFailed).count(), 1);
    assert_eq!(live(&archive, "a.txt"), b"abc");
}

#[test]
fn test_missing_entries_can_go_unreported() {
    let v1 = archive_of(&[("a.txt", "abc"), ("b.txt", "bbb")]);
    let target = archive_of(&[("a.txt", "abcd"), ("b.txt", "bbbb")]);
    let store = store_for(&[&v1], &target, &RenameMap::new());

    let mut archive = archive_of(&[("a.txt", "abc")]);
    let options = ReconcileOptions::new()
        .simulate(true)
        .report_missing_entries(false);
    let report = Reconciler::new(&store, options)
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert!(report.is_clean(), "{report}");
    assert_eq!(report.status("b.txt"), None);
}

#[test]
fn test_thread_count_does_not_change_outcome() {
    let mut old = MemoryArchive::new();
    let mut target = MemoryArchive::new();
    for i in 0..48u64 {
        let name = format!("data/set_{}/file_{i:02}.bin", i % 4);
        let content = random_data(i, 1500 + i as usize * 10);
        target.add(&name, mutate(&content, i)).unwrap();
        old.add(&name, content).unwrap();
    }
    let store = store_for(&[&old], &target, &RenameMap::new());

    let mut results = Vec::new();
    for threads in [1, 4] {
        let mut archive = old.clone();
        let options = ReconcileOptions::new().simulate(true).threads(threads);
        let report = Reconciler::new(&store, options)
            .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
            .unwrap();
        assert_eq!(report.count(EntryStatus::Patched), 48);
        results.push((report.entries.clone(), archive));
    }

    assert_eq!(results[0].0, results[1].0);
    for name in target.entry_names() {
        assert_eq!(live(&results[0].1, &name), live(&target, &name));
        assert_eq!(live(&results[1].1, &name), live(&target, &name));
    }
}

#[test]
fn test_one_config_drives_build_and_reconcile() {
    let config = PatchConfig::new()
        .delta(DeltaConfig::new().signature(DeltaSignature::Uncompressed))
        .compression(CompressionPolicy::uncompressed())
        .reconcile(ReconcileOptions::new().simulate(true).threads(2));

    let mut old = MemoryArchive::with_policy(config.compression.clone());
    old.add("maps/zone.dat", b"zone layout v1".to_vec()).unwrap();
    let mut target = MemoryArchive::with_policy(config.compression.clone());
    target.add("maps/zone.dat", b"zone layout v2".to_vec()).unwrap();

    let sources: [&dyn Archive; 1] = [&old];
    let mut builder = PatchStoreBuilder::with_config(&config);
    builder
        .add_from_archives(&sources, &target, &RenameMap::new())
        .unwrap();
    let store = builder.build_sequential();

    let reconciler = Reconciler::from_config(&store, &config);
    assert!(reconciler.options().simulate);
    assert_eq!(reconciler.options().threads, Some(2));

    let mut archive = old.clone();
    let dir = temp_dir();
    let destination = dir.path().join("out");
    let report = reconciler
        .run(&mut archive, &mut RenameMap::new(), &destination)
        .unwrap();

    assert_eq!(report.status("maps/zone.dat"), Some(EntryStatus::Patched));
    assert!(report.simulated);
    assert!(!destination.exists());
    assert_eq!(live(&archive, "maps/zone.dat"), b"zone layout v2");
}
