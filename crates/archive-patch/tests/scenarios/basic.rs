//! The canonical patch, prune and missing-rename scenarios

use crate::common::{archive_of, init_logging, store_for, temp_dir};
use archive_patch::delta::{self, DeltaSignature};
use archive_patch::reconcile::{EntryStatus, IssueKind, Reconciler};
use archive_patch::store::{Candidate, PatchRecord, PatchStore, SequentialStore};
use archive_patch::{Archive, Fingerprint, ReconcileOptions, RenameMap, Representation};
use pretty_assertions::assert_eq;

#[test]
fn test_single_entry_is_patched() {
    init_logging();
    let mut record = PatchRecord::new(Fingerprint::of(b"abcd").unwrap());
    record.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(b"abc").unwrap(),
        delta::create(b"abc", b"abcd", DeltaSignature::Bzip2).unwrap(),
    ));
    let store = SequentialStore::from_records([("a.txt", record)]);

    let mut archive = archive_of(&[("a.txt", "abc")]);
    let dir = temp_dir();
    let report = Reconciler::new(&store, ReconcileOptions::new())
        .run(&mut archive, &mut RenameMap::new(), dir.path())
        .unwrap();

    assert_eq!(report.status("a.txt"), Some(EntryStatus::Patched));
    assert!(report.committed);
    assert_eq!(
        archive.read("a.txt", Representation::Live).unwrap(),
        b"abcd"
    );
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"abcd");
}

#[test]
fn test_entry_without_record_is_pruned() {
    let old = archive_of(&[("a.txt", "abc"), ("extra/orphan.bin", "left over")]);
    let target = archive_of(&[("a.txt", "abc")]);
    let store = store_for(&[&old], &target, &RenameMap::new());
    assert!(!store.contains("extra/orphan.bin"));

    let mut archive = old.clone();
    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true))
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert_eq!(
        report.status("extra/orphan.bin"),
        Some(EntryStatus::MissingFromStore)
    );
    assert!(!archive.contains("extra/orphan.bin"));
    assert_eq!(report.pruned_folders, 1);
    assert!(!archive.folders().contains(&"extra".to_string()));
    assert_eq!(report.status("a.txt"), Some(EntryStatus::UpToDate));
}

#[test]
fn test_missing_rename_source_is_reported_once() {
    let old = archive_of(&[("a.txt", "abc")]);
    let target = archive_of(&[("a.txt", "abc"), ("new/path.nif", "mesh")]);
    let mut renames = RenameMap::new();
    renames.insert("new/path.nif", "old/path.nif");
    let store = store_for(&[&old], &target, &renames);

    let mut archive = old.clone();
    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true))
        .run(&mut archive, &mut renames, temp_dir().path())
        .unwrap();

    let missing: Vec<_> = report.issues_of(IssueKind::MissingSource).collect();
    assert_eq!(missing.len(), 1, "{report}");
    assert_eq!(missing[0].name, "new/path.nif");
    assert_eq!(report.issues.len(), 1);
    assert_eq!(renames.source_for("new/path.nif"), Some("old/path.nif"));

    // Everything else still ran
    assert_eq!(report.status("a.txt"), Some(EntryStatus::UpToDate));
}
