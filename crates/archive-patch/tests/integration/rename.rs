//! Rename maps driving the rename phase

use crate::common::{archive_of, store_for, temp_dir};
use archive_patch::reconcile::{EntryStatus, IssueKind, ReconcileReport, Reconciler};
use archive_patch::{Archive, Error, ReconcileOptions, RenameMap, Representation};
use pretty_assertions::assert_eq;
use std::io::Cursor;

const RENAMES: &str = "\
# new name\told name
Meshes\\Armor\\Helm_v2.nif\tmeshes/armor/helm.nif
sound/intro.wav\tsound/old_intro.wav\r
";

#[test]
fn test_renamed_entries_are_copied_then_patched() {
    let old = archive_of(&[
        ("meshes/armor/helm.nif", "helm geometry v1"),
        ("sound/old_intro.wav", "intro audio"),
    ]);
    let target = archive_of(&[
        ("meshes/armor/helm_v2.nif", "helm geometry v2"),
        ("sound/intro.wav", "intro audio"),
    ]);
    let renames = RenameMap::from_reader(Cursor::new(RENAMES)).unwrap();
    assert_eq!(renames.len(), 2);
    let store = store_for(&[&old], &target, &renames);

    let mut archive = old.clone();
    let mut pending = renames.clone();
    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true))
        .run(&mut archive, &mut pending, temp_dir().path())
        .unwrap();

    assert!(pending.is_empty());
    assert_eq!(report.renamed, 2);
    assert_eq!(
        report.status("meshes/armor/helm_v2.nif"),
        Some(EntryStatus::Patched)
    );
    assert_eq!(report.status("sound/intro.wav"), Some(EntryStatus::UpToDate));

    // The old names have no records and are pruned
    assert_eq!(
        report.status("meshes/armor/helm.nif"),
        Some(EntryStatus::MissingFromStore)
    );
    assert_eq!(archive.entry_names(), target.entry_names());
    assert_eq!(
        archive
            .read("meshes/armor/helm_v2.nif", Representation::Live)
            .unwrap(),
        b"helm geometry v2"
    );
}

#[test]
fn test_unresolved_pairs_stay_in_the_map() {
    let old = archive_of(&[("present.txt", "here")]);
    let mut renames = RenameMap::new();
    renames.insert("copy.txt", "present.txt");
    renames.insert("lost.txt", "absent.txt");

    let store = store_for(&[&old], &old, &RenameMap::new());
    let reconciler = Reconciler::new(&store, ReconcileOptions::new());

    let mut archive = old.clone();
    let mut report = ReconcileReport::new(true);
    reconciler
        .rename_phase(&mut archive, &mut renames, &mut report)
        .unwrap();

    assert_eq!(renames.iter().collect::<Vec<_>>(), vec![("lost.txt", "absent.txt")]);
    assert!(archive.contains("copy.txt"));
    assert!(archive.contains("present.txt"));
    assert_eq!(report.renamed, 1);

    let missing: Vec<_> = report.issues_of(IssueKind::MissingSource).collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].name, "lost.txt");
}

#[test]
fn test_malformed_rename_lines() {
    for text in ["only-one-name\n", "\told.txt\n", "new.txt\t \n"] {
        assert!(
            matches!(
                RenameMap::from_reader(Cursor::new(text)),
                Err(Error::InvalidFormat(_))
            ),
            "{text:?}"
        );
    }
}
