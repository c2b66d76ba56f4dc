//! A second run over a reconciled archive changes nothing

use crate::common::{mutate, random_data, store_for, temp_dir};
use archive_patch::reconcile::{EntryStatus, Reconciler};
use archive_patch::{Archive, MemoryArchive, ReconcileOptions, RenameMap, Representation};
use pretty_assertions::assert_eq;

#[test]
fn test_second_run_is_all_up_to_date() {
    let mut old = MemoryArchive::new();
    let mut target = MemoryArchive::new();
    for i in 0..12u64 {
        let name = format!("textures/tile_{i}.dds");
        let content = random_data(100 + i, 4000);
        target.add(&name, mutate(&content, i)).unwrap();
        old.add(&name, content).unwrap();
    }
    old.add("stale/unused.txt", b"gone next version".to_vec())
        .unwrap();
    let store = store_for(&[&old], &target, &RenameMap::new());

    let mut archive = old.clone();
    let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
    let first = reconciler
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();
    assert_eq!(first.count(EntryStatus::Patched), 12);
    assert_eq!(first.count(EntryStatus::MissingFromStore), 1);

    let after_first: Vec<_> = archive
        .entry_names()
        .into_iter()
        .map(|name| {
            let live = archive.read(&name, Representation::Live).unwrap();
            (name, live)
        })
        .collect();

    let second = reconciler
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();
    assert_eq!(second.count(EntryStatus::UpToDate), 12);
    assert_eq!(second.entries.len(), 12);
    assert!(second.is_clean(), "{second}");
    assert_eq!(second.pruned_folders, 0);

    for (name, live) in after_first {
        assert_eq!(archive.read(&name, Representation::Live).unwrap(), live);
    }
}
