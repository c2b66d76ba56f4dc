//! Candidates fingerprinted over the stored (compressed) form of entries

use crate::common::{generate_test_data, mutate, temp_dir};
use archive_patch::delta::{self, DeltaSignature};
use archive_patch::reconcile::{EntryStatus, Reconciler};
use archive_patch::store::{Candidate, PatchRecord, PatchStoreBuilder, SequentialStore};
use archive_patch::{
    Archive, CompressionPolicy, Fingerprint, MemoryArchive, ReconcileOptions, RenameMap,
    Representation,
};
use pretty_assertions::assert_eq;

#[test]
fn test_stored_candidates_patch_compressed_entries() {
    let old_mesh = generate_test_data(12_000);
    let new_mesh = mutate(&old_mesh, 4);
    let old = MemoryArchive::new()
        .with_entry("meshes/rock.nif", old_mesh)
        .unwrap()
        .with_entry("music/theme.ogg", b"theme v1".to_vec())
        .unwrap();
    let target = MemoryArchive::new()
        .with_entry("meshes/rock.nif", new_mesh.clone())
        .unwrap()
        .with_entry("music/theme.ogg", b"theme v2".to_vec())
        .unwrap();
    assert_eq!(old.is_compressed("meshes/rock.nif"), Some(true));
    assert_eq!(old.is_compressed("music/theme.ogg"), Some(false));

    let mut builder = PatchStoreBuilder::new().representation(Representation::Stored);
    let sources: [&dyn Archive; 1] = [&old];
    builder
        .add_from_archives(&sources, &target, &RenameMap::new())
        .unwrap();
    let record = builder.get("meshes/rock.nif").unwrap();
    assert_eq!(record.candidates[0].representation, Representation::Stored);
    assert_eq!(record.target, Fingerprint::of(&new_mesh).unwrap());
    let store = builder.build_sequential();

    let mut archive = old.clone();
    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true))
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert!(report.is_clean(), "{report}");
    assert_eq!(report.count(EntryStatus::Patched), 2);
    assert_eq!(archive.is_compressed("meshes/rock.nif"), Some(true));
    assert_eq!(
        archive.read("meshes/rock.nif", Representation::Live).unwrap(),
        new_mesh
    );
    assert_eq!(
        archive.read("music/theme.ogg", Representation::Live).unwrap(),
        b"theme v2"
    );
}

#[test]
fn test_candidates_are_tried_in_order_across_representations() {
    let old_live = generate_test_data(20_000);
    let new_live = mutate(&old_live, 8);

    let reference = MemoryArchive::new()
        .with_entry("data/blob.bin", old_live.clone())
        .unwrap();
    let target = MemoryArchive::new()
        .with_entry("data/blob.bin", new_live.clone())
        .unwrap();
    let old_stored = reference
        .read("data/blob.bin", Representation::Stored)
        .unwrap();
    let new_stored = target.read("data/blob.bin", Representation::Stored).unwrap();

    let mut record = PatchRecord::new(Fingerprint::of(&new_live).unwrap());
    record.push(Candidate::with_delta(
        Representation::Stored,
        Fingerprint::of(&old_stored).unwrap(),
        delta::create(&old_stored, &new_stored, DeltaSignature::Bzip2).unwrap(),
    ));
    record.push(Candidate::with_delta(
        Representation::Live,
        Fingerprint::of(&old_live).unwrap(),
        delta::create(&old_live, &new_live, DeltaSignature::Lzma).unwrap(),
    ));
    let store = SequentialStore::from_records([("data/blob.bin", record)]);

    // Same live content compressed differently; only the live candidate
    // is guaranteed to match
    let mut archive = MemoryArchive::with_policy(CompressionPolicy::default().default_level(Some(1)))
        .with_entry("data/blob.bin", old_live)
        .unwrap();
    let report = Reconciler::new(&store, ReconcileOptions::new().simulate(true))
        .run(&mut archive, &mut RenameMap::new(), temp_dir().path())
        .unwrap();

    assert_eq!(report.status("data/blob.bin"), Some(EntryStatus::Patched));
    assert_eq!(
        archive.read("data/blob.bin", Representation::Live).unwrap(),
        new_live
    );
}
