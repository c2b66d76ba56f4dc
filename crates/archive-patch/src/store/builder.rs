//! Patch store construction

use super::hashed::HashedStore;
use super::record::{Candidate, PatchRecord};
use super::robin_hood::RobinHoodTable;
use super::sequential::SequentialStore;
use crate::archive::Archive;
use crate::config::{DeltaConfig, PatchConfig};
use crate::delta;
use crate::fingerprint::{Fingerprint, Representation};
use crate::path::normalize_entry_name;
use crate::rename::RenameMap;
use crate::{Error, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Collects patch records and writes them in either store format
///
/// ```rust
/// use archive_patch::archive::{Archive, MemoryArchive};
/// use archive_patch::rename::RenameMap;
/// use archive_patch::store::{PatchStore, PatchStoreBuilder};
///
/// let old = MemoryArchive::new().with_entry("a.txt", "abc")?;
/// let new = MemoryArchive::new().with_entry("a.txt", "abcd")?;
///
/// let mut builder = PatchStoreBuilder::new();
/// let sources: [&dyn Archive; 1] = [&old];
/// builder.add_from_archives(&sources, &new, &RenameMap::new())?;
///
/// let store = builder.build_sequential();
/// let record = store.lookup("a.txt")?.expect("record");
/// assert_eq!(record.candidates.len(), 1);
/// # Ok::<(), archive_patch::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatchStoreBuilder {
    records: BTreeMap<String, PatchRecord>,
    delta_config: DeltaConfig,
    representation: Representation,
    threads: Option<usize>,
}

impl PatchStoreBuilder {
    /// Create an empty builder with default delta settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty builder using the delta options and worker count of `config`
    pub fn with_config(config: &PatchConfig) -> Self {
        Self {
            delta_config: config.delta.clone(),
            threads: config.reconcile.threads,
            ..Self::default()
        }
    }

    /// Set the codec options for derived deltas
    pub fn delta_config(mut self, config: DeltaConfig) -> Self {
        self.delta_config = config;
        self
    }

    /// Set which representation derived candidates are computed over
    pub fn representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Set the number of threads used to derive records
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Number of collected records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records have been collected
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record collected for `name`
    pub fn get(&self, name: &str) -> Option<&PatchRecord> {
        self.records.get(&normalize_entry_name(name))
    }

    /// Add a record
    ///
    /// Fails with [`Error::InvalidName`] for an empty name and with
    /// [`Error::DuplicateKey`] if the normalized name is already present.
    pub fn insert(&mut self, name: &str, record: PatchRecord) -> Result<()> {
        let key = normalize_entry_name(name);
        if key.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }
        if self.records.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.records.insert(key, record);
        Ok(())
    }

    /// Derive one record per entry of `target` from the known source variants
    ///
    /// Each distinct pre-image found in `sources` becomes a candidate, under
    /// the entry's old name when `renames` lists one. Returns the number of
    /// records added.
    pub fn add_from_archives(
        &mut self,
        sources: &[&dyn Archive],
        target: &dyn Archive,
        renames: &RenameMap,
    ) -> Result<usize> {
        let names = target.entry_names();
        log::info!(
            "Deriving patch records for {} entries from {} source archives",
            names.len(),
            sources.len()
        );

        let pool = crate::thread_pool(self.threads)?;
        let config = &self.delta_config;
        let representation = self.representation;

        let derived: Result<Vec<(String, PatchRecord)>> = pool.install(|| {
            names
                .par_iter()
                .map(|name| {
                    let record =
                        derive_record(sources, target, renames, name, config, representation)?;
                    Ok((name.clone(), record))
                })
                .collect()
        });

        let derived = derived?;
        let added = derived.len();
        for (name, record) in derived {
            self.insert(&name, record)?;
        }
        Ok(added)
    }

    /// Build an in-memory sequential store from the collected records
    pub fn build_sequential(&self) -> SequentialStore {
        SequentialStore::from_records(self.records.iter().map(|(k, v)| (k, v.clone())))
    }

    /// Write the records in the sequential format
    pub fn write_sequential<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.build_sequential().save(path.as_ref())?;
        log::info!(
            "Wrote sequential patch store {} ({} records)",
            path.as_ref().display(),
            self.records.len()
        );
        Ok(())
    }

    /// Lay the records out in a Robin Hood table filled to at most
    /// `load_factor`
    pub fn build_table(&self, load_factor: f64) -> Result<RobinHoodTable<Vec<u8>>> {
        if !(load_factor > 0.0 && load_factor <= 1.0) {
            return Err(Error::invalid_format(format!(
                "Load factor must be in (0, 1], got {load_factor}"
            )));
        }
        let capacity = ((self.records.len() as f64 / load_factor).ceil() as usize)
            .max(self.records.len());

        let mut table = RobinHoodTable::with_capacity(capacity);
        for (name, record) in &self.records {
            if !table.put(name.as_bytes().to_vec(), record.to_bytes()?) {
                return Err(Error::StoreFull { capacity });
            }
        }
        log::debug!(
            "Built table: {} records in {} buckets, max probe {}",
            table.len(),
            table.capacity(),
            table.max_probe()
        );
        Ok(table)
    }

    /// Write the records in the hashed format
    pub fn write_hashed<P: AsRef<Path>>(&self, path: P, load_factor: f64) -> Result<()> {
        let table = self.build_table(load_factor)?;
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        HashedStore::write_table(&table, &mut writer)?;
        writer.flush()?;
        log::info!(
            "Wrote hashed patch store {} ({} records, {} buckets)",
            path.as_ref().display(),
            table.len(),
            table.capacity()
        );
        Ok(())
    }
}

fn derive_record(
    sources: &[&dyn Archive],
    target: &dyn Archive,
    renames: &RenameMap,
    name: &str,
    config: &DeltaConfig,
    representation: Representation,
) -> Result<PatchRecord> {
    let target_fingerprint = Fingerprint::of(&target.read(name, Representation::Live)?)?;
    let target_bytes = target.read(name, representation)?;
    let source_name = renames.source_for(name).unwrap_or(name);

    let mut record = PatchRecord::new(target_fingerprint);
    let mut seen = HashSet::new();
    for source in sources {
        if !source.contains(source_name) {
            continue;
        }
        let bytes = source.read(source_name, representation)?;
        let preimage = Fingerprint::of(&bytes)?;
        if !seen.insert(preimage.clone()) {
            continue;
        }

        let candidate = if bytes == target_bytes {
            Candidate::unchanged(representation, preimage)
        } else {
            Candidate::with_delta(
                representation,
                preimage,
                delta::create_with(&bytes, &target_bytes, config)?,
            )
        };
        record.push(candidate);
    }

    log::debug!(
        "Record {name}: {} candidates from source {source_name}",
        record.candidates.len()
    );
    Ok(record)
}
