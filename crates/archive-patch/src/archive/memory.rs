//! In-memory archive
//!
//! Entries are held in their stored form. Whether an entry is zlib-compressed
//! is decided from its extension by a [`CompressionPolicy`] when the entry is
//! first added, and sticks with the entry afterwards.

use super::Archive;
use crate::config::CompressionPolicy;
use crate::fingerprint::Representation;
use crate::path::{join_entry_name, normalize_entry_name, split_entry_name};
use crate::{Error, Result};
use bytes::Bytes;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone)]
struct Entry {
    stored: Bytes,
    compressed: bool,
}

/// Archive kept entirely in memory
///
/// Cloning is cheap: entry contents are reference counted.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Entry>,
    folders: BTreeSet<String>,
    policy: CompressionPolicy,
}

impl MemoryArchive {
    /// Create an empty archive using the default compression policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty archive with a custom compression policy
    pub fn with_policy(policy: CompressionPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            folders: BTreeSet::new(),
            policy,
        }
    }

    /// Compression policy in use
    pub fn policy(&self) -> &CompressionPolicy {
        &self.policy
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry from live content, builder style
    pub fn with_entry(mut self, name: &str, live: impl Into<Vec<u8>>) -> Result<Self> {
        self.add(name, live.into())?;
        Ok(self)
    }

    /// Whether `name` is kept compressed
    pub fn is_compressed(&self, name: &str) -> Option<bool> {
        self.entries
            .get(&normalize_entry_name(name))
            .map(|entry| entry.compressed)
    }

    /// Load every file under `root` as an entry
    pub fn from_dir<P: AsRef<Path>>(root: P, policy: CompressionPolicy) -> Result<Self> {
        let root = root.as_ref();
        let mut archive = Self::with_policy(policy);
        archive.load_dir(root, "")?;
        log::info!(
            "Loaded {} entries in {} folders from {}",
            archive.entries.len(),
            archive.folders.len(),
            root.display()
        );
        Ok(archive)
    }

    fn load_dir(&mut self, dir: &Path, folder: &str) -> Result<()> {
        let mut children: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        children.sort_by_key(|child| child.file_name());

        for child in children {
            let path = child.path();
            let file_name = child.file_name();
            let file_name = file_name
                .to_str()
                .ok_or_else(|| Error::InvalidName(path.display().to_string()))?;
            let name = join_entry_name(folder, file_name);

            if child.file_type()?.is_dir() {
                self.load_dir(&path, &name)?;
            } else {
                self.add(&name, fs::read(&path)?)?;
            }
        }
        Ok(())
    }

    fn encode(&self, name: &str, live: &[u8]) -> Result<Entry> {
        match self.policy.level_for(name) {
            Some(level) => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
                encoder
                    .write_all(live)
                    .map_err(|e| Error::compression(format!("zlib encode of {name}: {e}")))?;
                let stored = encoder
                    .finish()
                    .map_err(|e| Error::compression(format!("zlib encode of {name}: {e}")))?;
                Ok(Entry {
                    stored: Bytes::from(stored),
                    compressed: true,
                })
            }
            None => Ok(Entry {
                stored: Bytes::copy_from_slice(live),
                compressed: false,
            }),
        }
    }

    fn entry(&self, name: &str) -> Result<(String, &Entry)> {
        let key = normalize_entry_name(name);
        match self.entries.get(&key) {
            Some(entry) => Ok((key, entry)),
            None => Err(Error::EntryNotFound(key)),
        }
    }

    fn insert_entry(&mut self, key: String, entry: Entry) {
        let (folder, _) = split_entry_name(&key);
        self.folders.insert(folder.to_string());
        self.entries.insert(key, entry);
    }
}

fn validated_key(name: &str) -> Result<String> {
    let key = normalize_entry_name(name);
    let (_, file) = split_entry_name(&key);
    if file.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(key)
}

fn inflate(name: &str, stored: &[u8]) -> Result<Vec<u8>> {
    let mut live = Vec::new();
    ZlibDecoder::new(stored)
        .read_to_end(&mut live)
        .map_err(|e| Error::compression(format!("zlib decode of {name}: {e}")))?;
    Ok(live)
}

impl Archive for MemoryArchive {
    fn folders(&self) -> Vec<String> {
        self.folders.iter().cloned().collect()
    }

    fn entries(&self, folder: &str) -> Vec<String> {
        let folder = normalize_entry_name(folder);
        self.entries
            .keys()
            .filter(|name| split_entry_name(name).0 == folder)
            .cloned()
            .collect()
    }

    fn entry_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_entry_name(name))
    }

    fn read(&self, name: &str, representation: Representation) -> Result<Vec<u8>> {
        let (key, entry) = self.entry(name)?;
        match representation {
            Representation::Stored => Ok(entry.stored.to_vec()),
            Representation::Live if entry.compressed => inflate(&key, &entry.stored),
            Representation::Live => Ok(entry.stored.to_vec()),
        }
    }

    fn decode(&self, name: &str, stored: &[u8]) -> Result<Vec<u8>> {
        let key = normalize_entry_name(name);
        let compressed = match self.entries.get(&key) {
            Some(entry) => entry.compressed,
            None => self.policy.level_for(&key).is_some(),
        };
        if compressed {
            inflate(&key, stored)
        } else {
            Ok(stored.to_vec())
        }
    }

    fn add(&mut self, name: &str, live: Vec<u8>) -> Result<()> {
        let key = validated_key(name)?;
        let entry = self.encode(&key, &live)?;
        log::trace!(
            "Added {key}: {} live bytes, {} stored",
            live.len(),
            entry.stored.len()
        );
        self.insert_entry(key, entry);
        Ok(())
    }

    fn replace(
        &mut self,
        name: &str,
        representation: Representation,
        data: Vec<u8>,
    ) -> Result<()> {
        let (key, existing) = self.entry(name)?;
        let entry = match representation {
            Representation::Stored => Entry {
                stored: Bytes::from(data),
                compressed: existing.compressed,
            },
            Representation::Live => self.encode(&key, &data)?,
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    fn duplicate(&mut self, source: &str, destination: &str) -> Result<()> {
        let (_, entry) = self.entry(source)?;
        let entry = entry.clone();
        let key = validated_key(destination)?;
        self.insert_entry(key, entry);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let key = normalize_entry_name(name);
        self.entries
            .remove(&key)
            .map(|_| ())
            .ok_or(Error::EntryNotFound(key))
    }

    fn remove_folder(&mut self, folder: &str) -> Result<()> {
        let folder = normalize_entry_name(folder);
        if !self.folders.remove(&folder) {
            return Err(Error::EntryNotFound(folder));
        }
        self.entries
            .retain(|name, _| split_entry_name(name).0 != folder);
        Ok(())
    }

    fn persist(&self, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination)?;
        for folder in self.folders.iter().filter(|f| !f.is_empty()) {
            fs::create_dir_all(destination.join(folder))?;
        }
        for name in self.entries.keys() {
            let live = self.read(name, Representation::Live)?;
            fs::write(destination.join(name), live)?;
        }
        log::info!(
            "Persisted {} entries to {}",
            self.entries.len(),
            destination.display()
        );
        Ok(())
    }
}
