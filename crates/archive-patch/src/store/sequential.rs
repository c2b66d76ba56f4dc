//! Sequential patch store
//!
//! The whole file is decoded into memory on open. Suited to small and medium
//! archives.
//!
//! ```text
//! [magic "PSEQ"][version: u32][record count: u32]
//! per record:
//!     [name length: u32][name UTF-8][record length: u32][record payload]
//! ```

use super::record::{PatchRecord, read_vec};
use super::{FORMAT_VERSION, PatchStore};
use crate::path::normalize_entry_name;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Longest entry name accepted when decoding
const MAX_NAME_LEN: u32 = 4096;

/// Fully loaded patch store
#[derive(Debug, Clone, Default)]
pub struct SequentialStore {
    records: HashMap<String, Arc<PatchRecord>>,
}

impl SequentialStore {
    /// File magic
    pub const MAGIC: [u8; 4] = *b"PSEQ";

    /// Build a store from `(name, record)` pairs; names are normalized and
    /// later pairs replace earlier ones
    pub fn from_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, PatchRecord)>,
        S: AsRef<str>,
    {
        Self {
            records: records
                .into_iter()
                .map(|(name, record)| (normalize_entry_name(name.as_ref()), Arc::new(record)))
                .collect(),
        }
    }

    /// Open and fully decode a store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::read_from(&mut BufReader::new(File::open(path)?))?;
        log::info!(
            "Loaded sequential patch store {} with {} records",
            path.display(),
            store.records.len()
        );
        Ok(store)
    }

    /// Decode a store from a reader positioned at the magic
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Self::read_inner(reader).map_err(|err| match err {
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::corrupt_store("Sequential store truncated")
            }
            other => other,
        })
    }

    fn read_inner<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(Error::corrupt_store(format!(
                "Bad sequential store magic: {}",
                hex::encode(magic)
            )));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(Error::corrupt_store(format!(
                "Unsupported sequential store version {version}"
            )));
        }

        let count = reader.read_u32::<LittleEndian>()?;
        log::debug!("Sequential store header: version {version}, {count} records");

        let mut records = HashMap::new();
        for index in 0..count {
            let name_len = reader.read_u32::<LittleEndian>()?;
            if name_len == 0 || name_len > MAX_NAME_LEN {
                return Err(Error::corrupt_store(format!(
                    "Record {index} has name length {name_len}"
                )));
            }
            let name = String::from_utf8(read_vec(reader, name_len as usize)?).map_err(|_| {
                Error::corrupt_store(format!("Record {index} name is not UTF-8"))
            })?;

            let record_len = reader.read_u32::<LittleEndian>()? as usize;
            let mut payload = Vec::new();
            reader
                .by_ref()
                .take(record_len as u64)
                .read_to_end(&mut payload)?;
            if payload.len() != record_len {
                return Err(Error::corrupt_store(format!(
                    "Record {name} truncated: {} of {record_len} bytes",
                    payload.len()
                )));
            }
            let record = PatchRecord::from_bytes(&payload)?;

            let key = normalize_entry_name(&name);
            if records.insert(key.clone(), Arc::new(record)).is_some() {
                return Err(Error::corrupt_store(format!("Duplicate record {key}")));
            }
        }

        Ok(Self { records })
    }

    /// Serialize with records in name order
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut names: Vec<&String> = self.records.keys().collect();
        names.sort();

        writer.write_all(&Self::MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(names.len() as u32)?;

        for name in names {
            let payload = self.records[name].to_bytes()?;
            writer.write_u32::<LittleEndian>(name.len() as u32)?;
            writer.write_all(name.as_bytes())?;
            writer.write_u32::<LittleEndian>(payload.len() as u32)?;
            writer.write_all(&payload)?;
        }
        Ok(())
    }

    /// Write the store to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl PatchStore for SequentialStore {
    fn lookup(&self, name: &str) -> Result<Option<Arc<PatchRecord>>> {
        Ok(self.records.get(&normalize_entry_name(name)).cloned())
    }

    fn contains(&self, name: &str) -> bool {
        self.records.contains_key(&normalize_entry_name(name))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
