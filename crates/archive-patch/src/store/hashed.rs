//! Hashed patch store
//!
//! A persisted [`RobinHoodTable`] for stores too large to decode up front.
//! Opening the file runs a single index pass over the buckets that reads
//! only hashes, keys and value spans. Record payloads are decoded the first
//! time their key is looked up and cached for the lifetime of the store.
//!
//! ```text
//! [magic "PSRH"][version: u32][capacity: u32][len: u32][max probe: u32]
//! capacity x bucket:
//!     [hash: u32][key length: u32][value length: u32][key][value]
//! ```
//!
//! An empty bucket is twelve zero bytes.
//!
//! With the `mmap` feature (on by default) the file is memory-mapped;
//! otherwise it is read into an owned buffer.

use super::record::PatchRecord;
use super::robin_hood::{Bucket, RobinHoodTable};
use super::{FORMAT_VERSION, PatchStore};
use crate::path::normalize_entry_name;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};

#[cfg(feature = "mmap")]
use memmap2::Mmap;

/// Size of the file header
pub const HASHED_HEADER_SIZE: usize = 20;

/// Size of the fixed part of each bucket
pub const BUCKET_HEADER_SIZE: usize = 12;

/// Location of a record payload inside the backing bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueSpan {
    offset: usize,
    len: usize,
}

#[derive(Debug)]
enum Backing {
    #[cfg(feature = "mmap")]
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn as_bytes(&self) -> &[u8] {
        match self {
            #[cfg(feature = "mmap")]
            Backing::Mapped(mmap) => &mmap[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }
}

/// Random-access patch store backed by a Robin Hood table file
#[derive(Debug)]
pub struct HashedStore {
    backing: Backing,
    table: RobinHoodTable<ValueSpan>,
    cache: Vec<OnceLock<Arc<PatchRecord>>>,
}

impl HashedStore {
    /// File magic
    pub const MAGIC: [u8; 4] = *b"PSRH";

    /// Open a store file, indexing its buckets without decoding records
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        #[cfg(feature = "mmap")]
        let backing = {
            // SAFETY: the map is read-only and the store never hands out
            // references that outlive it. Concurrent truncation of the file
            // by another process is outside what we can guard against.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            #[cfg(unix)]
            if let Err(e) = mmap.advise(memmap2::Advice::Random) {
                log::debug!("madvise(RANDOM) failed for {}: {e}", path.display());
            }
            Backing::Mapped(mmap)
        };

        #[cfg(not(feature = "mmap"))]
        let backing = {
            use std::io::Read;
            let mut bytes = Vec::new();
            std::io::BufReader::new(file).read_to_end(&mut bytes)?;
            Backing::Owned(bytes)
        };

        let store = Self::index(backing)?;
        log::info!(
            "Opened hashed patch store {}: {} records in {} buckets, max probe {}",
            path.display(),
            store.table.len(),
            store.table.capacity(),
            store.table.max_probe()
        );
        Ok(store)
    }

    /// Index an in-memory copy of a store file
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::index(Backing::Owned(bytes))
    }

    fn index(backing: Backing) -> Result<Self> {
        let data = backing.as_bytes();
        if data.len() < HASHED_HEADER_SIZE {
            return Err(Error::corrupt_store(format!(
                "Hashed store header truncated: {} bytes",
                data.len()
            )));
        }
        if data[..4] != Self::MAGIC {
            return Err(Error::corrupt_store(format!(
                "Bad hashed store magic: {}",
                hex::encode(&data[..4])
            )));
        }

        let version = LittleEndian::read_u32(&data[4..8]);
        let capacity = LittleEndian::read_u32(&data[8..12]) as usize;
        let declared_len = LittleEndian::read_u32(&data[12..16]) as usize;
        let declared_probe = LittleEndian::read_u32(&data[16..20]) as usize;
        if version != FORMAT_VERSION {
            return Err(Error::corrupt_store(format!(
                "Unsupported hashed store version {version}"
            )));
        }
        if capacity > (data.len() - HASHED_HEADER_SIZE) / BUCKET_HEADER_SIZE {
            return Err(Error::corrupt_store(format!(
                "Capacity {capacity} does not fit in {} bytes",
                data.len()
            )));
        }
        log::debug!(
            "Hashed store header: version {version}, capacity {capacity}, len {declared_len}, max probe {declared_probe}"
        );

        let mut slots = Vec::with_capacity(capacity);
        let mut offset = HASHED_HEADER_SIZE;
        for index in 0..capacity {
            let fixed = data
                .get(offset..offset + BUCKET_HEADER_SIZE)
                .ok_or_else(|| Error::corrupt_store(format!("Bucket {index} truncated")))?;
            let hash = LittleEndian::read_u32(&fixed[0..4]);
            let key_len = LittleEndian::read_u32(&fixed[4..8]) as usize;
            let value_len = LittleEndian::read_u32(&fixed[8..12]) as usize;
            offset += BUCKET_HEADER_SIZE;

            if key_len == 0 {
                if hash != 0 || value_len != 0 {
                    return Err(Error::corrupt_store(format!(
                        "Bucket {index} has no key but hash {hash:08x}, value length {value_len}"
                    )));
                }
                slots.push(None);
                continue;
            }

            let key_end = offset + key_len;
            let value_end = key_end + value_len;
            if value_end > data.len() {
                return Err(Error::corrupt_store(format!(
                    "Bucket {index} runs past end of file"
                )));
            }
            let key = &data[offset..key_end];
            if std::str::from_utf8(key).is_err() {
                return Err(Error::corrupt_store(format!(
                    "Bucket {index} key is not UTF-8"
                )));
            }

            slots.push(Some(Bucket {
                hash,
                key: key.to_vec(),
                value: ValueSpan {
                    offset: key_end,
                    len: value_len,
                },
            }));
            offset = value_end;
        }

        if offset != data.len() {
            return Err(Error::corrupt_store(format!(
                "{} trailing bytes after last bucket",
                data.len() - offset
            )));
        }

        let table = RobinHoodTable::from_slots(slots).ok_or_else(|| {
            Error::corrupt_store("Bucket layout is not a valid Robin Hood table")
        })?;
        if table.len() != declared_len || table.max_probe() != declared_probe {
            return Err(Error::corrupt_store(format!(
                "Header declares {declared_len} records with max probe {declared_probe}, buckets hold {} with max probe {}",
                table.len(),
                table.max_probe()
            )));
        }

        let mut cache = Vec::with_capacity(capacity);
        cache.resize_with(capacity, OnceLock::new);

        Ok(Self {
            backing,
            table,
            cache,
        })
    }

    /// Serialize a table of encoded record payloads
    pub fn write_table<W: Write>(table: &RobinHoodTable<Vec<u8>>, writer: &mut W) -> Result<()> {
        let field = |value: usize, what: &str| {
            u32::try_from(value)
                .map_err(|_| Error::invalid_format(format!("{what} {value} exceeds u32")))
        };

        writer.write_all(&Self::MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(field(table.capacity(), "Capacity")?)?;
        writer.write_u32::<LittleEndian>(field(table.len(), "Record count")?)?;
        writer.write_u32::<LittleEndian>(field(table.max_probe(), "Max probe")?)?;

        for slot in table.slots() {
            match slot {
                Some(bucket) => {
                    writer.write_u32::<LittleEndian>(bucket.hash)?;
                    writer.write_u32::<LittleEndian>(field(bucket.key.len(), "Key length")?)?;
                    writer.write_u32::<LittleEndian>(field(bucket.value.len(), "Record length")?)?;
                    writer.write_all(&bucket.key)?;
                    writer.write_all(&bucket.value)?;
                }
                None => writer.write_all(&[0u8; BUCKET_HEADER_SIZE])?,
            }
        }
        Ok(())
    }

    /// Number of buckets
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Largest probe distance in the table
    pub fn max_probe(&self) -> usize {
        self.table.max_probe()
    }

    /// Number of records decoded so far
    pub fn materialized(&self) -> usize {
        self.cache.iter().filter(|cell| cell.get().is_some()).count()
    }

    /// Whether the store is backed by a memory map
    pub fn is_mapped(&self) -> bool {
        match self.backing {
            #[cfg(feature = "mmap")]
            Backing::Mapped(_) => true,
            Backing::Owned(_) => false,
        }
    }
}

impl PatchStore for HashedStore {
    fn lookup(&self, name: &str) -> Result<Option<Arc<PatchRecord>>> {
        let key = normalize_entry_name(name);
        let Some(slot) = self.table.position(key.as_bytes()) else {
            return Ok(None);
        };

        let cell = &self.cache[slot];
        if let Some(record) = cell.get() {
            return Ok(Some(Arc::clone(record)));
        }

        let span = match &self.table.slots()[slot] {
            Some(bucket) => bucket.value,
            None => return Ok(None),
        };
        let payload = &self.backing.as_bytes()[span.offset..span.offset + span.len];
        let record = Arc::new(PatchRecord::from_bytes(payload)?);
        log::debug!("Decoded record {key}: {} bytes", span.len);

        Ok(Some(Arc::clone(cell.get_or_init(|| record))))
    }

    fn contains(&self, name: &str) -> bool {
        self.table
            .position(normalize_entry_name(name).as_bytes())
            .is_some()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .slots()
            .iter()
            .flatten()
            .map(|bucket| String::from_utf8_lossy(&bucket.key).into_owned())
            .collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}
