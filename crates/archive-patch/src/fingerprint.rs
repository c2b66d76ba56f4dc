//! Content fingerprints
//!
//! A [`Fingerprint`] is a size plus an ordered sequence of rolling checksums,
//! one per 4096-byte window of the content. It identifies *which* byte-exact
//! variant of a file is installed without keeping the bytes around.
//!
//! The checksum algorithm is a pure function of the declared size so that two
//! independently computed fingerprints of the same content always agree:
//!
//! - Below [`WINDOW_SIZE`] bytes a single CRC-32 is emitted
//! - At or above it, an Adler-32 runs over the whole stream and its running
//!   value is emitted after every window (the last window may be short)

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Window length in bytes, also the algorithm selection threshold
pub const WINDOW_SIZE: usize = 4096;

/// Upper bound on checksums accepted when decoding a serialized fingerprint
const MAX_DECODED_CHECKSUMS: u32 = (u32::MAX as u64 / WINDOW_SIZE as u64 + 1) as u32;

/// Which form of an archive entry a fingerprint or delta refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Representation {
    /// Decoded content as an application reads it
    #[default]
    Live,
    /// Encoded bytes as the archive stores them (e.g. compressed)
    Stored,
}

impl Representation {
    /// Serialized tag of this representation
    pub fn to_tag(self) -> u8 {
        match self {
            Representation::Live => 0,
            Representation::Stored => 1,
        }
    }

    /// Parse a serialized representation tag
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Representation::Live),
            1 => Ok(Representation::Stored),
            _ => Err(Error::corrupt_store(format!(
                "Unknown representation tag: {tag}"
            ))),
        }
    }
}

/// Checksum algorithm used for a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// CRC-32 over the whole (short) stream
    Crc32,
    /// Running Adler-32 sampled once per window
    Adler32,
}

impl ChecksumAlgorithm {
    /// Select the algorithm for a declared content size
    pub fn for_size(size: u32) -> Self {
        if (size as usize) < WINDOW_SIZE {
            ChecksumAlgorithm::Crc32
        } else {
            ChecksumAlgorithm::Adler32
        }
    }
}

/// Size-bounded summary of a byte stream's content
///
/// Two fingerprints are equal iff their sizes are equal and their checksum
/// sequences are equal element-wise. Empty fingerprints compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    size: u32,
    checksums: Vec<u32>,
}

impl Fingerprint {
    /// Build a fingerprint from already known parts
    pub fn from_parts(size: u32, checksums: Vec<u32>) -> Self {
        Self { size, checksums }
    }

    /// The empty fingerprint (`size == 0`, no checksums)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Content size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Checksum sequence, one value per window
    pub fn checksums(&self) -> &[u32] {
        &self.checksums
    }

    /// Whether this is the empty fingerprint
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Compute a fingerprint over exactly `declared_size` bytes of `source`
    ///
    /// The source must yield exactly `declared_size` bytes; a short or long
    /// source is reported as [`Error::SizeMismatch`].
    pub fn compute<R: Read>(mut source: R, declared_size: u32) -> Result<Self> {
        let algorithm = ChecksumAlgorithm::for_size(declared_size);
        let total = declared_size as usize;
        let mut window = vec![0u8; WINDOW_SIZE.min(total.max(1))];
        let mut checksums = Vec::with_capacity(total.div_ceil(WINDOW_SIZE));
        let mut consumed = 0usize;

        match algorithm {
            ChecksumAlgorithm::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                let got = fill(&mut source, &mut window[..total])?;
                consumed += got;
                hasher.update(&window[..got]);
                if got != total {
                    return Err(size_mismatch(declared_size, consumed));
                }
                if total > 0 {
                    checksums.push(hasher.finalize());
                }
            }
            ChecksumAlgorithm::Adler32 => {
                let mut adler = adler2::Adler32::new();
                while consumed < total {
                    let want = (total - consumed).min(WINDOW_SIZE);
                    let got = fill(&mut source, &mut window[..want])?;
                    consumed += got;
                    if got != want {
                        return Err(size_mismatch(declared_size, consumed));
                    }
                    adler.write_slice(&window[..want]);
                    checksums.push(adler.checksum());
                }
            }
        }

        // Anything left over means the declared size was too small.
        let mut probe = [0u8; 1];
        if fill(&mut source, &mut probe)? != 0 {
            return Err(Error::SizeMismatch {
                expected: declared_size as u64,
                actual: consumed as u64 + 1,
            });
        }

        Ok(Self {
            size: declared_size,
            checksums,
        })
    }

    /// Fingerprint an in-memory buffer
    pub fn of(data: &[u8]) -> Result<Self> {
        let size = u32::try_from(data.len()).map_err(|_| Error::SizeMismatch {
            expected: u32::MAX as u64,
            actual: data.len() as u64,
        })?;
        Self::compute(data, size)
    }

    /// Fingerprint a plain file on disk
    pub fn of_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        let size = u32::try_from(len).map_err(|_| Error::SizeMismatch {
            expected: u32::MAX as u64,
            actual: len,
        })?;
        Self::compute(io::BufReader::new(file), size)
    }

    /// Serialize as `[size][count][checksums...]`, little-endian
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.checksums.len() as u32)?;
        for &checksum in &self.checksums {
            writer.write_u32::<LittleEndian>(checksum)?;
        }
        Ok(())
    }

    /// Number of bytes [`Fingerprint::write_to`] produces
    pub fn encoded_len(&self) -> usize {
        8 + 4 * self.checksums.len()
    }

    /// Deserialize a fingerprint written by [`Fingerprint::write_to`]
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let size = reader.read_u32::<LittleEndian>()?;
        let count = reader.read_u32::<LittleEndian>()?;
        if count > MAX_DECODED_CHECKSUMS {
            return Err(Error::corrupt_store(format!(
                "Fingerprint declares {count} checksums"
            )));
        }
        let expected = (size as usize).div_ceil(WINDOW_SIZE);
        let expected = if ChecksumAlgorithm::for_size(size) == ChecksumAlgorithm::Crc32 {
            usize::from(size > 0)
        } else {
            expected
        };
        if count as usize != expected {
            return Err(Error::corrupt_store(format!(
                "Fingerprint of {size} bytes carries {count} checksums, expected {expected}"
            )));
        }

        let mut checksums = Vec::with_capacity(count as usize);
        for _ in 0..count {
            checksums.push(reader.read_u32::<LittleEndian>()?);
        }
        Ok(Self { size, checksums })
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.checksums.first() {
            Some(first) => write!(
                f,
                "{} bytes, {} checksums, first {first:08x}",
                self.size,
                self.checksums.len()
            ),
            None => write!(f, "{} bytes, empty", self.size),
        }
    }
}

fn size_mismatch(declared: u32, actual: usize) -> Error {
    Error::SizeMismatch {
        expected: declared as u64,
        actual: actual as u64,
    }
}

/// Read until `buf` is full or the source is exhausted
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
