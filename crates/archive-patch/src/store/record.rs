//! Patch records and their binary payload
//!
//! Payload layout, little-endian:
//!
//! ```text
//! [target fingerprint]
//! [candidate count: u32]
//! per candidate:
//!     [representation: u8]   0 = live, 1 = stored
//!     [preimage fingerprint]
//!     [delta length: u32]    0 = no delta
//!     [delta bytes]
//! ```

use crate::delta::Delta;
use crate::fingerprint::{Fingerprint, Representation};
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// One known pre-image of an entry and how to get from it to the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Which representation of the entry `preimage` was computed over
    pub representation: Representation,
    /// Fingerprint of the pre-image
    pub preimage: Fingerprint,
    /// Delta from the pre-image to the target, `None` when they are equal
    pub delta: Option<Delta>,
}

impl Candidate {
    /// Candidate whose pre-image already equals the target
    pub fn unchanged(representation: Representation, preimage: Fingerprint) -> Self {
        Self {
            representation,
            preimage,
            delta: None,
        }
    }

    /// Candidate carrying a delta
    pub fn with_delta(representation: Representation, preimage: Fingerprint, delta: Delta) -> Self {
        Self {
            representation,
            preimage,
            delta: Some(delta),
        }
    }
}

/// All patch information for one logical entry name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    /// Fingerprint of the live target content
    pub target: Fingerprint,
    /// Candidates in the order they are tried
    pub candidates: Vec<Candidate>,
}

impl PatchRecord {
    /// Create a record with no candidates
    pub fn new(target: Fingerprint) -> Self {
        Self {
            target,
            candidates: Vec::new(),
        }
    }

    /// Append a candidate
    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    /// Serialize the payload
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.target.write_to(writer)?;
        writer.write_u32::<LittleEndian>(self.candidates.len() as u32)?;

        for candidate in &self.candidates {
            writer.write_u8(candidate.representation.to_tag())?;
            candidate.preimage.write_to(writer)?;
            match &candidate.delta {
                Some(delta) => {
                    let len = u32::try_from(delta.encoded_len()).map_err(|_| {
                        Error::invalid_format(format!(
                            "Delta of {} bytes does not fit a record",
                            delta.encoded_len()
                        ))
                    })?;
                    writer.write_u32::<LittleEndian>(len)?;
                    delta.write_to(writer)?;
                }
                None => writer.write_u32::<LittleEndian>(0)?,
            }
        }

        Ok(())
    }

    /// Serialize into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Decode a payload, which must be consumed exactly
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let record = Self::read_from(&mut cursor).map_err(truncation_is_corruption)?;

        if cursor.position() as usize != data.len() {
            return Err(Error::corrupt_store(format!(
                "Record has {} trailing bytes",
                data.len() - cursor.position() as usize
            )));
        }
        Ok(record)
    }

    fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let target = Fingerprint::read_from(cursor)?;
        let count = cursor.read_u32::<LittleEndian>()?;

        // Each candidate needs at least 13 bytes, so a huge count is garbage
        let remaining = cursor.get_ref().len() - cursor.position() as usize;
        if count as usize > remaining / 13 {
            return Err(Error::corrupt_store(format!(
                "Record declares {count} candidates in {remaining} bytes"
            )));
        }

        let mut candidates = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let representation = Representation::from_tag(cursor.read_u8()?)?;
            let preimage = Fingerprint::read_from(cursor)?;
            let delta_len = cursor.read_u32::<LittleEndian>()? as usize;

            let delta = if delta_len == 0 {
                None
            } else {
                let start = cursor.position() as usize;
                let bytes = cursor
                    .get_ref()
                    .get(start..start + delta_len)
                    .ok_or_else(|| {
                        Error::corrupt_store(format!(
                            "Delta of {delta_len} bytes runs past end of record"
                        ))
                    })?;
                let delta = Delta::parse(bytes)?;
                cursor.set_position((start + delta_len) as u64);
                Some(delta)
            };

            candidates.push(Candidate {
                representation,
                preimage,
                delta,
            });
        }

        Ok(Self { target, candidates })
    }
}

/// Short reads inside a record mean the store is damaged, not that I/O failed
fn truncation_is_corruption(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::corrupt_store("Record truncated")
        }
        other => other,
    }
}

/// Read exactly `len` bytes
pub(crate) fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
