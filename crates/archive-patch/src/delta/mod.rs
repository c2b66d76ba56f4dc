//! Binary delta codec
//!
//! This module implements a bsdiff-compatible delta codec operating purely on
//! byte buffers. It is independent of any archive format.
//!
//! ```rust
//! use archive_patch::delta::{self, DeltaSignature};
//!
//! let old = b"The quick brown fox jumps over the lazy dog".to_vec();
//! let new = b"The quick brown cat jumps over the lazy dog!".to_vec();
//!
//! let patch = delta::create(&old, &new, DeltaSignature::Bzip2)?;
//! assert_eq!(delta::apply(&old, &patch)?, new);
//!
//! // Deltas serialize to the classic 32-byte header plus three streams
//! let bytes = patch.to_bytes();
//! assert_eq!(&bytes[..8], b"BSDIFF40");
//! # Ok::<(), archive_patch::Error>(())
//! ```
//!
//! # File Layout
//!
//! 1. **Header** (32 bytes) - signature, control length, diff length, output size
//! 2. **Control stream** - encoded `(add, extra, seek)` triples
//! 3. **Diff stream** - encoded add bytes
//! 4. **Extra stream** - encoded literal bytes, running to the end of the file
//!
//! # Signatures
//!
//! - **BSDIFF40** - streams compressed with bzip2
//! - **BSDIFFLZ** - streams compressed with LZMA
//! - **BSDIFFRW** - streams stored as-is

mod apply;
mod codec;
mod diff;
mod header;
mod suffix;

pub use apply::apply;
pub use header::{
    CONTROL_TRIPLE_SIZE, DeltaHeader, DeltaSignature, HEADER_SIZE, offtin, offtout,
};
pub use suffix::suffix_array;

use crate::config::DeltaConfig;
use crate::{Error, Result};
use std::io::Write;

/// An encoded delta: header fields plus the three encoded streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// Codec used for the three streams
    pub signature: DeltaSignature,
    /// Encoded control triples
    pub control_block: Vec<u8>,
    /// Encoded add bytes
    pub diff_block: Vec<u8>,
    /// Encoded literal bytes
    pub extra_block: Vec<u8>,
    /// Length of the reconstructed buffer
    pub output_size: u64,
}

impl Delta {
    /// Parse a serialized delta
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = DeltaHeader::parse(data)?;
        let body = &data[HEADER_SIZE..];

        let control_len = usize::try_from(header.control_len)
            .map_err(|_| Error::corrupt_delta("Control length exceeds address space"))?;
        let diff_len = usize::try_from(header.diff_len)
            .map_err(|_| Error::corrupt_delta("Diff length exceeds address space"))?;

        let diff_start = control_len;
        let extra_start = diff_start
            .checked_add(diff_len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| {
                Error::corrupt_delta(format!(
                    "Streams truncated: header needs {} + {} bytes, have {}",
                    header.control_len,
                    header.diff_len,
                    body.len()
                ))
            })?;

        Ok(Self {
            signature: header.signature,
            control_block: body[..diff_start].to_vec(),
            diff_block: body[diff_start..extra_start].to_vec(),
            extra_block: body[extra_start..].to_vec(),
            output_size: header.output_size,
        })
    }

    /// Header describing this delta
    pub fn header(&self) -> DeltaHeader {
        DeltaHeader {
            signature: self.signature,
            control_len: self.control_block.len() as u64,
            diff_len: self.diff_block.len() as u64,
            output_size: self.output_size,
        }
    }

    /// Serialized length in bytes
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.control_block.len() + self.diff_block.len() + self.extra_block.len()
    }

    /// Write the serialized delta
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.header().to_bytes())?;
        writer.write_all(&self.control_block)?;
        writer.write_all(&self.diff_block)?;
        writer.write_all(&self.extra_block)?;
        Ok(())
    }

    /// Serialize into a new buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.header().to_bytes());
        out.extend_from_slice(&self.control_block);
        out.extend_from_slice(&self.diff_block);
        out.extend_from_slice(&self.extra_block);
        out
    }
}

/// Create a delta transforming `old` into `new` with default codec settings
/// for `signature`
pub fn create(old: &[u8], new: &[u8], signature: DeltaSignature) -> Result<Delta> {
    create_with(old, new, &DeltaConfig::default().signature(signature))
}

/// Create a delta transforming `old` into `new`
pub fn create_with(old: &[u8], new: &[u8], config: &DeltaConfig) -> Result<Delta> {
    let streams = diff::diff_streams(old, new);

    let delta = Delta {
        signature: config.signature,
        control_block: codec::encode(config.signature, &streams.control, config.bzip2_level)?,
        diff_block: codec::encode(config.signature, &streams.diff, config.bzip2_level)?,
        extra_block: codec::encode(config.signature, &streams.extra, config.bzip2_level)?,
        output_size: new.len() as u64,
    };

    log::debug!(
        "Created {:?} delta: {} -> {} bytes, encoded {} bytes",
        config.signature,
        old.len(),
        new.len(),
        delta.encoded_len()
    );

    Ok(delta)
}
