//! Delta file header parsing
//!
//! The 32-byte header is laid out as:
//!
//! | Offset | Size | Field                  |
//! |--------|------|------------------------|
//! | 0      | 8    | Signature              |
//! | 8      | 8    | Control stream length  |
//! | 16     | 8    | Diff stream length     |
//! | 24     | 8    | Output size            |
//!
//! Length fields use the bsdiff sign-magnitude encoding: the magnitude lives
//! in the low 63 bits of a little-endian u64 and bit 63 carries the sign.

use crate::{Error, Result};

/// Size of the fixed delta header
pub const HEADER_SIZE: usize = 32;

/// Size of one encoded control triple
pub const CONTROL_TRIPLE_SIZE: usize = 24;

const SIGN_BIT: u64 = 1 << 63;

/// Signature of the block codec used for the three delta streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeltaSignature {
    /// `BSDIFF40`: streams compressed with bzip2
    #[default]
    Bzip2,
    /// `BSDIFFLZ`: streams compressed with LZMA
    Lzma,
    /// `BSDIFFRW`: streams stored uncompressed
    Uncompressed,
}

impl DeltaSignature {
    /// Signature bytes written to the header
    pub fn to_bytes(self) -> [u8; 8] {
        match self {
            DeltaSignature::Bzip2 => *b"BSDIFF40",
            DeltaSignature::Lzma => *b"BSDIFFLZ",
            DeltaSignature::Uncompressed => *b"BSDIFFRW",
        }
    }

    /// Parse header signature bytes
    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self> {
        match &bytes {
            b"BSDIFF40" => Ok(DeltaSignature::Bzip2),
            b"BSDIFFLZ" => Ok(DeltaSignature::Lzma),
            b"BSDIFFRW" => Ok(DeltaSignature::Uncompressed),
            _ => Err(Error::UnsupportedCodec(format!(
                "unknown signature 0x{}",
                hex::encode(bytes)
            ))),
        }
    }
}

/// Decode a sign-magnitude 64-bit value
#[inline]
pub fn offtin(bytes: [u8; 8]) -> i64 {
    let raw = u64::from_le_bytes(bytes);
    let magnitude = (raw & !SIGN_BIT) as i64;
    if raw & SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a value in sign-magnitude form
#[inline]
pub fn offtout(value: i64) -> [u8; 8] {
    let raw = if value < 0 {
        value.unsigned_abs() | SIGN_BIT
    } else {
        value as u64
    };
    raw.to_le_bytes()
}

/// Parsed delta header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaHeader {
    /// Block codec signature
    pub signature: DeltaSignature,
    /// Length of the encoded control stream
    pub control_len: u64,
    /// Length of the encoded diff stream
    pub diff_len: u64,
    /// Size of the reconstructed output
    pub output_size: u64,
}

impl DeltaHeader {
    /// Parse and validate the header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = data.get(..HEADER_SIZE).ok_or_else(|| {
            Error::corrupt_delta(format!(
                "Truncated header: {} of {HEADER_SIZE} bytes",
                data.len()
            ))
        })?;

        let field = |index: usize| -> [u8; 8] {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&header[index * 8..index * 8 + 8]);
            bytes
        };

        let signature = DeltaSignature::from_bytes(field(0))?;
        let control_len = non_negative("control length", offtin(field(1)))?;
        let diff_len = non_negative("diff length", offtin(field(2)))?;
        let output_size = non_negative("output size", offtin(field(3)))?;

        log::trace!(
            "Delta header: {signature:?}, ctrl={control_len}, diff={diff_len}, out={output_size}"
        );

        Ok(Self {
            signature,
            control_len,
            diff_len,
            output_size,
        })
    }

    /// Encode the header
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.signature.to_bytes());
        out[8..16].copy_from_slice(&offtout(self.control_len as i64));
        out[16..24].copy_from_slice(&offtout(self.diff_len as i64));
        out[24..32].copy_from_slice(&offtout(self.output_size as i64));
        out
    }
}

fn non_negative(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::corrupt_delta(format!("Negative {field} in header: {value}")))
}
