//! Block codecs for the three delta streams
//!
//! Each stream (control, diff, extra) is wrapped independently. Decoding
//! failures surface as [`Error::CorruptDelta`] because a stream that does not
//! decode is a truncated or damaged delta.

use super::header::DeltaSignature;
use crate::{Error, Result};
use bzip2::Compression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use std::io::{BufReader, Cursor, Read, Write};

/// Compress one stream with the codec named by `signature`
pub(crate) fn encode(signature: DeltaSignature, data: &[u8], bzip2_level: u32) -> Result<Vec<u8>> {
    match signature {
        DeltaSignature::Bzip2 => bzip2_compress(data, bzip2_level),
        DeltaSignature::Lzma => lzma_compress(data),
        DeltaSignature::Uncompressed => Ok(data.to_vec()),
    }
}

/// Decompress one stream with the codec named by `signature`
pub(crate) fn decode(signature: DeltaSignature, data: &[u8], stream: &str) -> Result<Vec<u8>> {
    match signature {
        DeltaSignature::Bzip2 => bzip2_decompress(data, stream),
        DeltaSignature::Lzma => lzma_decompress(data, stream),
        DeltaSignature::Uncompressed => Ok(data.to_vec()),
    }
}

fn bzip2_compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level.clamp(1, 9)));
    encoder
        .write_all(data)
        .map_err(|e| Error::compression(format!("BZip2 compression failed: {e}")))?;

    encoder
        .finish()
        .map_err(|e| Error::compression(format!("BZip2 compression failed: {e}")))
}

fn bzip2_decompress(data: &[u8], stream: &str) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::corrupt_delta(format!("{stream} stream: bzip2 decode failed: {e}")))?;

    Ok(decompressed)
}

fn lzma_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut input = BufReader::new(Cursor::new(data));
    let mut output = Vec::new();

    lzma_rs::lzma_compress(&mut input, &mut output)
        .map_err(|e| Error::compression(format!("LZMA compression failed: {e:?}")))?;
    Ok(output)
}

fn lzma_decompress(data: &[u8], stream: &str) -> Result<Vec<u8>> {
    let mut input = BufReader::new(Cursor::new(data));
    let mut output = Vec::new();

    match lzma_rs::lzma_decompress(&mut input, &mut output) {
        Ok(()) => Ok(output),
        Err(e) => {
            log::debug!(
                "LZMA {stream} stream failed to decode, first bytes: {:02X?}",
                &data[..16.min(data.len())]
            );
            Err(Error::corrupt_delta(format!(
                "{stream} stream: LZMA decode failed: {e:?}"
            )))
        }
    }
}
