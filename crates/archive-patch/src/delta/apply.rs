//! Delta application
//!
//! Replays the control triples over the decoded streams. Every length and
//! offset is validated before it is used, so a damaged delta produces
//! [`Error::CorruptDelta`] instead of a panic.

use super::Delta;
use super::codec;
use super::header::{CONTROL_TRIPLE_SIZE, offtin};
use crate::{Error, Result};

/// Cap on the up-front output allocation; larger outputs grow on demand
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// Apply `delta` to `old`, reconstructing the new buffer
pub fn apply(old: &[u8], delta: &Delta) -> Result<Vec<u8>> {
    let control = codec::decode(delta.signature, &delta.control_block, "control")?;
    let diff = codec::decode(delta.signature, &delta.diff_block, "diff")?;
    let extra = codec::decode(delta.signature, &delta.extra_block, "extra")?;

    let output_size = usize::try_from(delta.output_size).map_err(|_| {
        Error::corrupt_delta(format!("Output size {} exceeds memory", delta.output_size))
    })?;

    if control.len() % CONTROL_TRIPLE_SIZE != 0 {
        return Err(Error::corrupt_delta(format!(
            "Control stream length {} is not a multiple of {CONTROL_TRIPLE_SIZE}",
            control.len()
        )));
    }

    let mut new = Vec::with_capacity(output_size.min(MAX_PREALLOCATION));
    let mut old_pos = 0i64;
    let mut diff_pos = 0usize;
    let mut extra_pos = 0usize;

    for (index, triple) in control.chunks_exact(CONTROL_TRIPLE_SIZE).enumerate() {
        let field = |i: usize| -> [u8; 8] {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&triple[i * 8..i * 8 + 8]);
            bytes
        };
        let add_len = offtin(field(0));
        let extra_len = offtin(field(1));
        let seek = offtin(field(2));

        if add_len < 0 || extra_len < 0 {
            return Err(Error::corrupt_delta(format!(
                "Negative length in control triple {index}: add={add_len}, extra={extra_len}"
            )));
        }
        let add_len = add_len as usize;
        let extra_len = extra_len as usize;

        // Add phase: diff bytes plus old bytes while the old cursor is in range
        check_output(new.len(), add_len, output_size, index, "add")?;
        let old_end = old_pos.checked_add(add_len as i64).ok_or_else(|| {
            Error::corrupt_delta(format!(
                "Old cursor overflow at triple {index}: {add_len} bytes from {old_pos}"
            ))
        })?;
        let diff_end = diff_pos
            .checked_add(add_len)
            .filter(|&end| end <= diff.len())
            .ok_or_else(|| {
                Error::corrupt_delta(format!(
                    "Diff stream exhausted at triple {index}: need {add_len} bytes at {diff_pos}, have {}",
                    diff.len()
                ))
            })?;
        for (i, &d) in diff[diff_pos..diff_end].iter().enumerate() {
            let o = old_pos + i as i64;
            let byte = if o >= 0 && (o as usize) < old.len() {
                d.wrapping_add(old[o as usize])
            } else {
                d
            };
            new.push(byte);
        }
        diff_pos = diff_end;
        old_pos = old_end;

        // Extra phase: literal bytes
        check_output(new.len(), extra_len, output_size, index, "extra")?;
        let extra_end = extra_pos
            .checked_add(extra_len)
            .filter(|&end| end <= extra.len())
            .ok_or_else(|| {
                Error::corrupt_delta(format!(
                    "Extra stream exhausted at triple {index}: need {extra_len} bytes at {extra_pos}, have {}",
                    extra.len()
                ))
            })?;
        new.extend_from_slice(&extra[extra_pos..extra_end]);
        extra_pos = extra_end;

        old_pos = old_pos
            .checked_add(seek)
            .ok_or_else(|| Error::corrupt_delta("Old cursor overflow"))?;
    }

    if new.len() != output_size {
        return Err(Error::corrupt_delta(format!(
            "Delta produced {} bytes, header declares {output_size}",
            new.len()
        )));
    }

    log::trace!("Delta applied: {} -> {} bytes", old.len(), new.len());

    Ok(new)
}

fn check_output(current: usize, len: usize, output_size: usize, index: usize, phase: &str) -> Result<()> {
    match current.checked_add(len) {
        Some(end) if end <= output_size => Ok(()),
        _ => Err(Error::corrupt_delta(format!(
            "{phase} of {len} bytes at triple {index} overruns output size {output_size}"
        ))),
    }
}
