//! Delta creation using the bsdiff 4.0 scan
//!
//! The new buffer is partitioned greedily into control triples
//! `(add, extra, seek)`:
//!
//! 1. `add` bytes are `new - old` (mod 256) over an approximately matching
//!    region, which compresses well when the region differs only sparsely
//! 2. `extra` bytes are literal new bytes for the unmatched gap
//! 3. `seek` moves the old-file cursor to where the next match starts
//!
//! Matches are found with a binary search over the suffix array of the old
//! buffer.

use super::header::offtout;
use super::suffix::suffix_array;

/// Raw (not yet compressed) delta streams
#[derive(Debug, Default)]
pub(crate) struct RawStreams {
    pub(crate) control: Vec<u8>,
    pub(crate) diff: Vec<u8>,
    pub(crate) extra: Vec<u8>,
}

#[inline]
fn match_len(old: &[u8], new: &[u8]) -> usize {
    old.iter().zip(new).take_while(|(a, b)| a == b).count()
}

/// Longest match of `target` among the suffixes of `old`
///
/// Returns the match position in `old` and its length.
fn search(sa: &[usize], old: &[u8], target: &[u8]) -> (usize, usize) {
    let mut lo = 0usize;
    let mut hi = sa.len() - 1;

    while hi - lo >= 2 {
        let mid = lo + (hi - lo) / 2;
        let suffix = &old[sa[mid]..];
        let n = suffix.len().min(target.len());
        if suffix[..n] < target[..n] {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let lo_len = match_len(&old[sa[lo]..], target);
    let hi_len = match_len(&old[sa[hi]..], target);
    if lo_len > hi_len {
        (sa[lo], lo_len)
    } else {
        (sa[hi], hi_len)
    }
}

#[inline]
fn old_byte_matches(old: &[u8], new: &[u8], new_pos: usize, offset: i64) -> bool {
    let old_pos = new_pos as i64 + offset;
    old_pos >= 0 && (old_pos as usize) < old.len() && old[old_pos as usize] == new[new_pos]
}

/// Compute the uncompressed control, diff and extra streams for `old -> new`
pub(crate) fn diff_streams(old: &[u8], new: &[u8]) -> RawStreams {
    let sa = suffix_array(old);
    let mut streams = RawStreams::default();

    let mut scan = 0usize;
    let mut len = 0usize;
    let mut pos = 0usize;
    let mut last_scan = 0usize;
    let mut last_pos = 0usize;
    let mut last_offset = 0i64;

    while scan < new.len() {
        let mut old_score = 0i64;
        scan += len;
        let mut scsc = scan;

        while scan < new.len() {
            (pos, len) = search(&sa, old, &new[scan..]);

            while scsc < scan + len {
                if old_byte_matches(old, new, scsc, last_offset) {
                    old_score += 1;
                }
                scsc += 1;
            }

            if (len as i64 == old_score && len != 0) || len as i64 > old_score + 8 {
                break;
            }

            if old_byte_matches(old, new, scan, last_offset) {
                old_score -= 1;
            }
            scan += 1;
        }

        if len as i64 == old_score && scan != new.len() {
            continue;
        }

        // Extend the previous match forwards, scoring matches*2 - length
        let mut score = 0i64;
        let mut best_forward = 0i64;
        let mut len_forward = 0usize;
        let mut i = 0usize;
        while last_scan + i < scan && last_pos + i < old.len() {
            if old[last_pos + i] == new[last_scan + i] {
                score += 1;
            }
            i += 1;
            if score * 2 - i as i64 > best_forward * 2 - len_forward as i64 {
                best_forward = score;
                len_forward = i;
            }
        }

        // Extend the current match backwards
        let mut len_backward = 0usize;
        if scan < new.len() {
            let mut score = 0i64;
            let mut best_backward = 0i64;
            let mut i = 1usize;
            while scan >= last_scan + i && pos >= i {
                if old[pos - i] == new[scan - i] {
                    score += 1;
                }
                if score * 2 - i as i64 > best_backward * 2 - len_backward as i64 {
                    best_backward = score;
                    len_backward = i;
                }
                i += 1;
            }
        }

        // Resolve overlap between the two extensions
        if last_scan + len_forward > scan - len_backward {
            let overlap = (last_scan + len_forward) - (scan - len_backward);
            let mut score = 0i64;
            let mut best_split = 0i64;
            let mut split = 0usize;
            for i in 0..overlap {
                if new[last_scan + len_forward - overlap + i]
                    == old[last_pos + len_forward - overlap + i]
                {
                    score += 1;
                }
                if new[scan - len_backward + i] == old[pos - len_backward + i] {
                    score -= 1;
                }
                if score > best_split {
                    best_split = score;
                    split = i + 1;
                }
            }
            len_forward = len_forward + split - overlap;
            len_backward -= split;
        }

        streams.diff.extend(
            new[last_scan..last_scan + len_forward]
                .iter()
                .zip(&old[last_pos..last_pos + len_forward])
                .map(|(n, o)| n.wrapping_sub(*o)),
        );

        let extra_start = last_scan + len_forward;
        let extra_end = scan - len_backward;
        streams.extra.extend_from_slice(&new[extra_start..extra_end]);

        let seek = (pos as i64 - len_backward as i64) - (last_pos + len_forward) as i64;
        streams.control.extend_from_slice(&offtout(len_forward as i64));
        streams
            .control
            .extend_from_slice(&offtout((extra_end - extra_start) as i64));
        streams.control.extend_from_slice(&offtout(seek));

        last_scan = scan - len_backward;
        last_pos = pos - len_backward;
        last_offset = pos as i64 - scan as i64;
    }

    log::trace!(
        "bsdiff scan: {} control bytes, {} diff bytes, {} extra bytes",
        streams.control.len(),
        streams.diff.len(),
        streams.extra.len()
    );

    streams
}
