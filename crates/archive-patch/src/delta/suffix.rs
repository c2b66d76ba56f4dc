//! Linear-time suffix array construction (SA-IS)
//!
//! Induced sorting after Nong, Zhang and Chan. The byte text is lifted into a
//! `u32` alphabet shifted by one so that a unique, smallest sentinel `0` can
//! terminate it. The returned array therefore has `len + 1` entries and its
//! first entry is always `len`, the empty suffix, which is the layout the
//! bsdiff match search expects.

const EMPTY: usize = usize::MAX;

/// Build the suffix array of `text`, including the empty suffix
pub fn suffix_array(text: &[u8]) -> Vec<usize> {
    let mut lifted: Vec<u32> = Vec::with_capacity(text.len() + 1);
    lifted.extend(text.iter().map(|&b| u32::from(b) + 1));
    lifted.push(0);
    sa_is(&lifted, 257)
}

/// `s` must end with a unique sentinel that is smaller than every other symbol
fn sa_is(s: &[u32], alphabet: usize) -> Vec<usize> {
    let n = s.len();
    if n == 1 {
        return vec![0];
    }

    // S-type: suffix is smaller than its right neighbour
    let mut is_s = vec![false; n];
    is_s[n - 1] = true;
    for i in (0..n - 1).rev() {
        is_s[i] = s[i] < s[i + 1] || (s[i] == s[i + 1] && is_s[i + 1]);
    }

    let mut counts = vec![0usize; alphabet];
    for &c in s {
        counts[c as usize] += 1;
    }

    // Step 1: approximate LMS order, then induce
    let mut sa = vec![EMPTY; n];
    let mut tails = bucket_ends(&counts);
    for i in 1..n {
        if is_lms(&is_s, i) {
            let c = s[i] as usize;
            tails[c] -= 1;
            sa[tails[c]] = i;
        }
    }
    induce(s, &mut sa, &is_s, &counts);

    // Step 2: name LMS substrings in sorted order
    let mut names = vec![EMPTY; n];
    let mut name = 0usize;
    let mut previous = EMPTY;
    for &pos in &sa {
        if pos == EMPTY || !is_lms(&is_s, pos) {
            continue;
        }
        if previous != EMPTY && !lms_substrings_equal(s, &is_s, previous, pos) {
            name += 1;
        }
        names[pos] = name;
        previous = pos;
    }
    let distinct = name + 1;

    let lms_positions: Vec<usize> = (1..n).filter(|&i| is_lms(&is_s, i)).collect();
    let reduced: Vec<u32> = lms_positions.iter().map(|&p| names[p] as u32).collect();

    // Step 3: sort the LMS suffixes exactly, recursing when names collide
    let sorted_lms: Vec<usize> = if distinct < reduced.len() {
        sa_is(&reduced, distinct)
            .into_iter()
            .map(|i| lms_positions[i])
            .collect()
    } else {
        let mut order = vec![0usize; reduced.len()];
        for (i, &r) in reduced.iter().enumerate() {
            order[r as usize] = lms_positions[i];
        }
        order
    };

    // Step 4: final induction from the exact LMS order
    sa.fill(EMPTY);
    let mut tails = bucket_ends(&counts);
    for &pos in sorted_lms.iter().rev() {
        let c = s[pos] as usize;
        tails[c] -= 1;
        sa[tails[c]] = pos;
    }
    induce(s, &mut sa, &is_s, &counts);

    sa
}

#[inline]
fn is_lms(is_s: &[bool], i: usize) -> bool {
    i > 0 && is_s[i] && !is_s[i - 1]
}

fn bucket_starts(counts: &[usize]) -> Vec<usize> {
    let mut sum = 0;
    counts
        .iter()
        .map(|&c| {
            let start = sum;
            sum += c;
            start
        })
        .collect()
}

fn bucket_ends(counts: &[usize]) -> Vec<usize> {
    let mut sum = 0;
    counts
        .iter()
        .map(|&c| {
            sum += c;
            sum
        })
        .collect()
}

fn induce(s: &[u32], sa: &mut [usize], is_s: &[bool], counts: &[usize]) {
    let n = s.len();

    let mut heads = bucket_starts(counts);
    for i in 0..n {
        let j = sa[i];
        if j != EMPTY && j > 0 && !is_s[j - 1] {
            let c = s[j - 1] as usize;
            sa[heads[c]] = j - 1;
            heads[c] += 1;
        }
    }

    let mut tails = bucket_ends(counts);
    for i in (0..n).rev() {
        let j = sa[i];
        if j != EMPTY && j > 0 && is_s[j - 1] {
            let c = s[j - 1] as usize;
            tails[c] -= 1;
            sa[tails[c]] = j - 1;
        }
    }
}

fn lms_substrings_equal(s: &[u32], is_s: &[bool], a: usize, b: usize) -> bool {
    let last = s.len() - 1;
    if a == last || b == last {
        return a == b;
    }

    let mut i = 0;
    loop {
        if s[a + i] != s[b + i] || is_s[a + i] != is_s[b + i] {
            return false;
        }
        if i > 0 {
            let a_end = is_lms(is_s, a + i);
            let b_end = is_lms(is_s, b + i);
            if a_end && b_end {
                return true;
            }
            if a_end != b_end {
                return false;
            }
        }
        i += 1;
    }
}
