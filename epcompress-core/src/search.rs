//! Suffix-array based match search.
//!
//! [`MatchTable::build`] precomputes, for every position of the input, a short
//! list of back-reference candidates. Each list is ordered by decreasing
//! length *and* decreasing distance: an entry `(len, distance)` followed by an
//! entry of length `next` means that `distance` is the closest offset for
//! every match length in `next + 1 ..= len`. The parser therefore never needs
//! to look at dominated (longer distance, same length) candidates.
//!
//! Construction:
//!
//! 1. Run lengths at distance 1 are found with a direct backward scan.
//! 2. The nearest previous occurrence of every byte and byte pair gives the
//!    length 1 and length 2 candidates.
//! 3. Start positions are sorted lexicographically (comparisons bounded by the
//!    maximum search length), adjacent longest common prefixes are derived,
//!    and every position walks outward in rank order tracking the minimum
//!    distance per prefix length.
//! 4. Matches reaching the maximum search length are extended backward while
//!    the distance stays the same, up to the format's length limit.
//!
//! Inputs longer than three times the maximum distance are processed in
//! overlapping chunks so the suffix array stays small.

use crate::error::{EpError, Result};
use crate::traits::FormatDescriptor;
use log::trace;
use std::cmp::Ordering;

/// One match candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Match length in bytes.
    pub len: u32,
    /// Distance back to the source (1 = previous byte).
    pub distance: u32,
}

/// Search limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Shortest candidate length reported.
    pub min_length: usize,
    /// Longest length found by suffix comparison.
    pub max_length: usize,
    /// Largest distance reported.
    pub max_distance: usize,
    /// Limit for lengths extended beyond `max_length`.
    pub extended_length: usize,
}

impl SearchLimits {
    /// Limits matching a stream format.
    pub fn for_format(format: &FormatDescriptor) -> Self {
        Self {
            min_length: format.min_match,
            max_length: format.max_search_length,
            max_distance: format.max_offset,
            extended_length: format.max_match,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Span {
    start: u32,
    count: u32,
}

/// Per-position match candidates for one input buffer.
#[derive(Debug)]
pub struct MatchTable {
    spans: Vec<Span>,
    entries: Vec<Match>,
    limits: SearchLimits,
}

impl MatchTable {
    /// Build the table for `buf`.
    pub fn build(buf: &[u8], limits: SearchLimits) -> Result<Self> {
        if buf.is_empty() {
            return Err(EpError::invalid_input("match search on an empty buffer"));
        }
        if limits.min_length < 1 || limits.max_length < 3 || limits.max_distance < 1 {
            return Err(EpError::internal("invalid match search limits"));
        }
        let n = buf.len();
        let max_len = limits.max_length;
        let max_dist = limits.max_distance;
        let mut table = Self {
            spans: vec![Span::default(); n],
            entries: Vec::with_capacity(n * 2),
            limits,
        };

        let rle = run_lengths(buf, limits.extended_length);
        let (near1, near2) = nearest_occurrences(buf, max_dist);

        let mut suffixes: Vec<u32> = Vec::new();
        let mut prv: Vec<u32> = Vec::new();
        let mut nxt: Vec<u32> = Vec::new();
        let mut run_first: Vec<u32> = Vec::new();
        let mut run_last: Vec<u32> = Vec::new();
        // Minimum distance minus one per prefix length; `max_dist` = none.
        let mut offs = vec![max_dist; max_len + 1];
        let mut found: Vec<Match> = Vec::with_capacity(16);

        let mut start = 0usize;
        while start < n {
            let chunk_start = start.saturating_sub(max_dist);
            let mut end = start + max_dist;
            if end > n || n <= max_dist * 3 {
                end = n;
            }
            let count = end - chunk_start;
            trace!("suffix sort of {count} positions at {chunk_start}");

            suffixes.clear();
            suffixes.extend((chunk_start..end).map(|p| p as u32));
            // Keys are compared on at most `max_len` bytes; suffixes equal on
            // that prefix fall back to position order, so the result is unique.
            suffixes.sort_unstable_by(|&a, &b| compare_suffixes(buf, a as usize, b as usize, max_len));

            prv.clear();
            prv.resize(count, 0);
            nxt.clear();
            nxt.resize(count, 0);
            for k in 1..count {
                let len = common_prefix(buf, suffixes[k - 1] as usize, suffixes[k] as usize, max_len);
                prv[k] = len as u32;
                nxt[k - 1] = len as u32;
            }
            // Runs of maximal prefix links; inside them positions ascend.
            run_first.clear();
            run_first.resize(count, 0);
            run_last.clear();
            run_last.resize(count, 0);
            for k in 0..count {
                run_first[k] = if k > 0 && prv[k] as usize == max_len {
                    run_first[k - 1]
                } else {
                    k as u32
                };
            }
            for k in (0..count).rev() {
                run_last[k] = if k + 1 < count && nxt[k] as usize == max_len {
                    run_last[k + 1]
                } else {
                    k as u32
                };
            }

            for rank in 0..count {
                let i = suffixes[rank] as usize;
                if i < start {
                    continue;
                }
                let rle_len = rle[i].min(max_len);
                let mut min_len = 1;
                if rle_len >= min_len {
                    min_len = rle_len + 1;
                    offs[rle_len] = 0;
                }
                min_len = min_len.max(3);
                let mut longest = min_len - 1;

                // Walk towards lower ranks.
                let mut match_len = prv[rank] as usize;
                if match_len >= min_len {
                    longest = longest.max(match_len);
                    let mut d = offs[match_len];
                    let mut ndx = rank;
                    loop {
                        ndx -= 1;
                        let j = suffixes[ndx] as usize;
                        if j < i {
                            d = d.min(i - j - 1);
                        }
                        if j < i && prv[ndx] as usize == max_len {
                            // The rest of this run is farther away.
                            ndx = run_first[ndx] as usize;
                        }
                        if (prv[ndx] as usize) < match_len {
                            offs[match_len] = offs[match_len].min(d);
                            match_len = prv[ndx] as usize;
                            if match_len < min_len {
                                break;
                            }
                        }
                    }
                }

                // Walk towards higher ranks.
                let mut match_len = nxt[rank] as usize;
                if match_len >= min_len {
                    longest = longest.max(match_len);
                    let mut d = offs[match_len];
                    let mut ndx = rank;
                    loop {
                        ndx += 1;
                        let j = suffixes[ndx] as usize;
                        if j < i {
                            d = d.min(i - j - 1);
                        }
                        if j > i && nxt[ndx] as usize == max_len {
                            ndx = run_last[ndx] as usize;
                        }
                        if (nxt[ndx] as usize) < match_len {
                            offs[match_len] = offs[match_len].min(d);
                            match_len = nxt[ndx] as usize;
                            if match_len < min_len {
                                break;
                            }
                        }
                    }
                }

                offs[1] = near1[i];
                offs[2] = near2[i];
                found.clear();
                let mut prev_dist = max_dist;
                for k in (1..=longest).rev() {
                    let d = offs[k];
                    offs[k] = max_dist;
                    if d < prev_dist && k >= limits.min_length {
                        prev_dist = d;
                        found.push(Match {
                            len: k as u32,
                            distance: d as u32 + 1,
                        });
                        if d == 0 {
                            break;
                        }
                    }
                }
                table.store(i, &found);
            }
            start = end;
        }

        if limits.extended_length > max_len {
            table.extend_long_matches();
        }
        Ok(table)
    }

    fn store(&mut self, pos: usize, found: &[Match]) {
        self.spans[pos] = Span {
            start: self.entries.len() as u32,
            count: found.len() as u32,
        };
        self.entries.extend_from_slice(found);
    }

    /// Extend maximal-length matches backward while the distance is equal.
    fn extend_long_matches(&mut self) {
        let max_len = self.limits.max_length as u32;
        let limit = self.limits.extended_length as u32;
        let mut i = self.spans.len() - 1;
        while i > 0 {
            let Some(first) = self.first(i) else {
                i -= 1;
                continue;
            };
            if first.len != max_len {
                i -= 1;
                continue;
            }
            let mut len = max_len;
            let distance = first.distance;
            loop {
                i -= 1;
                if i == 0 {
                    break;
                }
                match self.first(i) {
                    Some(m) if m.distance == distance => {
                        len = (len + 1).min(limit);
                        let idx = self.spans[i].start as usize;
                        self.entries[idx].len = len;
                    }
                    _ => break,
                }
            }
        }
    }

    fn first(&self, pos: usize) -> Option<Match> {
        let span = self.spans[pos];
        (span.count > 0).then(|| self.entries[span.start as usize])
    }

    /// Candidates at `pos`, longest first.
    #[inline]
    pub fn matches(&self, pos: usize) -> &[Match] {
        let span = self.spans[pos];
        let start = span.start as usize;
        &self.entries[start..start + span.count as usize]
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Limits the table was built with.
    pub fn limits(&self) -> &SearchLimits {
        &self.limits
    }
}

/// Length of the distance-1 run starting at every position.
fn run_lengths(buf: &[u8], limit: usize) -> Vec<usize> {
    let n = buf.len();
    let mut table = vec![0usize; n];
    let mut run = 1usize;
    let mut byte = buf[n - 1];
    for i in (0..n - 1).rev() {
        if buf[i] != byte {
            byte = buf[i];
            run = 0;
        }
        if run >= 1 {
            table[i + 1] = run;
        }
        if run < limit {
            run += 1;
        }
    }
    table
}

/// Distance minus one to the nearest earlier copy of every byte and byte
/// pair, or `max_dist` if there is none in range.
fn nearest_occurrences(buf: &[u8], max_dist: usize) -> (Vec<usize>, Vec<usize>) {
    let n = buf.len();
    let mut near1 = vec![max_dist; n];
    let mut near2 = vec![max_dist; n];
    let mut last = vec![usize::MAX; 65_536];
    for (i, &b) in buf.iter().enumerate() {
        let key = b as usize;
        if last[key] < i {
            let d = i - (last[key] + 1);
            if d < max_dist {
                near1[i] = d;
            }
        }
        last[key] = i;
    }
    last.iter_mut().for_each(|p| *p = usize::MAX);
    for i in 0..n.saturating_sub(1) {
        let key = buf[i] as usize | (buf[i + 1] as usize) << 8;
        if last[key] < i {
            let d = i - (last[key] + 1);
            if d < max_dist {
                near2[i] = d;
            }
        }
        last[key] = i;
    }
    (near1, near2)
}

/// Compare two suffixes on at most `max_len` bytes, then by position.
fn compare_suffixes(buf: &[u8], a: usize, b: usize, max_len: usize) -> Ordering {
    let len_a = (buf.len() - a).min(max_len);
    let len_b = (buf.len() - b).min(max_len);
    let l = len_a.min(len_b);
    buf[a..a + l].cmp(&buf[b..b + l]).then(a.cmp(&b))
}

fn common_prefix(buf: &[u8], a: usize, b: usize, max_len: usize) -> usize {
    let limit = (buf.len() - a.max(b)).min(max_len);
    buf[a..a + limit]
        .iter()
        .zip(&buf[b..b + limit])
        .take_while(|(x, y)| x == y)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(len: usize, alphabet: u8, mut seed: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((seed >> 33) % alphabet as u64) as u8
            })
            .collect()
    }

    /// Closest distance achieving a match of at least `len` bytes.
    fn brute_force_distance(buf: &[u8], pos: usize, len: usize, max_dist: usize) -> Option<usize> {
        if pos + len > buf.len() {
            return None;
        }
        (1..=pos.min(max_dist)).find(|&d| (0..len).all(|k| buf[pos + k] == buf[pos - d + k]))
    }

    fn check_against_brute_force(buf: &[u8], limits: SearchLimits) {
        let table = MatchTable::build(buf, limits).unwrap();
        for pos in 0..buf.len() {
            let list = table.matches(pos);
            for m in list {
                let (len, d) = (m.len as usize, m.distance as usize);
                assert!(d >= 1 && d <= pos, "pos {pos}: distance {d}");
                assert!(buf[pos..pos + len] == buf[pos - d..pos - d + len]);
            }
            let longest = list.first().map_or(0, |m| m.len as usize);
            for len in limits.min_length..=limits.max_length {
                let expected = brute_force_distance(buf, pos, len, limits.max_distance);
                if len > longest {
                    assert_eq!(expected, None, "pos {pos}: missed length {len}");
                    continue;
                }
                let covering = list
                    .iter()
                    .rev()
                    .find(|m| m.len as usize >= len)
                    .map(|m| m.distance as usize);
                assert_eq!(covering, expected, "pos {pos} len {len}");
            }
        }
    }

    #[test]
    fn test_matches_are_closest() {
        let limits = SearchLimits {
            min_length: 1,
            max_length: 12,
            max_distance: 40,
            extended_length: 12,
        };
        check_against_brute_force(&lcg_bytes(100, 3, 7), limits);
        check_against_brute_force(&lcg_bytes(100, 16, 9), limits);
    }

    #[test]
    fn test_chunked_search() {
        // Longer than three times the distance limit.
        let limits = SearchLimits {
            min_length: 2,
            max_length: 10,
            max_distance: 50,
            extended_length: 10,
        };
        check_against_brute_force(&lcg_bytes(400, 4, 11), limits);
    }

    #[test]
    fn test_periodic_input() {
        let buf: Vec<u8> = b"abc".iter().cycle().take(300).copied().collect();
        let limits = SearchLimits {
            min_length: 1,
            max_length: 16,
            max_distance: 1000,
            extended_length: 16,
        };
        check_against_brute_force(&buf, limits);
    }

    #[test]
    fn test_run_is_extended() {
        let buf = vec![0u8; 2000];
        let table = MatchTable::build(&buf, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        assert!(table.matches(0).is_empty());
        assert_eq!(table.matches(1)[0], Match { len: 1999, distance: 1 });
        assert_eq!(table.matches(1000)[0], Match { len: 1000, distance: 1 });
        assert_eq!(table.matches(1999)[0], Match { len: 1, distance: 1 });
    }

    #[test]
    fn test_long_repeat_extended() {
        let mut buf = lcg_bytes(1000, 255, 3);
        let copy = buf.clone();
        buf.extend_from_slice(&copy);
        let table = MatchTable::build(&buf, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        assert_eq!(table.matches(1000)[0], Match { len: 1000, distance: 1000 });
        assert_eq!(table.matches(1400)[0], Match { len: 600, distance: 1000 });
    }

    #[test]
    fn test_suffix_order_bounded_by_max_length() {
        let buf = b"abcdXabcdY";
        // Equal on the first four bytes: position decides.
        assert_eq!(compare_suffixes(buf, 5, 0, 4), Ordering::Greater);
        assert_eq!(compare_suffixes(buf, 0, 5, 4), Ordering::Less);
        // The fifth byte decides once it is compared.
        assert_eq!(compare_suffixes(buf, 0, 5, 5), Ordering::Less);
        assert_eq!(compare_suffixes(b"abcdZabcdY", 0, 5, 5), Ordering::Greater);
    }

    #[test]
    fn test_empty_rejected() {
        let err = MatchTable::build(&[], SearchLimits::for_format(&FormatDescriptor::M0)).unwrap_err();
        assert!(matches!(err, EpError::InvalidInput { .. }));
    }

    #[test]
    fn test_min_length_filter() {
        let buf = b"abxabyab";
        let limits = SearchLimits::for_format(&FormatDescriptor::M0);
        let table = MatchTable::build(buf, limits).unwrap();
        for pos in 0..buf.len() {
            assert!(table.matches(pos).iter().all(|m| m.len >= 2));
        }
        assert_eq!(table.matches(3)[0], Match { len: 2, distance: 3 });
    }
}
