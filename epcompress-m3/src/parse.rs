//! Backward optimal parse for M3.
//!
//! The parse runs over the reversed input. Every position stores its best
//! step, the total bits from there to the end and the largest amount by
//! which the encoded tail outgrows the decoded tail (`overrun`). The
//! decompressor works in place from the end of memory, so the first
//! literal run is extended until the rest of the stream stays within the
//! read-ahead margin.

use crate::codes::{MAX_SEARCH_LENGTH, MAX_SHORT_OFFSET, MIN_MATCH, literal_run_size, match_size};
use epcompress_core::search::MatchTable;

/// Read-ahead margin of the in-place decoder, in bits.
pub(crate) const IN_PLACE_MARGIN_BITS: usize = 16;

/// Decision at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    /// Bytes covered.
    pub len: usize,
    /// Match distance, 0 for a literal run.
    pub distance: usize,
}

impl Step {
    fn literals(len: usize) -> Self {
        Self { len, distance: 0 }
    }

    /// Whether this step is a literal run.
    pub fn is_literal(&self) -> bool {
        self.distance == 0
    }
}

/// Parser limits taken from the compression parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseLimits {
    pub min_length: usize,
    pub max_offset: usize,
}

/// Result of the parse.
#[derive(Debug)]
pub(crate) struct Plan {
    pub steps: Vec<Step>,
    /// Bits from each position to the end.
    pub bits: Vec<usize>,
    /// Largest excess of encoded over decoded bits along the chosen path
    /// from each position.
    pub overrun: Vec<usize>,
}

impl Plan {
    /// Total stream bits.
    pub fn total_bits(&self) -> usize {
        self.bits[0]
    }

    /// Chosen steps from the start.
    pub fn walk(&self) -> impl Iterator<Item = (usize, Step)> + '_ {
        let mut pos = 0;
        std::iter::from_fn(move || {
            let step = *self.steps.get(pos)?;
            let at = pos;
            pos += step.len;
            Some((at, step))
        })
    }
}

struct Best {
    size: usize,
    step: Step,
}

/// Parse `n` bytes searched by `matches`.
pub(crate) fn parse(matches: &MatchTable, limits: ParseLimits) -> Plan {
    let n = matches.len();
    let min_len = limits.min_length.max(MIN_MATCH);
    let mut plan = Plan {
        steps: vec![Step::literals(1); n],
        bits: vec![0; n + 1],
        overrun: vec![0; n + 1],
    };
    // Nearest position at or after each index where a match starts, or `n`.
    let mut next_stop = vec![n; n + 1];

    for i in (1..n).rev() {
        let remaining = n - i;
        let mut best = Best {
            size: usize::MAX,
            step: Step::literals(1),
        };
        // A token after this one needs a flag bit, paid here.
        let match_cost = |len: usize, distance: usize, bits: &[usize]| {
            match_size(distance, len) + usize::from(i + len < n) + bits[i + len]
        };

        let entries = matches.matches(i);
        let first_usable = entries
            .iter()
            .position(|m| m.distance as usize <= limits.max_offset)
            .unwrap_or(entries.len());
        let entries = &entries[first_usable..];
        let mut long_run = false;
        for (e, m) in entries.iter().enumerate() {
            let distance = m.distance as usize;
            let next_len = entries.get(e + 1).map_or(0, |next| next.len as usize);
            let mut top = (m.len as usize).min(remaining);
            if e == 0 && top > MAX_SEARCH_LENGTH {
                let size = match_cost(top, distance, &plan.bits);
                best = Best {
                    size,
                    step: Step { len: top, distance },
                };
                if distance == 1 {
                    long_run = true;
                    break;
                }
                top = MAX_SEARCH_LENGTH;
            }
            for len in ((next_len + 1).max(min_len)..=top).rev() {
                if len == 2 && distance > MAX_SHORT_OFFSET {
                    continue;
                }
                let size = match_cost(len, distance, &plan.bits);
                if size < best.size {
                    best = Best {
                        size,
                        step: Step { len, distance },
                    };
                }
            }
        }

        if !long_run {
            // Literal runs are always followed by a match, so only match
            // positions (and the end) can close one.
            let mut end = next_stop[i + 1];
            loop {
                let size = plan.bits[end] + literal_run_size(end - i);
                if size <= best.size {
                    best = Best {
                        size,
                        step: Step::literals(end - i),
                    };
                } else if size > best.size.saturating_add(31) {
                    break;
                }
                if end == n {
                    break;
                }
                end = next_stop[end + 1];
            }
        }

        let Best { size, step } = best;
        plan.steps[i] = step;
        plan.bits[i] = size;
        let decoded_bits = remaining * 8;
        plan.overrun[i] = plan.overrun[i + step.len].max(size.saturating_sub(decoded_bits));
        next_stop[i] = if step.is_literal() { next_stop[i + 1] } else { i };
    }

    // The stream starts with a literal run that carries no flag. A run over
    // the whole input always fits.
    let mut best_size = usize::MAX;
    let mut best_len = n;
    let mut end = next_stop[1];
    loop {
        let size = plan.bits[end] + literal_run_size(end);
        let slack = (size + 7) & 7;
        if size <= best_size && plan.overrun[end] < slack + IN_PLACE_MARGIN_BITS {
            best_size = size;
            best_len = end;
        }
        if end == n {
            break;
        }
        end = next_stop[end + 1];
    }
    plan.steps[0] = Step::literals(best_len);
    plan.bits[0] = best_size;
    plan.overrun[0] = plan.overrun[best_len].max(best_size.saturating_sub(n * 8));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress_core::search::SearchLimits;
    use epcompress_core::traits::FormatDescriptor;

    fn run(input: &[u8], min_length: usize) -> Plan {
        let matches = MatchTable::build(input, SearchLimits::for_format(&FormatDescriptor::M3)).unwrap();
        parse(
            &matches,
            ParseLimits {
                min_length,
                max_offset: 65_535,
            },
        )
    }

    #[test]
    fn test_steps_cover_input() {
        let input = b"abracadabra abracadabra cadabra".to_vec();
        let plan = run(&input, 1);
        let covered: usize = plan.walk().map(|(_, s)| s.len).sum();
        assert_eq!(covered, input.len());
        assert!(plan.walk().any(|(_, s)| !s.is_literal()));
        assert!(plan.steps[0].is_literal());
    }

    #[test]
    fn test_literal_runs_alternate_with_matches() {
        let mut input = b"0123456789".repeat(5);
        input.extend_from_slice(b"qwertyuiop");
        input.extend(b"0123456789".repeat(5));
        let plan = run(&input, 1);
        let steps: Vec<Step> = plan.walk().map(|(_, s)| s).collect();
        assert!(steps.windows(2).all(|w| !(w[0].is_literal() && w[1].is_literal())));
    }

    #[test]
    fn test_repeat_taken_as_one_match() {
        let mut seed = 17u32;
        let mut input: Vec<u8> = (0..1000)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            })
            .collect();
        input.extend_from_within(0..40);
        // The encoder parses the reversed block.
        input.reverse();
        let plan = run(&input, 1);
        let long: Vec<(usize, Step)> = plan.walk().filter(|(_, s)| !s.is_literal() && s.len >= 8).collect();
        assert_eq!(
            long,
            vec![(
                1000,
                Step {
                    len: 40,
                    distance: 1000
                }
            )]
        );
    }

    #[test]
    fn test_long_run_taken_whole() {
        let mut input = vec![b'x'];
        input.extend(std::iter::repeat_n(0u8, 5000));
        let plan = run(&input, 1);
        let steps: Vec<Step> = plan.walk().map(|(_, s)| s).collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], Step::literals(2));
        assert_eq!(
            steps[1],
            Step {
                len: 4999,
                distance: 1
            }
        );
    }

    #[test]
    fn test_two_byte_matches_limited() {
        // "ab" repeated at distance 600 only.
        let mut input = b"ab".to_vec();
        input.extend((0..598u32).map(|i| (i % 200 + 50) as u8 ^ (i / 200) as u8));
        input.extend_from_slice(b"ab");
        let plan = run(&input, 1);
        for (_, step) in plan.walk() {
            assert!(step.is_literal() || step.len > 2 || step.distance <= MAX_SHORT_OFFSET);
        }
        assert!(plan.walk().all(|(_, s)| s.is_literal() || s.len >= 3 || s.distance != 600));
    }

    #[test]
    fn test_min_length_respected() {
        let input = b"xyzxyzqxyzxyzqxyz".to_vec();
        for (_, step) in run(&input, 3).walk() {
            assert!(step.is_literal() || step.len >= 3);
        }
    }

    #[test]
    fn test_in_place_margin_kept() {
        // Incompressible data at the end of the reversed buffer makes the
        // tail of the stream larger than the bytes it decodes to.
        let mut seed = 99u32;
        let mut input = vec![0u8; 3000];
        input.extend((0..2000).map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as u8
        }));
        let plan = run(&input, 1);
        let n = input.len();
        let slack = (plan.total_bits() + 7) & 7;
        let first = plan.steps[0].len;
        for (pos, _) in plan.walk().filter(|&(pos, _)| pos >= first) {
            assert!(plan.bits[pos] < (n - pos) * 8 + slack + IN_PLACE_MARGIN_BITS);
        }
        let covered: usize = plan.walk().map(|(_, s)| s.len).sum();
        assert_eq!(covered, n);
    }
}
