//! Optimal parsing for M2.
//!
//! Both parsers walk the block backward. `bits[i]` is the cheapest encoding
//! of the bytes from `i` to the end of the block; every position picks the
//! literal, literal run or match that minimizes it. The first pass runs
//! before any statistics exist and uses a fixed cost estimate; later passes
//! use the symbol sizes of the tables built by the previous pass.

use crate::tables::{
    EncodeTables, LITERAL_RUN_MAX, LITERAL_RUN_MIN, MAX_SEARCH_LENGTH, OFFS1_MAX, OFFS2_MAX,
};
use epcompress_core::search::MatchTable;

const INFINITE: usize = 0x7FFF_FFFF;

/// Parse decision at one position: a match (`distance > 0`), a single
/// literal or a literal run (`distance == 0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Choice {
    pub len: usize,
    pub distance: usize,
}

impl Choice {
    fn literal() -> Self {
        Self { len: 1, distance: 0 }
    }

    pub fn is_match(&self) -> bool {
        self.distance > 0
    }
}

/// Block to parse: `len` bytes of the searched buffer starting at `start`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseRange<'a> {
    pub matches: &'a MatchTable,
    pub start: usize,
    pub len: usize,
    pub min_length: usize,
    pub max_offset: usize,
}

struct Best {
    size: usize,
    choice: Choice,
}

/// Parse without statistics.
pub(crate) fn parse_initial(range: ParseRange<'_>) -> Vec<Choice> {
    let n = range.len;
    let mut choices = vec![Choice::default(); n];
    let mut bits = vec![0usize; n + 1];

    for i in (0..n).rev() {
        let mut best = Best {
            size: INFINITE,
            choice: Choice::literal(),
        };
        let entries = range.matches.matches(range.start + i);
        let mut first_len = entries.first().map_or(0, |m| m.len as usize).min(n - i);
        if first_len > MAX_SEARCH_LENGTH {
            let d = entries[0].distance as usize;
            if d == 1 {
                // Long runs are always taken.
                bits[i] = bits[i + first_len] + 8;
                choices[i] = Choice {
                    len: first_len,
                    distance: 1,
                };
                continue;
            }
            if d <= range.max_offset {
                best = Best {
                    size: bits[i + first_len] + 8,
                    choice: Choice {
                        len: first_len,
                        distance: d,
                    },
                };
            }
            first_len = MAX_SEARCH_LENGTH;
        }

        for (k, m) in entries.iter().enumerate() {
            let mut len = if k == 0 { first_len } else { m.len as usize }.min(n - i);
            let d = m.distance as usize;
            let next_len = entries.get(k + 1).map_or(0, |e| e.len as usize);
            let next_len = if next_len >= range.min_length {
                next_len
            } else {
                range.min_length - 1
            };
            if len <= next_len || d > range.max_offset {
                continue;
            }
            if len >= 3 {
                let floor = next_len.max(2);
                while len > floor {
                    let size = bits[i + len] + 8;
                    if size <= best.size {
                        best = Best {
                            size,
                            choice: Choice { len, distance: d },
                        };
                    }
                    len -= 1;
                }
                if next_len >= 2 {
                    continue;
                }
                len = 2;
            }
            if len == 2 {
                if d <= OFFS2_MAX {
                    let size = bits[i + 2] + 6 + if d > 1024 { 2 } else { 0 };
                    if size <= best.size {
                        best = Best {
                            size,
                            choice: Choice { len: 2, distance: d },
                        };
                    }
                }
                if next_len >= 1 {
                    continue;
                }
            }
            if d <= OFFS1_MAX {
                let size = bits[i + 1] + 4 + 2 * ((d > 16) as usize + (d > 64) as usize);
                if size <= best.size {
                    best = Best {
                        size,
                        choice: Choice { len: 1, distance: d },
                    };
                }
            }
        }

        if best.size >= bits[i + 1] + 8 {
            let size = bits[i + 1] + 9;
            if size <= best.size {
                best = Best {
                    size,
                    choice: Choice::literal(),
                };
            }
            for k in LITERAL_RUN_MIN..=LITERAL_RUN_MAX {
                if i + k > n {
                    break;
                }
                let size = bits[i + k] + k * 8 + LITERAL_RUN_MIN;
                if size > best.size + LITERAL_RUN_MIN {
                    break;
                }
                if size <= best.size {
                    best = Best {
                        size,
                        choice: Choice { len: k, distance: 0 },
                    };
                }
            }
        }
        bits[i] = best.size;
        choices[i] = best.choice;
    }
    choices
}

/// Parse with the symbol sizes of `tables`.
///
/// Among equally sized encodings the one with the smaller sum of offsets is
/// preferred.
pub(crate) fn parse(range: ParseRange<'_>, tables: &EncodeTables) -> Vec<Choice> {
    let n = range.len;
    let mut choices = vec![Choice::default(); n];
    let mut bits = vec![0usize; n + 1];
    let mut offset_sum = vec![0usize; n + 1];
    let len1_bits = tables.length.symbol_size(0) + 1;
    let len2_bits = tables.length.symbol_size(1) + 1;
    let offs1_max = tables.offs1.symbols_encoded();
    let offs2_max = tables.offs2.symbols_encoded();

    for i in (0..n).rev() {
        let mut best = Best {
            size: INFINITE,
            choice: Choice::literal(),
        };
        let entries = range.matches.matches(range.start + i);
        let mut first_len = entries.first().map_or(0, |m| m.len as usize).min(n - i);
        if first_len > MAX_SEARCH_LENGTH {
            let d = entries[0].distance as usize;
            if d == 1 {
                bits[i] = bits[i + first_len] + tables.match_size(1, first_len);
                offset_sum[i] = offset_sum[i + first_len] + 1;
                choices[i] = Choice {
                    len: first_len,
                    distance: 1,
                };
                continue;
            }
            if d <= range.max_offset {
                best = Best {
                    size: tables.match_size(d, first_len) + bits[i + first_len],
                    choice: Choice {
                        len: first_len,
                        distance: d,
                    },
                };
            }
            first_len = MAX_SEARCH_LENGTH;
        }

        // Accept `size` for `choice` unless it is larger, or equal with a
        // larger offset sum.
        let consider = |best: &mut Best, size: usize, choice: Choice| {
            if size > best.size {
                return;
            }
            if size == best.size
                && offset_sum[i + choice.len] + choice.distance
                    > offset_sum[i + best.choice.len] + best.choice.distance
            {
                return;
            }
            *best = Best { size, choice };
        };

        for (k, m) in entries.iter().enumerate() {
            let mut len = if k == 0 { first_len } else { m.len as usize }.min(n - i);
            let d = m.distance as usize;
            if d > range.max_offset {
                continue;
            }
            if len >= 3 {
                let offset_bits = tables.offs3.symbol_size(d - 1) + 1;
                while len >= 3 {
                    let size = tables.length.symbol_size(len - 1) + offset_bits + bits[i + len];
                    consider(&mut best, size, Choice { len, distance: d });
                    len -= 1;
                }
            }
            if len == 2 && range.min_length <= 2 && d <= offs2_max {
                let size = len2_bits + tables.offs2.symbol_size(d - 1) + bits[i + 2];
                consider(&mut best, size, Choice { len: 2, distance: d });
            }
            if range.min_length <= 1 && d <= offs1_max {
                let size = len1_bits + tables.offs1.symbol_size(d - 1) + bits[i + 1];
                consider(&mut best, size, Choice { len: 1, distance: d });
            }
        }

        if best.size >= bits[i + 1] + 8 {
            let size = bits[i + 1] + 9;
            if size < best.size
                || (size == best.size
                    && offset_sum[i + 1] <= offset_sum[i + best.choice.len] + best.choice.distance)
            {
                best = Best {
                    size,
                    choice: Choice::literal(),
                };
            }
            if i + LITERAL_RUN_MIN <= n && bits[i + LITERAL_RUN_MIN] + LITERAL_RUN_MIN * 8 <= best.size {
                for k in LITERAL_RUN_MIN..=LITERAL_RUN_MAX {
                    if i + k > n {
                        break;
                    }
                    let size = bits[i + k] + k * 8 + LITERAL_RUN_MIN;
                    if size > best.size {
                        if size > best.size + LITERAL_RUN_MIN {
                            break;
                        }
                        continue;
                    }
                    if size == best.size
                        && offset_sum[i + k] > offset_sum[i + best.choice.len] + best.choice.distance
                    {
                        continue;
                    }
                    best = Best {
                        size,
                        choice: Choice { len: k, distance: 0 },
                    };
                }
            }
        }
        bits[i] = best.size;
        offset_sum[i] = offset_sum[i + best.choice.len] + best.choice.distance;
        choices[i] = best.choice;
    }
    choices
}

/// Iterate over the decisions actually used, in stream order.
pub(crate) fn walk(choices: &[Choice]) -> impl Iterator<Item = (usize, Choice)> + '_ {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let choice = *choices.get(pos)?;
        let at = pos;
        pos += choice.len.max(1);
        Some((at, choice))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use epcompress_core::search::SearchLimits;
    use epcompress_core::traits::FormatDescriptor;

    fn range<'a>(table: &'a MatchTable, min_length: usize) -> ParseRange<'a> {
        ParseRange {
            matches: table,
            start: 0,
            len: table.len(),
            min_length,
            max_offset: 65_535,
        }
    }

    fn check_cover(data: &[u8], choices: &[Choice]) {
        let mut covered = 0;
        for (pos, choice) in walk(choices) {
            assert_eq!(pos, covered);
            assert!(choice.len >= 1);
            if choice.is_match() {
                for k in 0..choice.len {
                    assert_eq!(data[pos + k], data[pos + k - choice.distance]);
                }
            }
            covered += choice.len;
        }
        assert_eq!(covered, data.len());
    }

    #[test]
    fn test_initial_parse_covers_block() {
        let mut data: Vec<u8> = (0..600u32).map(|i| (i * 7 % 13) as u8).collect();
        data.extend_from_slice(&[9; 2000]);
        data.extend_from_slice(b"some literal text that does not repeat, quickly");
        let table = MatchTable::build(&data, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        let choices = parse_initial(range(&table, 1));
        check_cover(&data, &choices);
        // The long run is one match.
        assert!(walk(&choices).any(|(_, c)| c.distance == 1 && c.len > MAX_SEARCH_LENGTH));
    }

    #[test]
    fn test_literal_runs_for_incompressible_data() {
        let mut seed = 1u32;
        let data: Vec<u8> = (0..400)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            })
            .collect();
        let table = MatchTable::build(&data, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        let choices = parse_initial(range(&table, 3));
        check_cover(&data, &choices);
        assert!(walk(&choices).any(|(_, c)| !c.is_match() && c.len >= LITERAL_RUN_MIN));
    }

    #[test]
    fn test_repeat_taken_as_one_match() {
        // No byte pair occurs twice in the first 1000 bytes.
        let mut data: Vec<u8> = [1u32, 3, 5, 7]
            .iter()
            .flat_map(|&step| (0..256u32).map(move |j| (j * step) as u8))
            .take(1000)
            .collect();
        data.extend_from_within(0..40);
        let table = MatchTable::build(&data, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        let choices = parse_initial(range(&table, 1));
        check_cover(&data, &choices);
        assert!(walk(&choices).any(|(pos, c)| pos == 1000 && c.len == 40 && c.distance == 1000));
    }

    #[test]
    fn test_min_length_respected() {
        let data: Vec<u8> = (0..3000u32).map(|i| ((i * i) >> 3) as u8 & 0x0F).collect();
        let table = MatchTable::build(&data, SearchLimits::for_format(&FormatDescriptor::M2)).unwrap();
        for min_length in 1..=3 {
            let choices = parse_initial(range(&table, min_length));
            check_cover(&data, &choices);
            for (_, c) in walk(&choices) {
                if c.is_match() {
                    assert!(c.len >= min_length);
                }
            }
        }
    }
}
