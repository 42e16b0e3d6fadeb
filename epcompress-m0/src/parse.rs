//! Backward optimal parse with a recent-distance cache.
//!
//! Besides the total cost to the end of the block, every position carries
//! the four most recent long distances the chosen path would leave in the
//! decoder's cache, so a match reusing one of them can be priced as a
//! recent-distance symbol.

use crate::tables::{
    AlphabetCode, ClassCode, DELTA_BASE, DELTA_BITS, DISTANCE_BASE, DeltaMatches, LENGTH_SYMBOL_COUNT,
    MAX_DELTA_DISTANCE, MAX_MATCH, MIN_MATCH, RAW_LENGTH_BITS, RAW_SYMBOL_BITS, RECENT_BASE, RECENT_DISTANCES,
    SHORT_DISTANCE_MAX, SYMBOL_COUNT,
};
use epcompress_core::huffman::estimate_symbol_length;
use epcompress_core::search::MatchTable;

/// Estimated symbol sizes, refined after every round.
#[derive(Debug, Clone)]
pub(crate) struct CostModel {
    pub symbol_bits: Vec<usize>,
    pub length_bits: Vec<usize>,
}

impl CostModel {
    /// Sizes of the uncoded alphabets.
    pub fn new() -> Self {
        Self {
            symbol_bits: vec![RAW_SYMBOL_BITS as usize; SYMBOL_COUNT],
            length_bits: vec![RAW_LENGTH_BITS as usize; LENGTH_SYMBOL_COUNT],
        }
    }

    /// Take the sizes of the codes just built. Symbols without a code are
    /// priced as if they occurred once more.
    pub fn update(&mut self, symbols: &AlphabetCode, symbol_count: usize, lengths: &AlphabetCode, length_count: usize) {
        for (s, bits) in self.symbol_bits.iter_mut().enumerate() {
            *bits = match symbols.symbol_size(s) {
                0 => estimate_symbol_length(symbol_count + 1),
                n => n,
            };
        }
        for (s, bits) in self.length_bits.iter_mut().enumerate() {
            *bits = match lengths.symbol_size(s) {
                0 => estimate_symbol_length(length_count + 1),
                n => n,
            };
        }
    }

    /// Bits of a match length, extra bits included.
    pub fn length_size(&self, len: usize) -> usize {
        let class = ClassCode::of((len - MIN_MATCH) as u32);
        self.length_bits[class.code as usize] + class.extra_bits as usize
    }

    /// Bits of an explicitly coded distance, extra bits included.
    pub fn distance_size(&self, distance: usize) -> usize {
        let class = ClassCode::of((distance - 1) as u32);
        self.symbol_bits[(DISTANCE_BASE + class.code as u16) as usize] + class.extra_bits as usize
    }

    /// Bits of the symbol reusing cache entry `slot`.
    pub fn recent_size(&self, slot: usize) -> usize {
        self.symbol_bits[RECENT_BASE as usize + slot]
    }

    /// Bits of a delta match distance, delta value included.
    pub fn delta_size(&self, distance: usize) -> usize {
        self.symbol_bits[DELTA_BASE as usize + distance - 1] + DELTA_BITS as usize
    }
}

/// Decision at one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Step {
    /// Bytes covered; 1 means a literal.
    pub len: usize,
    /// Match distance.
    pub distance: usize,
    /// Delta added to the source bytes, for delta matches.
    pub delta: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    total: usize,
    recent: [usize; RECENT_DISTANCES],
}

/// A block of the searched input.
pub(crate) struct ParseRange<'a> {
    pub input: &'a [u8],
    pub matches: &'a MatchTable,
    pub deltas: &'a DeltaMatches,
    pub start: usize,
    pub len: usize,
    pub min_length: usize,
    pub max_offset: usize,
}

/// Running best candidate at one position.
struct Best {
    size: usize,
    step: Step,
}

impl Best {
    /// Take `step` if it is cheaper, or equally cheap with a smaller sum of
    /// distances along the rest of the path.
    fn consider(&mut self, size: usize, step: Step, i: usize, offset_sums: &[usize]) {
        if size > self.size {
            return;
        }
        if size == self.size
            && offset_sums[i + step.len] + step.distance > offset_sums[i + self.step.len] + self.step.distance
        {
            return;
        }
        self.size = size;
        self.step = step;
    }
}

/// Choose the cheapest literal/match sequence for the range.
pub(crate) fn parse(range: &ParseRange<'_>, costs: &CostModel) -> Vec<Step> {
    let n = range.len;
    let min_len = range.min_length.max(MIN_MATCH);
    let length_sizes: Vec<usize> = (0..=MAX_MATCH)
        .map(|len| if len >= MIN_MATCH { costs.length_size(len) } else { 0 })
        .collect();

    let mut steps = vec![Step::default(); n];
    let mut cells = vec![Cell::default(); n + 1];
    let mut offset_sums = vec![0usize; n + 1];

    for i in (0..n).rev() {
        let pos = range.start + i;
        let max_len = (n - i).min(MAX_MATCH);
        let mut best = Best {
            size: usize::MAX,
            step: Step {
                len: 1,
                distance: 0,
                delta: None,
            },
        };

        for m in range.matches.matches(pos) {
            if (m.len as usize) < min_len {
                break;
            }
            let distance = m.distance as usize;
            let offset_size = costs.distance_size(distance);
            for len in (min_len..=(m.len as usize).min(max_len)).rev() {
                let next = &cells[i + len];
                let mut size = length_sizes[len] + next.total;
                size += match next.recent.iter().position(|&d| d == distance) {
                    Some(slot) if distance > SHORT_DISTANCE_MAX => costs.recent_size(slot).min(offset_size),
                    _ => offset_size,
                };
                let step = Step {
                    len,
                    distance,
                    delta: None,
                };
                best.consider(size, step, i, &offset_sums);
            }
        }

        for distance in 1..=MAX_DELTA_DISTANCE {
            let Some(run) = range.deltas.get(pos, distance) else {
                continue;
            };
            if (run.len as usize) < min_len {
                continue;
            }
            if distance > range.max_offset {
                break;
            }
            let offset_size = costs.delta_size(distance);
            for len in (min_len..=(run.len as usize).min(max_len)).rev() {
                let size = length_sizes[len] + offset_size + cells[i + len].total;
                let step = Step {
                    len,
                    distance,
                    delta: Some(run.delta),
                };
                best.consider(size, step, i, &offset_sums);
            }
        }

        let literal = costs.symbol_bits[range.input[pos] as usize] + cells[i + 1].total;
        if literal < best.size
            || (literal == best.size && offset_sums[i + 1] <= offset_sums[i + best.step.len] + best.step.distance)
        {
            best.size = literal;
            best.step = Step {
                len: 1,
                distance: 0,
                delta: None,
            };
        }

        let Best { size, step } = best;
        let mut cell = cells[i + step.len];
        cell.total = size;
        if step.distance > SHORT_DISTANCE_MAX && !cell.recent.contains(&step.distance) {
            cell.recent.rotate_right(1);
            cell.recent[0] = step.distance;
        }
        cells[i] = cell;
        offset_sums[i] = offset_sums[i + step.len] + step.distance;
        steps[i] = step;
    }
    steps
}

/// Iterate the chosen steps from the start of the range.
pub(crate) fn walk(steps: &[Step]) -> impl Iterator<Item = (usize, Step)> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let step = *steps.get(pos)?;
        let at = pos;
        pos += step.len;
        Some((at, step))
    })
}
