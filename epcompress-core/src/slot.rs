//! Slot coding of match lengths and offsets.
//!
//! A value `n` is written as a slot number (the *prefix*) followed by
//! `width(slot)` extra bits holding `n - base(slot)`. Slots cover consecutive
//! ranges of values whose sizes are powers of two, so a table is fully
//! described by its slot widths. [`SlotEncodeTable`] gathers symbol
//! statistics during a parse and then picks the widths that minimize the
//! total encoded size; [`SlotDecodeTable`] reads the widths back from a
//! stream.
//!
//! Three table shapes exist:
//!
//! - every slot has its own prefix size ([`SlotEncodeTable::with_prefix_sizes`]),
//! - one fixed prefix size for all slots ([`SlotEncodeTable::fixed`]),
//! - a range of prefix sizes, each with its own slot count; the best one is
//!   chosen on every update ([`SlotEncodeTable::prefix_range`]).

use crate::bitstream::{BitReader, Token};
use crate::error::{EpError, Result};
use log::trace;

/// Largest slot width in bits.
pub const MAX_SLOT_WIDTH: usize = 15;

/// Default cost of a symbol that no slot covers.
pub const DEFAULT_UNUSED_SYMBOL_SIZE: usize = 8192;

/// Default "not encodable" cost recorded per statistics sample.
pub const DEFAULT_UNENCODED_COST: usize = 16384;

/// A slot-coded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCode {
    /// Slot number.
    pub slot: usize,
    /// Number of extra bits.
    pub width: u8,
    /// Extra bits (value minus slot base).
    pub extra: u32,
}

impl SlotCode {
    /// Extra bits as an output token.
    pub fn extra_token(&self) -> Token {
        Token::bits(self.extra, self.width)
    }
}

/// Prefix sums of the collected statistics.
struct Histogram {
    counts: Vec<usize>,
    costs: Vec<usize>,
    used: usize,
}

/// Slot widths together with their prefix sizes and weights.
#[derive(Debug, Clone)]
struct Layout {
    prefix: Vec<usize>,
    weight: Vec<usize>,
    bits: Vec<usize>,
}

impl Layout {
    fn uniform(prefix_size: usize, slots: usize) -> Self {
        Self {
            prefix: vec![prefix_size; slots],
            weight: vec![1; slots],
            bits: vec![0; slots],
        }
    }

    fn slots(&self) -> usize {
        self.bits.len()
    }

    /// Encoded size with slots from `first_slot` on, starting at symbol
    /// `first_symbol`, plus `base`.
    fn encoded_size_from(&self, h: &Histogram, first_slot: usize, first_symbol: usize, base: usize) -> usize {
        let mut total = base;
        let mut p = first_symbol;
        for i in first_slot..self.slots() {
            let count = h.counts[p];
            p += 1 << self.bits[i];
            let size = self.prefix[i] + self.bits[i];
            if p >= h.used {
                return total + (h.counts[h.used] - count) * size;
            }
            total += (h.counts[p] - count) * size;
        }
        // Symbols past the last slot cannot be encoded.
        total + h.costs[h.used] - h.costs[p]
    }

    fn encoded_size(&self, h: &Histogram) -> usize {
        self.encoded_size_from(h, 0, 0, 0)
    }

    /// First symbol and accumulated size of the slots before `first_slot`,
    /// or `None` if those slots already cover every used symbol.
    fn leading_cost(&self, h: &Histogram, first_slot: usize) -> Option<(usize, usize)> {
        let mut first_symbol = 0usize;
        let mut base = 0usize;
        for j in 0..first_slot {
            let count = h.counts[first_symbol];
            first_symbol += 1 << self.bits[j];
            if first_symbol >= h.used {
                return None;
            }
            base += (h.counts[first_symbol] - count) * (self.prefix[j] + self.bits[j]);
        }
        Some((first_symbol, base))
    }

    /// Heuristic width search: proportional allocation followed by local
    /// improvement passes.
    fn optimize_fast(&mut self, h: &Histogram) -> Result<usize> {
        let slots = self.slots();
        let mut remaining = h.counts[h.used];
        let mut weight_sum: usize = self.weight.iter().sum();
        let mut slot_end = 0usize;
        for i in 0..slots {
            let slot_begin = slot_end;
            if remaining < 1 {
                self.bits[i] = 0;
                continue;
            }
            if i + 1 < slots {
                let mut best_width = 0;
                let mut best_diff = i64::MAX;
                for j in 0..=MAX_SLOT_WIDTH {
                    let end = (slot_begin + (1 << j)).min(h.used);
                    if i + 2 >= slots && end + 32768 < h.used {
                        continue;
                    }
                    let share = ((h.counts[end] - h.counts[slot_begin]) as u64 * 0x0100_0000 / remaining as u64) as i64;
                    let target = (self.weight[i] as u64 * 0x0100_0000 / weight_sum as u64) as i64;
                    let d = (share - target).abs();
                    if d < best_diff || (share == 0 && d == best_diff) {
                        best_width = j;
                        best_diff = d;
                    }
                }
                self.bits[i] = best_width;
            } else {
                // The last slot must cover everything that is left.
                let mut j = 0;
                loop {
                    let end = (slot_begin + (1 << j)).min(h.used);
                    if h.counts[end] - h.counts[slot_begin] >= remaining {
                        self.bits[i] = j;
                        break;
                    }
                    if j >= MAX_SLOT_WIDTH {
                        return Err(EpError::internal("slot table cannot cover all symbols"));
                    }
                    j += 1;
                }
            }
            slot_end = (slot_begin + (1 << self.bits[i])).min(h.used);
            remaining -= h.counts[slot_end] - h.counts[slot_begin];
            weight_sum -= self.weight[i];
        }

        let mut best_size = self.encoded_size(h);
        for round in 0..4 {
            let grow = round & 1 == 0;
            loop {
                let mut best_slot = None;
                for i in 0..slots {
                    if (grow && self.bits[i] >= MAX_SLOT_WIDTH) || (!grow && self.bits[i] < 1) {
                        continue;
                    }
                    let saved = self.bits[i];
                    self.bits[i] = if grow { saved + 1 } else { saved - 1 };
                    let size = self.encoded_size(h);
                    self.bits[i] = saved;
                    if size < best_size {
                        best_size = size;
                        best_slot = Some(i);
                    }
                }
                match best_slot {
                    Some(i) if grow => self.bits[i] += 1,
                    Some(i) => self.bits[i] -= 1,
                    None => break,
                }
            }
        }

        let mut best = self.bits.clone();
        loop {
            let mut done = true;

            // Pairwise exchanges.
            for i in 0..slots.saturating_sub(1) {
                let Some((first_symbol, base)) = self.leading_cost(h, i) else {
                    continue;
                };
                for j in i + 1..slots {
                    if best[i] == best[j] {
                        continue;
                    }
                    self.bits[i] = best[j];
                    self.bits[j] = best[i];
                    let size = self.encoded_size_from(h, i, first_symbol, base);
                    if size < best_size {
                        best_size = size;
                        done = false;
                        best[i] = self.bits[i];
                        best[j] = self.bits[j];
                    } else {
                        self.bits[i] = best[i];
                        self.bits[j] = best[j];
                    }
                }
            }

            // Joint +-1 changes of three neighbouring slots.
            for i in (0..slots).rev() {
                let first_slot = i.saturating_sub(2);
                let Some((first_symbol, base)) = self.leading_cost(h, first_slot) else {
                    continue;
                };
                let mut best_delta = [0i32; 3];
                let range = |n: usize| if i >= n { -1i32 } else { 1 };
                for d2 in range(2)..=1 {
                    if i >= 2 {
                        let Some(w) = shifted(best[i - 2], d2) else { continue };
                        self.bits[i - 2] = w;
                    }
                    for d1 in range(1)..=1 {
                        if i >= 1 {
                            let Some(w) = shifted(best[i - 1], d1) else { continue };
                            self.bits[i - 1] = w;
                        }
                        for d0 in -1..=1 {
                            let Some(w) = shifted(best[i], d0) else { continue };
                            self.bits[i] = w;
                            let size = self.encoded_size_from(h, first_slot, first_symbol, base);
                            if size < best_size {
                                best_size = size;
                                done = false;
                                best_delta = [d0, d1, d2];
                            }
                        }
                    }
                }
                for (k, delta) in best_delta.iter().enumerate() {
                    if i >= k {
                        let w = shifted(best[i - k], *delta).unwrap_or(best[i - k]);
                        self.bits[i - k] = w;
                        best[i - k] = w;
                    }
                }
            }

            if done {
                break;
            }
        }

        for i in (0..slots).rev() {
            while self.bits[i] >= 1 {
                self.bits[i] -= 1;
                let size = self.encoded_size(h);
                if size > best_size {
                    self.bits[i] += 1;
                    break;
                }
                best_size = size;
            }
        }
        Ok(best_size)
    }

    /// Exact width search by dynamic programming over (slot, first symbol).
    fn optimize_exact(&mut self, h: &Histogram) -> usize {
        self.bits.iter_mut().for_each(|b| *b = 0);
        let used = h.used;
        if used < 1 {
            return 0;
        }
        let slots = self.slots();
        let mut choice = vec![0u8; slots * used];
        // Cost of encoding symbols i.. with the slots not yet assigned.
        let mut cost: Vec<usize> = (0..=used).map(|i| h.costs[used] - h.costs[i]).collect();

        // Widths below this only split runs of unused symbols.
        let min_width: Vec<usize> = (0..used)
            .map(|i| {
                let mut j = 0;
                let mut next_end = i + 2;
                while j < MAX_SLOT_WIDTH && next_end < used && h.counts[next_end] == h.counts[i] {
                    next_end = next_end * 2 - i;
                    j += 1;
                }
                j
            })
            .collect();

        for slot in (0..slots.min(used)).rev() {
            let end = if slot > 0 { used } else { 1 };
            for i in slot..end {
                // Reachable from 0 only through `slot` power-of-two steps.
                if i.count_ones() as usize > slot {
                    continue;
                }
                let max_width = ceil_log2(used - i).min(MAX_SLOT_WIDTH);
                let base_count = h.counts[i];
                let mut best_size = usize::MAX;
                let mut best_width = 0;
                for width in min_width[i].min(max_width)..=max_width {
                    let slot_end = (i + (1 << width)).min(used);
                    let size = (h.counts[slot_end] - base_count) * (self.prefix[slot] + width) + cost[slot_end];
                    if size < best_size {
                        best_size = size;
                        best_width = width;
                    }
                }
                choice[slot * used + i] = best_width as u8;
                cost[i] = best_size;
            }
        }

        let mut begin = 0usize;
        for i in 0..slots {
            self.bits[i] = choice[i * used + begin] as usize;
            begin += 1 << self.bits[i];
            if begin >= used {
                break;
            }
        }
        let best_size = cost[0];
        for i in (0..slots).rev() {
            while self.bits[i] >= 1 {
                self.bits[i] -= 1;
                if self.encoded_size(h) != best_size {
                    self.bits[i] += 1;
                    break;
                }
            }
        }
        best_size
    }
}

fn shifted(width: usize, delta: i32) -> Option<usize> {
    let w = width as i32 + delta;
    (0..=MAX_SLOT_WIDTH as i32).contains(&w).then_some(w as usize)
}

fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Adaptive slot encoding table.
#[derive(Debug, Clone)]
pub struct SlotEncodeTable {
    n_symbols: usize,
    n_used: usize,
    n_encoded: usize,
    unused_symbol_size: usize,
    /// Smallest prefix size and slot count per prefix size, in range mode.
    prefix_range: Option<(usize, Vec<usize>)>,
    prefix_size: usize,
    prefix_only: usize,
    layout: Layout,
    slot_base: Vec<usize>,
    counts: Vec<u32>,
    costs: Vec<u32>,
    symbol_slot: Vec<u16>,
    symbol_size: Vec<u16>,
}

impl SlotEncodeTable {
    fn with_layout(n_symbols: usize, layout: Layout) -> Result<Self> {
        if n_symbols < 1 {
            return Err(EpError::internal("slot table without symbols"));
        }
        if layout.slots() < 1 {
            return Err(EpError::internal("slot table without slots"));
        }
        let slots = layout.slots();
        Ok(Self {
            n_symbols,
            n_used: 0,
            n_encoded: 0,
            unused_symbol_size: DEFAULT_UNUSED_SYMBOL_SIZE,
            prefix_range: None,
            prefix_size: 0,
            prefix_only: 0,
            layout,
            slot_base: vec![0; slots],
            counts: vec![0; n_symbols + 1],
            costs: vec![0; n_symbols + 1],
            symbol_slot: vec![0; n_symbols],
            symbol_size: vec![1; n_symbols],
        })
    }

    /// Table where slot `i` has a prefix of `prefix_sizes[i]` bits.
    pub fn with_prefix_sizes(n_symbols: usize, prefix_sizes: &[usize]) -> Result<Self> {
        let max_prefix = prefix_sizes.iter().copied().max().unwrap_or(0);
        let layout = Layout {
            prefix: prefix_sizes.to_vec(),
            weight: prefix_sizes.iter().map(|&p| 1 << (max_prefix - p)).collect(),
            bits: vec![0; prefix_sizes.len()],
        };
        Self::with_layout(n_symbols, layout)
    }

    /// Table with `slots` slots and a fixed `prefix_size` bit prefix.
    pub fn fixed(n_symbols: usize, prefix_size: usize, slots: usize) -> Result<Self> {
        if prefix_size < 1 || slots > 1 << prefix_size {
            return Err(EpError::internal("slot count does not fit the prefix size"));
        }
        let mut table = Self::with_layout(n_symbols, Layout::uniform(prefix_size, slots))?;
        table.prefix_size = prefix_size;
        Ok(table)
    }

    /// Table choosing its prefix size from `min_prefix ..`, one entry of
    /// `slot_counts` per candidate size.
    pub fn prefix_range(n_symbols: usize, min_prefix: usize, slot_counts: &[usize]) -> Result<Self> {
        let Some(&first) = slot_counts.first() else {
            return Err(EpError::internal("empty prefix size range"));
        };
        let mut table = Self::with_layout(n_symbols, Layout::uniform(min_prefix, first))?;
        table.prefix_size = min_prefix;
        table.prefix_range = Some((min_prefix, slot_counts.to_vec()));
        Ok(table)
    }

    /// Record one occurrence of `n`; `unencoded_cost` is charged if no slot
    /// ends up covering it.
    #[inline]
    pub fn add_symbol(&mut self, n: usize, unencoded_cost: usize) {
        self.counts[n] += 1;
        self.costs[n] += unencoded_cost as u32;
        if n >= self.n_used {
            self.n_used = n + 1;
        }
    }

    /// Record a symbol that only pays for the prefix.
    pub fn add_prefix_only_symbol(&mut self) {
        self.prefix_only += 1;
    }

    /// Cost reported for symbols outside the encodable range.
    pub fn set_unused_symbol_size(&mut self, size: usize) {
        self.unused_symbol_size = size;
    }

    /// Number of encodable symbols (`0..symbols_encoded()`).
    pub fn symbols_encoded(&self) -> usize {
        self.n_encoded
    }

    /// Size of symbol `n` in bits, prefix included.
    #[inline]
    pub fn symbol_size(&self, n: usize) -> usize {
        if n >= self.n_encoded {
            return self.unused_symbol_size;
        }
        self.symbol_size[n] as usize
    }

    /// Slot code of symbol `n`.
    pub fn encode(&self, n: usize) -> Result<SlotCode> {
        if n >= self.n_encoded {
            return Err(EpError::internal(format!("encoding symbol {n} outside the slot table")));
        }
        let slot = self.symbol_slot[n] as usize;
        Ok(SlotCode {
            slot,
            width: self.layout.bits[slot] as u8,
            extra: (n - self.slot_base[slot]) as u32,
        })
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.layout.slots()
    }

    /// Prefix size of slot `n`.
    pub fn slot_prefix_size(&self, n: usize) -> usize {
        self.layout.prefix[n]
    }

    /// Width of slot `n`.
    pub fn slot_width(&self, n: usize) -> usize {
        self.layout.bits[n]
    }

    /// Current uniform prefix size (0 for per-slot prefix tables).
    pub fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    fn set_prefix_size(&mut self, prefix_size: usize) -> Result<()> {
        let Some((min_prefix, counts)) = &self.prefix_range else {
            return Err(EpError::internal("prefix size is fixed"));
        };
        let slots = prefix_size
            .checked_sub(*min_prefix)
            .and_then(|i| counts.get(i))
            .copied()
            .ok_or_else(|| EpError::internal("prefix size is out of range"))?;
        self.layout = Layout::uniform(prefix_size, slots);
        self.slot_base = vec![0; slots];
        self.prefix_size = prefix_size;
        Ok(())
    }

    /// Choose new slot widths from the collected statistics, then reset
    /// the statistics. Returns the estimated encoded size in bits.
    pub fn update_tables(&mut self, fast: bool) -> Result<usize> {
        let result = self.rebuild(fast);
        if result.is_err() {
            self.clear();
        }
        result
    }

    fn rebuild(&mut self, fast: bool) -> Result<usize> {
        let used = self.n_used;
        let mut counts = Vec::with_capacity(used + 1);
        let mut costs = Vec::with_capacity(used + 1);
        let (mut count_sum, mut cost_sum) = (0usize, 0usize);
        for i in 0..used {
            counts.push(count_sum);
            costs.push(cost_sum);
            count_sum += self.counts[i] as usize;
            cost_sum += self.costs[i] as usize;
        }
        counts.push(count_sum);
        costs.push(cost_sum);
        let histogram = Histogram { counts, costs, used };

        let candidates: Vec<usize> = match &self.prefix_range {
            Some((min_prefix, slot_counts)) => (*min_prefix..min_prefix + slot_counts.len()).collect(),
            None => vec![self.prefix_size],
        };
        let mut best: Option<(usize, usize, Layout)> = None;
        for &prefix_size in &candidates {
            if self.prefix_range.is_some() {
                self.set_prefix_size(prefix_size)?;
            }
            let mut size = if fast {
                self.layout.optimize_fast(&histogram)?
            } else {
                self.layout.optimize_exact(&histogram)
            };
            if self.prefix_range.is_some() {
                size += self.layout.slots() * 4 + self.prefix_only * prefix_size;
            }
            if best.as_ref().is_none_or(|(s, _, _)| size < *s) {
                best = Some((size, prefix_size, self.layout.clone()));
            }
        }
        let (best_size, prefix_size, layout) =
            best.ok_or_else(|| EpError::internal("no slot table candidate"))?;
        if self.prefix_range.is_some() {
            self.prefix_size = prefix_size;
            self.slot_base = vec![0; layout.slots()];
        }
        self.layout = layout;
        trace!(
            "slot table: prefix {}, widths {:?}, {} bits",
            self.prefix_size, self.layout.bits, best_size
        );

        let mut base = 0usize;
        for i in 0..self.layout.slots() {
            self.slot_base[i] = base;
            let prev = base;
            base = (prev + (1 << self.layout.bits[i])).min(self.n_symbols);
            let size = (self.layout.prefix[i] + self.layout.bits[i]) as u16;
            for j in prev..base {
                self.symbol_slot[j] = i as u16;
                self.symbol_size[j] = size;
            }
        }
        self.counts[..=used].iter_mut().for_each(|c| *c = 0);
        self.costs[..=used].iter_mut().for_each(|c| *c = 0);
        self.n_used = 0;
        self.n_encoded = base;
        self.prefix_only = 0;
        Ok(best_size)
    }

    /// Forget statistics and encodable symbols.
    pub fn clear(&mut self) {
        self.layout.bits.iter_mut().for_each(|b| *b = 0);
        self.slot_base.iter_mut().for_each(|b| *b = 0);
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.costs.iter_mut().for_each(|c| *c = 0);
        self.symbol_slot.iter_mut().for_each(|s| *s = 0);
        self.symbol_size.iter_mut().for_each(|s| *s = 1);
        self.n_used = 0;
        self.n_encoded = 0;
        self.prefix_only = 0;
    }
}

/// Slot table read from a stream.
#[derive(Debug, Clone, Default)]
pub struct SlotDecodeTable {
    widths: Vec<u8>,
    bases: Vec<u32>,
}

impl SlotDecodeTable {
    /// Build from slot widths.
    pub fn from_widths(widths: &[u8]) -> Self {
        let mut bases = Vec::with_capacity(widths.len());
        let mut base = 0u32;
        for &w in widths {
            bases.push(base);
            base += 1 << w;
        }
        Self {
            widths: widths.to_vec(),
            bases,
        }
    }

    /// Read `slots` 4-bit widths.
    pub fn read(reader: &mut BitReader<'_>, slots: usize) -> Result<Self> {
        let mut widths = Vec::with_capacity(slots);
        for _ in 0..slots {
            widths.push(reader.read_bits(4)? as u8);
        }
        Ok(Self::from_widths(&widths))
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.widths.len()
    }

    /// Decode the value in `slot`, reading its extra bits.
    #[inline]
    pub fn decode(&self, slot: usize, reader: &mut BitReader<'_>) -> Result<u32> {
        let width = *self
            .widths
            .get(slot)
            .ok_or_else(|| EpError::invalid_table(format!("slot {slot} out of range")))?;
        Ok(self.bases[slot] + reader.read_bits(width)?)
    }
}
