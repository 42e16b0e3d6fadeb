//! Block split planning.
//!
//! Large inputs are first cut into many small blocks, each compressed with
//! its own statistics. Adjacent blocks are then merged again as long as the
//! merged block does not cost more bits than the two halves. Two strategies
//! exist: merging the best pair per round (re-evaluating with cached block
//! sizes), and a cheaper sequential sweep that merges neighbours from left
//! to right until a sweep makes no change.

use crate::error::Result;
use crate::traits::CompressStatus;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Largest block a stream header can describe.
pub const MAX_BLOCK_SIZE: usize = 65_536;

/// A contiguous input range compressed as one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSpan {
    /// Offset of the first byte.
    pub start: usize,
    /// Number of bytes.
    pub len: usize,
}

impl BlockSpan {
    /// Create a span.
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Span covering `self` and the following `next`.
    pub fn join(&self, next: &BlockSpan) -> BlockSpan {
        BlockSpan::new(self.start, self.len + next.len)
    }

    fn cache_key(&self) -> u64 {
        ((self.start as u64) << 32) | self.end() as u64
    }
}

/// Split `total` bytes into `count` blocks whose sizes differ by at most one.
pub fn split_evenly(total: usize, count: usize) -> Vec<BlockSpan> {
    let count = count.clamp(1, total.max(1));
    let mut blocks = Vec::with_capacity(count);
    let (mut start, mut carry) = (0usize, 0usize);
    while start < total {
        carry += total;
        let len = carry / count;
        carry %= count;
        blocks.push(BlockSpan::new(start, len));
        start += len;
    }
    blocks
}

/// Split `total` bytes into blocks of `block_size` bytes (the last one may
/// be shorter).
pub fn split_fixed(total: usize, block_size: usize) -> Vec<BlockSpan> {
    let block_size = block_size.max(1);
    (0..total)
        .step_by(block_size)
        .map(|start| BlockSpan::new(start, block_size.min(total - start)))
        .collect()
}

/// Best-pair merging with memoized block sizes.
#[derive(Debug, Default)]
pub struct PairMerger {
    cache: HashMap<u64, usize>,
}

impl PairMerger {
    /// Create a merger with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct spans measured.
    pub fn evaluations(&self) -> usize {
        self.cache.len()
    }

    fn size_of<F>(&mut self, span: BlockSpan, measure: &mut F) -> Result<Option<usize>>
    where
        F: FnMut(BlockSpan) -> Result<Option<usize>>,
    {
        if let Some(&bits) = self.cache.get(&span.cache_key()) {
            return Ok(Some(bits));
        }
        let Some(bits) = measure(span)? else {
            return Ok(None);
        };
        self.cache.insert(span.cache_key(), bits);
        Ok(Some(bits))
    }

    /// Repeatedly merge the adjacent pair that saves the most bits.
    ///
    /// `measure` returns the compressed size of a span in bits, or `None` if
    /// compression was cancelled. Pairs that would exceed
    /// [`MAX_BLOCK_SIZE`] are never merged; merging stops when every
    /// remaining merge would grow the output.
    pub fn merge<F>(&mut self, blocks: &mut Vec<BlockSpan>, mut measure: F) -> Result<CompressStatus>
    where
        F: FnMut(BlockSpan) -> Result<Option<usize>>,
    {
        loop {
            let mut best: Option<(usize, i64)> = None;
            for i in 1..blocks.len() {
                let (first, second) = (blocks[i - 1], blocks[i]);
                if first.len + second.len > MAX_BLOCK_SIZE {
                    continue;
                }
                let mut sizes = [0usize; 3];
                for (size, span) in sizes.iter_mut().zip([first.join(&second), first, second]) {
                    match self.size_of(span, &mut measure)? {
                        Some(bits) => *size = bits,
                        None => return Ok(CompressStatus::Cancelled),
                    }
                }
                let diff = sizes[0] as i64 - (sizes[1] + sizes[2]) as i64;
                if best.is_none_or(|(_, d)| diff < d) {
                    best = Some((i, diff));
                }
            }
            match best {
                Some((i, diff)) if diff <= 0 => {
                    debug!(
                        "merging blocks at {} and {} ({} bits)",
                        blocks[i - 1].start, blocks[i].start, diff
                    );
                    blocks[i - 1] = blocks[i - 1].join(&blocks[i]);
                    blocks.remove(i);
                }
                _ => return Ok(CompressStatus::Done),
            }
        }
    }
}

/// A block compressed during sequential merging.
#[derive(Debug, Clone)]
pub struct SizedBlock<T> {
    /// Input range.
    pub span: BlockSpan,
    /// Whether the block closes the stream.
    pub is_last: bool,
    /// Compressed size in bits.
    pub bits: usize,
    /// Compressed form.
    pub data: T,
}

/// Merge neighbours left to right while the merged block is not larger than
/// the pair.
///
/// `compress` is called with the merged span and its last-block flag and
/// returns the compressed size in bits together with the compressed form,
/// or `None` on cancellation. Rejected pairs are remembered and not tried
/// again.
pub fn merge_sequential<T, F>(blocks: &mut Vec<SizedBlock<T>>, mut compress: F) -> Result<CompressStatus>
where
    F: FnMut(BlockSpan, bool) -> Result<Option<(usize, T)>>,
{
    let mut rejected: HashSet<(BlockSpan, BlockSpan)> = HashSet::new();
    loop {
        let mut merged_any = false;
        let mut i = 0;
        while i + 1 < blocks.len() {
            let (first, second) = (blocks[i].span, blocks[i + 1].span);
            if rejected.contains(&(first, second)) || first.len + second.len > MAX_BLOCK_SIZE {
                i += 1;
                continue;
            }
            let is_last = blocks[i + 1].is_last;
            let Some((bits, data)) = compress(first.join(&second), is_last)? else {
                return Ok(CompressStatus::Cancelled);
            };
            if bits <= blocks[i].bits + blocks[i + 1].bits {
                debug!("merged blocks at {} and {}: {} bits", first.start, second.start, bits);
                blocks[i] = SizedBlock {
                    span: first.join(&second),
                    is_last,
                    bits,
                    data,
                };
                blocks.remove(i + 1);
                merged_any = true;
            } else {
                rejected.insert((first, second));
            }
            // The merged block is paired with its neighbour in the next sweep.
            i += 1;
        }
        if !merged_any {
            return Ok(CompressStatus::Done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_evenly() {
        let blocks = split_evenly(10, 4);
        let lens: Vec<usize> = blocks.iter().map(|b| b.len).collect();
        assert_eq!(lens, vec![2, 3, 2, 3]);
        assert_eq!(blocks.last().map(BlockSpan::end), Some(10));
        assert_eq!(split_evenly(3, 8).len(), 3);
        assert_eq!(split_evenly(100, 1), vec![BlockSpan::new(0, 100)]);
        assert!(split_evenly(0, 4).is_empty());
    }

    #[test]
    fn test_split_fixed() {
        let blocks = split_fixed(100, 30);
        assert_eq!(
            blocks,
            vec![
                BlockSpan::new(0, 30),
                BlockSpan::new(30, 30),
                BlockSpan::new(60, 30),
                BlockSpan::new(90, 10)
            ]
        );
    }

    #[test]
    fn test_pair_merge_uses_cache() {
        // Cost model: every block has a 100-bit header plus 1 bit per byte,
        // except that spans crossing offset 400 cost an extra 500 bits.
        let mut blocks = split_evenly(800, 8);
        let mut calls = 0usize;
        let mut merger = PairMerger::new();
        let status = merger
            .merge(&mut blocks, |span| {
                calls += 1;
                let penalty = if span.start < 400 && span.end() > 400 { 500 } else { 0 };
                Ok(Some(100 + span.len + penalty))
            })
            .unwrap();
        assert_eq!(status, CompressStatus::Done);
        assert_eq!(blocks, vec![BlockSpan::new(0, 400), BlockSpan::new(400, 400)]);
        assert_eq!(calls, merger.evaluations());
    }

    #[test]
    fn test_pair_merge_cancel() {
        let mut blocks = split_evenly(100, 4);
        let status = PairMerger::new().merge(&mut blocks, |_| Ok(None)).unwrap();
        assert_eq!(status, CompressStatus::Cancelled);
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn test_sequential_merge() {
        let mut blocks: Vec<SizedBlock<()>> = split_evenly(400, 4)
            .into_iter()
            .map(|span| SizedBlock {
                span,
                is_last: span.end() == 400,
                bits: 100 + span.len,
                data: (),
            })
            .collect();
        let status = merge_sequential(&mut blocks, |span, _| Ok(Some((100 + span.len, ())))).unwrap();
        assert_eq!(status, CompressStatus::Done);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].span, BlockSpan::new(0, 400));
        assert!(blocks[0].is_last);
    }

    #[test]
    fn test_sequential_merge_respects_size_limit() {
        let mut blocks: Vec<SizedBlock<()>> = split_evenly(3 * MAX_BLOCK_SIZE / 2, 2)
            .into_iter()
            .map(|span| SizedBlock {
                span,
                is_last: false,
                bits: 1,
                data: (),
            })
            .collect();
        let status = merge_sequential(&mut blocks, |_, _| Ok(Some((0, ())))).unwrap();
        assert_eq!(status, CompressStatus::Done);
        assert_eq!(blocks.len(), 2);
    }
}
