//! Bookkeeping for the iterated parse/statistics loop.
//!
//! Every optimization round produces a complete candidate encoding of a
//! block. The smallest candidate wins; ties keep the earlier one. Once a
//! round reproduces a token stream seen before (same hash), further rounds
//! cannot find anything new and the loop stops early.

use crate::bitstream::Token;
use std::collections::HashSet;

/// Hash of an encoded token stream together with its size in bits.
///
/// The low 32 bits mix the packed token words, the high bits hold
/// `size_bits`.
pub fn iteration_hash<'a, I>(tokens: I, size_bits: usize) -> u64
where
    I: IntoIterator<Item = &'a Token>,
{
    let mut h: u64 = 1;
    for token in tokens {
        h ^= token.packed() as u64;
        h = (h as u32 as u64).wrapping_mul(0xC2B0_C3CC);
        h = (h ^ (h >> 32)) & 0xFFFF_FFFF;
    }
    h | ((size_bits as u64) << 32)
}

/// Tracks the best candidate and detects convergence.
#[derive(Debug)]
pub struct IterationTracker<T> {
    seen: HashSet<u64>,
    best: Option<(usize, T)>,
    converged: bool,
    rounds: usize,
}

impl<T> IterationTracker<T> {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
            best: None,
            converged: false,
            rounds: 0,
        }
    }

    /// Whether a round repeated an earlier result.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Number of candidates submitted.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Submit the result of one round.
    ///
    /// Returns `true` if the candidate became the new best.
    pub fn submit(&mut self, size_bits: usize, hash: u64, candidate: T) -> bool {
        self.rounds += 1;
        let improved = self.best.as_ref().is_none_or(|(best, _)| size_bits < *best);
        if improved {
            self.best = Some((size_bits, candidate));
        }
        if !self.seen.insert(hash) {
            self.converged = true;
        }
        improved
    }

    /// Size of the best candidate so far.
    pub fn best_size(&self) -> Option<usize> {
        self.best.as_ref().map(|(size, _)| *size)
    }

    /// Best candidate and its size.
    pub fn into_best(self) -> Option<(usize, T)> {
        self.best
    }
}

impl<T> Default for IterationTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_depends_on_tokens_and_size() {
        let a = [Token::bits(1, 1), Token::Byte(0x41)];
        let b = [Token::bits(1, 1), Token::Byte(0x42)];
        assert_eq!(iteration_hash(&a, 9), iteration_hash(&a, 9));
        assert_ne!(iteration_hash(&a, 9), iteration_hash(&b, 9));
        assert_ne!(iteration_hash(&a, 9), iteration_hash(&a, 10));
        let empty: [Token; 0] = [];
        assert_eq!(iteration_hash(&empty, 0), 1);
        assert_eq!(iteration_hash(&a, 9) >> 32, 9);
    }

    #[test]
    fn test_hash_mixing() {
        // h = 1 ^ 0x0100_0001 = 0x0100_0000, then multiply and fold.
        let product = 0x0100_0000u64 * 0xC2B0_C3CC;
        let expected = (product ^ (product >> 32)) & 0xFFFF_FFFF;
        assert_eq!(iteration_hash(&[Token::bits(1, 1)], 0), expected);
    }

    #[test]
    fn test_tracker_keeps_first_smallest() {
        let mut tracker = IterationTracker::new();
        assert!(tracker.submit(100, 1, "a"));
        assert!(!tracker.submit(100, 2, "b"));
        assert!(tracker.submit(90, 3, "c"));
        assert!(!tracker.is_converged());
        assert!(!tracker.submit(95, 2, "d"));
        assert!(tracker.is_converged());
        assert_eq!(tracker.rounds(), 4);
        assert_eq!(tracker.best_size(), Some(90));
        assert_eq!(tracker.into_best(), Some((90, "c")));
    }
}
