//! Minimizer ranks over canonical windows
//!
//! A minimizer is the smallest-ranked window of width `2m` in a sequence,
//! where each window is first replaced by the lexicographically smaller of
//! itself and its reverse complement. Ranks come from a [`MinimizerHasher`],
//! either the plain lexicographic order or a frequency order learned by an
//! [`MmerCounter`] pass over the input, which gives rare windows small ranks
//! and keeps buckets balanced.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::encoding::{canonical_code, complement_code, encode_base, EncodingError};

/// Maps canonical window codes to ranks in `[0, 4^width)`
#[derive(Debug, Clone)]
pub struct MinimizerHasher {
    width: usize,
    /// `None` means identity (lexicographic ranks)
    ranks: Option<Vec<u32>>,
}

impl MinimizerHasher {
    /// Hasher ranking windows by their canonical code
    pub fn lexicographic(width: usize) -> Self {
        assert!(width > 0 && width <= 16, "window width must be in [1, 16], got {}", width);
        Self { width, ranks: None }
    }

    /// Window width (`2m`)
    pub fn width(&self) -> usize {
        self.width
    }

    /// True if ranks were learned from m-mer counts
    pub fn is_frequency_based(&self) -> bool {
        self.ranks.is_some()
    }

    /// Rank of a canonical window code
    #[inline]
    pub fn rank_of_code(&self, code: u64) -> u64 {
        match &self.ranks {
            Some(ranks) => ranks[code as usize] as u64,
            None => code,
        }
    }

    /// Minimizer rank of `seq`: the smallest rank over all its canonical windows
    ///
    /// # Errors
    /// Returns an error if `seq` is shorter than the window or holds a non-ACGT character
    pub fn rank(&self, seq: &[u8]) -> Result<u64, EncodingError> {
        let mut best = u64::MAX;
        for_each_canonical_window(seq, self.width, |code| {
            best = best.min(self.rank_of_code(code));
        })?;
        Ok(best)
    }
}

/// Call `f` with the canonical code of every window of `width` bases in `seq`
fn for_each_canonical_window<F>(seq: &[u8], width: usize, mut f: F) -> Result<(), EncodingError>
where
    F: FnMut(u64),
{
    if seq.len() < width {
        return Err(EncodingError::TooShort { expected: width, actual: seq.len() });
    }
    let mask = if width == 32 { u64::MAX } else { (1u64 << (2 * width)) - 1 };
    let top_shift = 2 * (width - 1);
    let mut fwd = 0u64;
    let mut rc = 0u64;
    for (i, &base) in seq.iter().enumerate() {
        let bits = encode_base(base).ok_or(EncodingError::InvalidBase { base, position: i })?;
        fwd = ((fwd << 2) | bits) & mask;
        rc = (rc >> 2) | (complement_code(bits) << top_shift);
        if i + 1 >= width {
            f(fwd.min(rc));
        }
    }
    Ok(())
}

/// Frequency counter for canonical windows, used to build a balanced hasher
pub struct MmerCounter {
    width: usize,
    counts: Vec<u32>,
    num_sequences: u64,
}

impl MmerCounter {
    /// Allocate a zeroed count table for windows of `width` bases
    pub fn new(width: usize) -> Self {
        assert!(width > 0 && width <= 12, "counted window width must be in [1, 12], got {}", width);
        Self {
            width,
            counts: vec![0; 1usize << (2 * width)],
            num_sequences: 0,
        }
    }

    /// Count every canonical window of `kmer`
    ///
    /// # Errors
    /// Returns an error on non-ACGT characters or a k-mer shorter than the window
    pub fn count(&mut self, kmer: &[u8]) -> Result<(), EncodingError> {
        let counts = &mut self.counts;
        for_each_canonical_window(kmer, self.width, |code| {
            let slot = &mut counts[code as usize];
            *slot = slot.saturating_add(1);
        })?;
        self.num_sequences += 1;
        Ok(())
    }

    /// Occurrences recorded for a canonical window code
    pub fn count_of(&self, code: u64) -> u32 {
        self.counts[code as usize]
    }

    /// Number of sequences fed to the counter
    pub fn num_sequences(&self) -> u64 {
        self.num_sequences
    }

    /// Build a hasher ranking canonical windows by ascending frequency.
    ///
    /// Canonical codes come first so that every rank a query can return is
    /// packed at the low end; ties are broken by code.
    pub fn into_hasher(self) -> MinimizerHasher {
        let width = self.width;
        let counts = self.counts;
        let mut order: Vec<u32> = (0..counts.len() as u32).collect();
        order.par_sort_unstable_by_key(|&code| {
            let code64 = code as u64;
            let non_canonical = canonical_code(code64, width) != code64;
            (non_canonical, counts[code as usize], code)
        });

        let mut ranks = vec![0u32; counts.len()];
        for (rank, &code) in order.iter().enumerate() {
            ranks[code as usize] = rank as u32;
        }

        let distinct = counts.iter().filter(|&&c| c > 0).count();
        info!("Built frequency minimizer order over {} windows ({} observed)", counts.len(), distinct);
        debug!("  window width = {}", width);

        MinimizerHasher { width, ranks: Some(ranks) }
    }
}
