//! Initial partitioning of k-mers into superbuckets
//!
//! Each input line starts with a k-mer followed by a space and anything else
//! (typically an abundance), which is ignored. Scanning stops at the first
//! line whose leading token is shorter than `k`.
//!
//! For every k-mer three ranks are computed: over the interior `[1, k-1)`,
//! the leftmost window and the rightmost window. The left boundary rank is
//! `min(leftmost, interior)`, the right one `min(rightmost, interior)`, which
//! are exactly the minimizers of the two (k-1)-mers. The smaller of the two
//! selects the superbucket.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use super::config::BuildConfiguration;
use super::record::{pending_record, BucketName};
use crate::error::Result;
use crate::minimizer::{MinimizerHasher, MmerCounter};
use crate::store::{RecordStore, StreamWriter};

/// Counters gathered by a partitioning pass
#[derive(Debug, Clone, Default)]
pub struct PartitionStats {
    /// Number of k-mers accepted from the input
    pub num_kmers: u64,
    /// Number of k-mers sent to each superbucket
    pub superbucket_sizes: Vec<u64>,
}

impl PartitionStats {
    /// Number of superbuckets that received at least one k-mer
    pub fn num_nonempty(&self) -> usize {
        self.superbucket_sizes.iter().filter(|&&n| n > 0).count()
    }

    /// Size of the fullest superbucket
    pub fn max_superbucket(&self) -> u64 {
        self.superbucket_sizes.iter().copied().max().unwrap_or(0)
    }
}

/// Call `f` with every lower-cased k-mer token of the input file
pub fn for_each_kmer<F>(input: &Path, k: usize, mut f: F) -> Result<u64>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let file = File::open(input)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut line = Vec::new();
    let mut num_kmers = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        let end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        let token = &mut line[..end];
        if token.len() < k {
            break;
        }
        token.make_ascii_lowercase();
        f(token)?;
        num_kmers += 1;
    }

    Ok(num_kmers)
}

/// Statistics-only pass feeding every k-mer to the m-mer counter
pub fn count_mmers(input: &Path, k: usize, counter: &mut MmerCounter) -> Result<u64> {
    let num_kmers = for_each_kmer(input, k, |kmer| Ok(counter.count(kmer)?))?;
    info!("Counted m-mers of {} k-mers", num_kmers);
    Ok(num_kmers)
}

/// Left and right boundary minimizer ranks of a k-mer
pub fn boundary_minimizers(kmer: &[u8], k: usize, hasher: &MinimizerHasher) -> Result<(u64, u64)> {
    let width = hasher.width();
    let middle = hasher.rank(&kmer[1..k - 1])?;
    let leftmost = hasher.rank(&kmer[..width])?;
    let rightmost = hasher.rank(&kmer[kmer.len() - width..])?;
    Ok((leftmost.min(middle), rightmost.min(middle)))
}

/// Routes input k-mers to superbucket streams
pub struct Partitioner<'a> {
    config: &'a BuildConfiguration,
    hasher: &'a MinimizerHasher,
}

impl<'a> Partitioner<'a> {
    /// Create a partitioner using `hasher` for minimizer ranks
    pub fn new(config: &'a BuildConfiguration, hasher: &'a MinimizerHasher) -> Self {
        Self { config, hasher }
    }

    /// Partition the k-mers of `input`.
    ///
    /// With `create_buckets`, every k-mer is appended to its superbucket
    /// stream as a pending record; all `4^m` superbucket streams exist
    /// afterwards, possibly empty. Without it, records are only logged at
    /// debug level and counted.
    pub fn partition<S: RecordStore>(
        &self,
        input: &Path,
        store: &mut S,
        create_buckets: bool,
    ) -> Result<PartitionStats> {
        let k = self.config.k;
        let num_superbuckets = self.config.num_superbuckets();
        let mut sizes = vec![0u64; num_superbuckets as usize];

        let mut writers: Vec<StreamWriter> = Vec::new();
        if create_buckets {
            for index in 0..num_superbuckets {
                writers.push(store.open_append(&BucketName::Superbucket(index).to_string())?);
            }
        }

        let num_kmers = for_each_kmer(input, k, |kmer| {
            let (leftmin, rightmin) = boundary_minimizers(kmer, k, self.hasher)?;
            let superbucket = leftmin.min(rightmin) / num_superbuckets;
            let record = pending_record(kmer, leftmin, rightmin)?;
            sizes[superbucket as usize] += 1;
            if create_buckets {
                writers[superbucket as usize].write(store, &record)?;
            } else {
                debug!("{}:{}", superbucket, String::from_utf8_lossy(&record));
            }
            Ok(())
        })?;

        let stats = PartitionStats { num_kmers, superbucket_sizes: sizes };
        if create_buckets {
            info!(
                "Initial partitioning done: {} k-mers in {} non-empty superbuckets (largest {})",
                stats.num_kmers,
                stats.num_nonempty(),
                stats.max_superbucket()
            );
        }
        Ok(stats)
    }
}
