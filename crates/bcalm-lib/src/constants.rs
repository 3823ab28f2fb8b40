//! Constants shared by the bucketing pipeline
//!
//! The record layout and the streaming bounds live here so that the
//! partitioner, refiner and compactor agree on them.

/// Width of a serialized minimizer rank (zero-padded decimal)
pub const MINIMIZER_STR_SIZE: usize = 10;

/// Bytes occupied by the two minimizer fields trailing every pending record
pub const MINIMIZER_FIELDS_SIZE: usize = 2 * MINIMIZER_STR_SIZE;

/// Record delimiter inside bucket streams
pub const RECORD_DELIMITER: u8 = b';';

/// Terminator appended to finalized records in the result stream
pub const FINAL_TERMINATOR: &[u8] = b";\n";

/// Chunk size for stream-to-stream copies
pub const COPY_CHUNK_SIZE: usize = 1_000_000;

/// Chunk size for the delimiter scan of the length indexer
pub const INDEX_SCAN_CHUNK_SIZE: usize = 10;

/// Buckets smaller than this never trigger a diagnostic dump
pub const DEFAULT_LARGEST_BUCKET_FLOOR: usize = 10_000;

/// Default file receiving the content of the largest bucket seen so far
pub const DEFAULT_LARGEST_BUCKET_DUMP: &str = "largest_bucket.dot";

/// Name of the per-bucket tag stream
pub const TAG_STREAM_NAME: &str = "tags";

/// Name of the stream accumulating finalized records
pub const RESULT_STREAM_NAME: &str = "result";

/// Prefix marking a superbucket that has not been refined yet
pub const SUPERBUCKET_PREFIX: char = 'z';

/// Smallest supported half-width of the minimizer window
pub const MIN_M: usize = 1;

/// Largest supported half-width of the minimizer window.
///
/// The rank table holds `4^(2m)` entries and every rank must fit in
/// [`MINIMIZER_STR_SIZE`] digits.
pub const MAX_M: usize = 6;

/// Version number
pub const VERSION: (u8, u8, u8) = (0, 1, 0);

/// Number of superbuckets, and of fine buckets per superbucket: `4^m`
#[inline]
pub const fn buckets_per_level(m: usize) -> u64 {
    1u64 << (2 * m)
}

/// Number of distinct minimizer ranks for half-width `m`: `4^(2m)`
#[inline]
pub const fn num_ranks(m: usize) -> u64 {
    1u64 << (4 * m)
}
