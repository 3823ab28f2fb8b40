//! Build configuration for compacted de Bruijn graph construction
//!
//! Holds the k-mer length, the minimizer half-width and the knobs deciding
//! where intermediate streams live and how the largest bucket is reported.

use std::path::PathBuf;

use crate::constants::{
    buckets_per_level, DEFAULT_LARGEST_BUCKET_DUMP, DEFAULT_LARGEST_BUCKET_FLOOR, MAX_M, MIN_M,
};

/// Configuration parameters for a pipeline run
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    /// K-mer length
    pub k: usize,

    /// Minimizer half-width: windows are `2m` bases, there are `4^m`
    /// superbuckets of `4^m` fine buckets each
    pub m: usize,

    /// Learn a frequency-based minimizer order with a counting pass first
    pub count_mmers: bool,

    /// Directory for on-disk streams (`None` keeps everything in memory)
    pub tmp_dirname: Option<PathBuf>,

    /// File receiving the content of each new largest bucket (`None` disables dumps)
    pub largest_bucket_dump: Option<PathBuf>,

    /// Bucket size below which no dump is written
    pub initial_largest_bucket: usize,

    /// Verbose output during construction
    pub verbose: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        Self {
            k: 31,
            m: 5,
            count_mmers: true,
            tmp_dirname: None,
            largest_bucket_dump: Some(PathBuf::from(DEFAULT_LARGEST_BUCKET_DUMP)),
            initial_largest_bucket: DEFAULT_LARGEST_BUCKET_FLOOR,
            verbose: false,
        }
    }
}

impl BuildConfiguration {
    /// Create a new configuration with the given k-mer length and minimizer half-width
    pub fn new(k: usize, m: usize) -> Result<Self, String> {
        let config = Self {
            k,
            m,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.m < MIN_M || self.m > MAX_M {
            return Err(format!("m must be in range [{}, {}], got m={}", MIN_M, MAX_M, self.m));
        }

        // the interior substring [1, k-1) must still hold a full window
        if self.k < 2 * self.m + 2 {
            return Err(format!(
                "k must be at least 2m + 2, got k={}, m={}",
                self.k, self.m
            ));
        }

        Ok(())
    }

    /// Minimizer window width (`2m`)
    pub fn window(&self) -> usize {
        2 * self.m
    }

    /// Number of superbuckets, also the number of fine buckets per superbucket
    pub fn num_superbuckets(&self) -> u64 {
        buckets_per_level(self.m)
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Build Configuration:");
        tracing::info!("  k = {}", self.k);
        tracing::info!("  m = {} (window {})", self.m, self.window());
        tracing::info!("  superbuckets = {}", self.num_superbuckets());
        tracing::info!("  count m-mers = {}", self.count_mmers);
        match &self.tmp_dirname {
            Some(dir) => tracing::info!("  streams on disk under {:?}", dir),
            None => tracing::info!("  streams in memory"),
        }
        tracing::debug!("  largest_bucket_dump = {:?}", self.largest_bucket_dump);
        tracing::debug!("  initial_largest_bucket = {}", self.initial_largest_bucket);
        tracing::debug!("  verbose = {}", self.verbose);
    }
}
