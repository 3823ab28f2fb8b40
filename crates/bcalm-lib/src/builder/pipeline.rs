//! Pipeline orchestration
//!
//! Drives a whole run over one store:
//! 1. Clear leftover streams and the output file
//! 2. Learn the minimizer order (counting pass) or use the lexicographic one
//! 3. Partition the input k-mers into superbuckets
//! 4. For each superbucket in order: refine it, then compact its fine buckets
//! 5. Export the result stream to the output file
//! 6. Clear the store

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::compact::{compact_superbucket, Compactor};
use super::config::BuildConfiguration;
use super::partition::{count_mmers, PartitionStats, Partitioner};
use super::refine::refine;
use crate::error::{PipelineError, Result};
use crate::minimizer::{MinimizerHasher, MmerCounter};
use crate::store::{DirStore, MemoryStore, RecordStore};

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// K-mers read from the input
    pub num_kmers: u64,
    /// Superbuckets that held at least one record when refined
    pub num_superbuckets: usize,
    /// Fine buckets that held at least one record when compacted
    pub num_buckets: usize,
    /// Records loaded into local graphs, re-routed ones counted again
    pub num_records: usize,
    /// Record bodies that went through the tag stream
    pub num_tags: usize,
    /// Nodes written to the result stream
    pub num_final: usize,
    /// Record count of the largest fine bucket
    pub largest_bucket: usize,
    /// Dumps of a new largest bucket
    pub num_dumps: usize,
    /// Whether the result stream existed and was written to the output
    pub exported: bool,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Runs the bucketing and compaction pipeline over a record store
pub struct Pipeline<S: RecordStore> {
    config: BuildConfiguration,
    store: S,
}

impl<S: RecordStore> Pipeline<S> {
    /// Create a pipeline; fails if the configuration is invalid
    pub fn new(config: BuildConfiguration, store: S) -> Result<Self> {
        config.validate().map_err(PipelineError::Config)?;
        Ok(Self { config, store })
    }

    /// Configuration of this pipeline
    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give back the store
    pub fn into_store(self) -> S {
        self.store
    }

    /// Minimizer order for `input`: frequency based after a counting pass, or lexicographic
    pub fn build_hasher(&self, input: &Path) -> Result<MinimizerHasher> {
        let window = self.config.window();
        if !self.config.count_mmers {
            info!("Using lexicographic minimizer order");
            return Ok(MinimizerHasher::lexicographic(window));
        }
        let mut counter = MmerCounter::new(window);
        count_mmers(input, self.config.k, &mut counter)?;
        Ok(counter.into_hasher())
    }

    /// Partition `input` without writing any stream and report superbucket sizes
    pub fn dry_run(&mut self, input: &Path) -> Result<PartitionStats> {
        let hasher = self.build_hasher(input)?;
        Partitioner::new(&self.config, &hasher).partition(input, &mut self.store, false)
    }

    /// Build the compacted graph of the k-mers in `input` and write it to `output`
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<PipelineReport> {
        let start = Instant::now();
        self.config.print();

        self.store.clear_all("")?;
        if let Err(e) = fs::remove_file(output) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        info!("Step 1: Building minimizer order...");
        let hasher = self.build_hasher(input)?;

        info!("Step 2: Partitioning k-mers into superbuckets...");
        let stats = Partitioner::new(&self.config, &hasher).partition(input, &mut self.store, true)?;

        info!("Step 3: Refining and compacting buckets...");
        let mut compactor = Compactor::from_config(&self.config);
        let mut report = PipelineReport { num_kmers: stats.num_kmers, ..PipelineReport::default() };
        for superbucket in 0..self.config.num_superbuckets() {
            let refined = refine(&mut self.store, superbucket, self.config.m)?;
            if refined.num_records == 0 {
                continue;
            }
            report.num_superbuckets += 1;
            for bucket in compact_superbucket(&mut compactor, &mut self.store, superbucket)? {
                report.num_buckets += 1;
                report.num_records += bucket.num_records;
                report.num_tags += bucket.num_tags;
                report.num_final += bucket.num_final;
                report.largest_bucket = report.largest_bucket.max(bucket.num_records);
            }
        }
        report.num_dumps = compactor.watermark().num_dumps();
        info!(
            "  {} buckets compacted, {} nodes finalized",
            report.num_buckets, report.num_final
        );

        info!("Step 4: Writing {:?}...", output);
        report.exported = self.store.export(compactor.result_stream(), output)?;
        if !report.exported {
            warn!("No result stream to export, {:?} was not written", output);
        }

        self.store.clear_all("")?;
        report.elapsed = start.elapsed();
        info!("Last for {:.3} s", report.elapsed.as_secs_f64());
        Ok(report)
    }
}

/// Run the pipeline with the store selected by `config.tmp_dirname`
pub fn build_compacted_graph(
    config: &BuildConfiguration,
    input: &Path,
    output: &Path,
) -> Result<PipelineReport> {
    match &config.tmp_dirname {
        Some(dir) => Pipeline::new(config.clone(), DirStore::new(dir)?)?.run(input, output),
        None => Pipeline::new(config.clone(), MemoryStore::new())?.run(input, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn input_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn config(k: usize, m: usize, count_mmers: bool) -> BuildConfiguration {
        BuildConfiguration {
            count_mmers,
            largest_bucket_dump: None,
            ..BuildConfiguration::new(k, m).unwrap()
        }
    }

    #[test]
    fn test_two_isolated_kmers() {
        let input = input_file("aaaaaaaaaa x\ncccccccccc y\n");
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.txt");

        let mut pipeline = Pipeline::new(config(10, 2, false), MemoryStore::new()).unwrap();
        let report = pipeline.run(input.path(), &output).unwrap();

        assert_eq!(report.num_kmers, 2);
        assert_eq!(report.num_final, 2);
        assert!(report.exported);
        assert_eq!(fs::read(&output).unwrap(), b"aaaaaaaaaa;\ncccccccccc;\n");
        assert!(pipeline.store().stream_names().is_empty());
    }

    #[test]
    fn test_empty_input_writes_no_output() {
        let input = input_file("");
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.txt");
        fs::write(&output, b"stale").unwrap();

        let mut pipeline = Pipeline::new(config(10, 2, true), MemoryStore::new()).unwrap();
        let report = pipeline.run(input.path(), &output).unwrap();
        assert_eq!(report.num_kmers, 0);
        assert!(!report.exported);
        assert!(!output.exists());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = BuildConfiguration { k: 5, m: 2, ..BuildConfiguration::default() };
        assert!(matches!(
            Pipeline::new(bad, MemoryStore::new()),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_dry_run_counts_without_streams() {
        let input = input_file("aaaaaaaaaa x\ncccccccccc y\nacgtacgtac z\n");
        let mut pipeline = Pipeline::new(config(10, 2, true), MemoryStore::new()).unwrap();
        let stats = pipeline.dry_run(input.path()).unwrap();
        assert_eq!(stats.num_kmers, 3);
        assert_eq!(stats.superbucket_sizes.iter().sum::<u64>(), 3);
        assert!(pipeline.store().stream_names().is_empty());
    }

    #[test]
    fn test_build_compacted_graph_on_disk() {
        let input = input_file("aaaaaaaaaa x\ncccccccccc y\n");
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.txt");
        let tmp = dir.path().join("streams");
        let config = BuildConfiguration { tmp_dirname: Some(tmp.clone()), ..config(10, 2, false) };

        let report = build_compacted_graph(&config, input.path(), &output).unwrap();
        assert_eq!(report.num_final, 2);
        assert_eq!(fs::read(&output).unwrap(), b"aaaaaaaaaa;\ncccccccccc;\n");
        assert_eq!(fs::read_dir(&tmp).unwrap().count(), 0);
    }
}
