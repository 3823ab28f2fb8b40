//! Builder module for constructing compacted de Bruijn graphs
//!
//! This module implements the bucketing pipeline:
//! 1. Count m-mers and derive the minimizer order
//! 2. Partition k-mers into superbuckets by minimizer
//! 3. Refine each superbucket into fine buckets
//! 4. Compact each fine bucket and route surviving nodes onward
//! 5. Export finalized nodes

pub mod config;
pub mod record;
pub mod route;
pub mod partition;
pub mod refine;
pub mod length_index;
pub mod tags;
pub mod compact;
pub mod pipeline;

pub use config::BuildConfiguration;
pub use compact::{CompactionReport, Compactor, LargestBucketWatermark};
pub use partition::{PartitionStats, Partitioner};
pub use pipeline::{build_compacted_graph, Pipeline, PipelineReport};
pub use route::Placement;
