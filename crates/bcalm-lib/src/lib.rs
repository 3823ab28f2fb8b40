// BCALM-style compacted de Bruijn graph construction
//
// Builds the compacted de Bruijn graph of a set of distinct k-mers by
// routing them through minimizer-keyed buckets and compacting each bucket
// locally, keeping only one bucket in memory at a time.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod encoding;
pub mod error;
pub mod minimizer;
pub mod graph;
pub mod store;
pub mod builder;

// Re-export common types at crate root
pub use builder::{
    build_compacted_graph, BuildConfiguration, Compactor, LargestBucketWatermark, Pipeline,
    PipelineReport,
};
pub use error::{PipelineError, Result};
pub use graph::{Graph, NodeId};
pub use minimizer::{MinimizerHasher, MmerCounter};
pub use store::{DirStore, MemoryStore, RecordStore};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
