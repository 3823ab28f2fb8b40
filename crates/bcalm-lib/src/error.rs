//! Error types for the bucketing pipeline

use thiserror::Error;

use crate::encoding::EncodingError;
use crate::graph::GraphError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while partitioning, refining or compacting buckets.
///
/// Everything except [`PipelineError::Io`] and [`PipelineError::Config`]
/// signals a corrupt intermediate stream: callers are expected to abort the
/// run rather than retry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// I/O error from the input file, a store backend or an export target
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Character outside the DNA alphabet (or the tag alphabet, for node text)
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The local compaction engine rejected its input
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A record length computation went below zero
    #[error("Negative read length in stream {stream}: record of {length} bytes cannot hold {needed}")]
    NegativeLength {
        /// Stream being read
        stream: String,
        /// Indexed record length
        length: u64,
        /// Bytes the record layout requires
        needed: u64,
    },

    /// A record did not have the expected layout
    #[error("Malformed record in stream {stream} at offset {offset}: {msg}")]
    MalformedRecord {
        /// Stream being read
        stream: String,
        /// Byte offset of the problem
        offset: u64,
        /// Description
        msg: String,
    },

    /// A node referenced a tag id missing from the current tag table
    #[error("Unknown tag {tag} (bucket holds {available} tags)")]
    UnknownTag {
        /// Referenced id
        tag: u64,
        /// Number of tags recorded for the bucket
        available: usize,
    },

    /// A stream that must exist was not found
    #[error("Missing stream: {0}")]
    MissingStream(String),

    /// A minimizer rank does not fit the fixed-width field
    #[error("Minimizer rank {0} does not fit in the fixed-width field")]
    RankOverflow(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
