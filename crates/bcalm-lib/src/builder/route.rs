//! Routing of records between buckets
//!
//! A record carries the minimizer ranks of its two boundary (k-1)-mers. It
//! only ever moves to a bucket whose id is strictly greater than the one
//! holding it, and it is finalized once neither boundary rank is greater.
//! Bucket ids therefore increase along every routing path, which bounds the
//! number of hops and makes the pipeline terminate.

use crate::constants::buckets_per_level;

use super::record::BucketName;

/// Smallest of the two ranks that is strictly greater than `baseline`.
///
/// `None` means no bucket after `baseline` dominates the record: it belongs
/// to the current stage. The baseline is signed because the one used for
/// superbucket 0 is `-1`.
pub fn min_but_bigger_than(leftmin: u64, rightmin: u64, baseline: i64) -> Option<u64> {
    let (lo, hi) = if leftmin < rightmin {
        (leftmin, rightmin)
    } else {
        (rightmin, leftmin)
    };
    if lo as i64 > baseline {
        Some(lo)
    } else if hi as i64 > baseline {
        Some(hi)
    } else {
        None
    }
}

/// Where a compacted node goes after leaving a fine bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Appended to the result stream
    Final,
    /// Appended to a superbucket that has not been refined yet
    Superbucket(u64),
    /// Appended to a later fine bucket of the current superbucket
    Bucket(u64),
}

impl Placement {
    /// Decide the placement of a node leaving fine bucket `current`
    pub fn of(leftmin: u64, rightmin: u64, current: u64, m: usize) -> Self {
        let per_level = buckets_per_level(m);
        let next_superbucket = current / per_level + 1;
        match min_but_bigger_than(leftmin, rightmin, current as i64) {
            None => Placement::Final,
            Some(destination) => {
                let prefix = destination / per_level;
                if prefix >= next_superbucket {
                    Placement::Superbucket(prefix)
                } else {
                    Placement::Bucket(destination)
                }
            }
        }
    }

    /// True if the node is written to the result stream
    pub fn is_final(&self) -> bool {
        matches!(self, Placement::Final)
    }

    /// Stream receiving the node
    pub fn stream_name(&self, result_stream: &str) -> String {
        match *self {
            Placement::Final => result_stream.to_string(),
            Placement::Superbucket(index) => BucketName::Superbucket(index).to_string(),
            Placement::Bucket(id) => BucketName::Bucket(id).to_string(),
        }
    }
}
