//! Refinement of a superbucket into its fine buckets
//!
//! The superbucket stream is scanned in bounded chunks for delimiters. For
//! each record, the two rank fields just before the delimiter decide the
//! destination fine bucket, and the raw record bytes (delimiter included)
//! are copied there verbatim.

use std::collections::hash_map::Entry;
use std::io::SeekFrom;

use ahash::AHashMap;
use tracing::{debug, warn};

use super::record::{parse_minimizer_fields, BucketName};
use super::route::min_but_bigger_than;
use crate::constants::{buckets_per_level, COPY_CHUNK_SIZE, MINIMIZER_FIELDS_SIZE, RECORD_DELIMITER};
use crate::error::{PipelineError, Result};
use crate::store::{copy, RecordStore, StreamWriter};

/// Counters gathered while refining one superbucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineStats {
    /// Records moved to fine buckets
    pub num_records: u64,
    /// Bytes moved to fine buckets
    pub num_bytes: u64,
    /// Fine buckets that received at least one record
    pub num_fine_buckets: usize,
    /// The superbucket stream was missing
    pub skipped: bool,
}

/// Split superbucket `superbucket` into fine bucket streams, then delete it.
///
/// An empty superbucket is deleted without creating any fine bucket; a
/// missing one is reported and skipped.
pub fn refine<S: RecordStore>(store: &mut S, superbucket: u64, m: usize) -> Result<RefineStats> {
    let bucket = BucketName::Superbucket(superbucket);
    let name = bucket.to_string();
    let Some(mut reader) = store.open_read(&name)? else {
        warn!("Superbucket {} is missing, skipping it", name);
        return Ok(RefineStats { skipped: true, ..RefineStats::default() });
    };
    if reader.is_empty() {
        store.remove(&name)?;
        return Ok(RefineStats::default());
    }

    let per_level = buckets_per_level(m);
    let baseline = bucket.baseline(m);
    let size = reader.len();
    let mut writers: AHashMap<u64, StreamWriter> = AHashMap::new();
    let mut stats = RefineStats::default();

    let mut next_record: u64 = 0;
    let mut chunk_start: u64 = 0;
    while chunk_start < size {
        reader.seek(SeekFrom::Start(chunk_start));
        let chunk = reader.read_exactly(store, COPY_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }

        for (i, _) in chunk.iter().enumerate().filter(|(_, &b)| b == RECORD_DELIMITER) {
            let position = chunk_start + i as u64;
            let fields_start = position
                .checked_sub(MINIMIZER_FIELDS_SIZE as u64)
                .filter(|&start| start >= next_record)
                .ok_or_else(|| PipelineError::MalformedRecord {
                    stream: name.clone(),
                    offset: position,
                    msg: "record too short to hold minimizer fields".to_string(),
                })?;

            let (leftmin, rightmin) = if i >= MINIMIZER_FIELDS_SIZE {
                parse_minimizer_fields(&chunk[i - MINIMIZER_FIELDS_SIZE..i], &name, fields_start)?
            } else {
                // the fields straddle the previous chunk
                reader.seek(SeekFrom::Start(fields_start));
                let fields = reader.read_exactly(store, MINIMIZER_FIELDS_SIZE)?;
                parse_minimizer_fields(&fields, &name, fields_start)?
            };

            let destination = min_but_bigger_than(leftmin, rightmin, baseline).ok_or_else(|| {
                PipelineError::MalformedRecord {
                    stream: name.clone(),
                    offset: fields_start,
                    msg: format!("ranks ({}, {}) are below superbucket {}", leftmin, rightmin, superbucket),
                }
            })?;
            let fine = destination % per_level;

            let writer = match writers.entry(fine) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let fine_name = BucketName::fine(superbucket, fine, m).to_string();
                    entry.insert(store.open_append(&fine_name)?)
                }
            };

            let span = position - next_record + 1;
            reader.seek(SeekFrom::Start(next_record));
            copy(store, &mut reader, span, writer)?;

            stats.num_records += 1;
            stats.num_bytes += span;
            next_record = position + 1;
        }

        chunk_start += chunk.len() as u64;
    }

    if next_record != size {
        return Err(PipelineError::MalformedRecord {
            stream: name,
            offset: next_record,
            msg: "trailing bytes without a delimiter".to_string(),
        });
    }

    stats.num_fine_buckets = writers.len();
    store.remove(&name)?;
    debug!(
        "Refined {}: {} records into {} fine buckets",
        name, stats.num_records, stats.num_fine_buckets
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::record::pending_record;
    use crate::store::MemoryStore;

    #[test]
    fn test_refine_routes_by_smaller_rank() {
        // m = 1: 4 superbuckets of 4 fine buckets
        let mut store = MemoryStore::new();
        let a = pending_record(b"acgtac", 5, 7).unwrap();
        let b = pending_record(b"ttgcaa", 6, 5).unwrap();
        let c = pending_record(b"gggccc", 7, 7).unwrap();
        for record in [&a, &b, &c] {
            store.append("z1", record).unwrap();
        }

        let stats = refine(&mut store, 1, 1).unwrap();
        assert_eq!(stats.num_records, 3);
        assert_eq!(stats.num_fine_buckets, 2);
        assert!(!store.exists("z1").unwrap());

        let mut expected_5 = a.clone();
        expected_5.extend_from_slice(&b);
        assert_eq!(store.contents("5").unwrap(), &expected_5[..]);
        assert_eq!(store.contents("7").unwrap(), &c[..]);
    }

    #[test]
    fn test_refine_routed_record_uses_larger_rank() {
        // a node that left bucket 2 with ranks (2, 9) waits in superbucket 2
        let mut store = MemoryStore::new();
        let record = pending_record(b"acgtacgt", 2, 9).unwrap();
        store.append("z2", &record).unwrap();
        refine(&mut store, 2, 1).unwrap();
        assert_eq!(store.contents("9").unwrap(), &record[..]);
    }

    #[test]
    fn test_refine_superbucket_zero_with_rank_zero() {
        let mut store = MemoryStore::new();
        let record = pending_record(b"aaaaaa", 0, 0).unwrap();
        store.append("z0", &record).unwrap();
        refine(&mut store, 0, 2).unwrap();
        assert_eq!(store.contents("0").unwrap(), &record[..]);
    }

    #[test]
    fn test_refine_long_record_spanning_chunks() {
        let mut store = MemoryStore::new();
        let long: Vec<u8> = (0..COPY_CHUNK_SIZE + 5).map(|i| b"acgt"[i % 4]).collect();
        let first = pending_record(&long, 4, 4).unwrap();
        let second = pending_record(b"ccccgg", 6, 4).unwrap();
        store.append("z1", &first).unwrap();
        store.append("z1", &second).unwrap();

        let stats = refine(&mut store, 1, 1).unwrap();
        assert_eq!(stats.num_records, 2);
        let content = store.contents("4").unwrap();
        assert_eq!(&content[..first.len()], &first[..]);
        assert_eq!(&content[first.len()..], &second[..]);
    }

    #[test]
    fn test_refine_fields_straddle_chunk_boundary() {
        // the first delimiter lands `shift` bytes into the second chunk
        for shift in [0, 1, 5, 10, 19, 20] {
            let mut store = MemoryStore::new();
            let long: Vec<u8> = (0..COPY_CHUNK_SIZE + shift - MINIMIZER_FIELDS_SIZE)
                .map(|i| b"acgt"[i % 4])
                .collect();
            let first = pending_record(&long, 4, 6).unwrap();
            assert_eq!(first.len(), COPY_CHUNK_SIZE + shift + 1);
            let second = pending_record(b"ccccgg", 6, 5).unwrap();
            store.append("z1", &first).unwrap();
            store.append("z1", &second).unwrap();

            let stats = refine(&mut store, 1, 1).unwrap();
            assert_eq!(stats.num_records, 2, "shift {}", shift);
            assert_eq!(store.contents("4").unwrap(), &first[..], "shift {}", shift);
            assert_eq!(store.contents("5").unwrap(), &second[..], "shift {}", shift);
            assert!(!store.exists("z1").unwrap());
        }
    }

    #[test]
    fn test_refine_empty_and_missing() {
        let mut store = MemoryStore::new();
        store.truncate("z3").unwrap();
        let stats = refine(&mut store, 3, 1).unwrap();
        assert_eq!(stats, RefineStats::default());
        assert!(store.stream_names().is_empty());

        let stats = refine(&mut store, 2, 1).unwrap();
        assert!(stats.skipped);
    }

    #[test]
    fn test_refine_rejects_corrupt_stream() {
        let mut store = MemoryStore::new();
        store.append("z0", b"acgt;").unwrap();
        assert!(refine(&mut store, 0, 1).is_err());

        let mut store = MemoryStore::new();
        let mut record = pending_record(b"acgtac", 1, 1).unwrap();
        record.pop();
        store.append("z0", &record).unwrap();
        assert!(refine(&mut store, 0, 1).is_err());
    }
}
