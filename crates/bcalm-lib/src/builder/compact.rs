//! Compaction of one fine bucket
//!
//! Records are loaded into a local [`Graph`]; oversized record bodies are
//! parked in the tag stream first so that only `2k` bases plus a short
//! reference per record are held in memory. After compaction each surviving
//! node is re-inlined and either finalized or re-routed to a later bucket.

use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use tracing::{debug, info};

use super::config::BuildConfiguration;
use super::length_index::index_lengths;
use super::record::{minimizer_trailer, parse_minimizer_fields, BucketName};
use super::route::Placement;
use super::tags::{reference, write_node, TagTable};
use crate::constants::{
    buckets_per_level, FINAL_TERMINATOR, MINIMIZER_FIELDS_SIZE, RECORD_DELIMITER,
    RESULT_STREAM_NAME, TAG_STREAM_NAME,
};
use crate::error::{PipelineError, Result};
use crate::graph::Graph;
use crate::store::{RecordStore, StreamWriter};

/// Record count of the largest bucket compacted so far.
///
/// Every strict increase triggers a dump of the new largest bucket when a
/// dump path is configured.
#[derive(Debug, Clone)]
pub struct LargestBucketWatermark {
    largest: usize,
    dump_path: Option<PathBuf>,
    num_dumps: usize,
}

impl LargestBucketWatermark {
    /// Start at `floor`; only buckets larger than it are reported
    pub fn new(floor: usize, dump_path: Option<PathBuf>) -> Self {
        Self { largest: floor, dump_path, num_dumps: 0 }
    }

    /// Record a bucket size; true if it raised the watermark
    pub fn observe(&mut self, count: usize) -> bool {
        if count > self.largest {
            self.largest = count;
            true
        } else {
            false
        }
    }

    /// Current watermark
    pub fn value(&self) -> usize {
        self.largest
    }

    /// Dump target, if any
    pub fn dump_path(&self) -> Option<&Path> {
        self.dump_path.as_deref()
    }

    /// Number of dumps written
    pub fn num_dumps(&self) -> usize {
        self.num_dumps
    }
}

/// What happened to one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Global bucket id
    pub bucket: u64,
    /// Records read from the bucket
    pub num_records: usize,
    /// Record bodies moved to the tag stream
    pub num_tags: usize,
    /// Nodes left after compaction
    pub num_nodes: usize,
    /// Nodes appended to the result stream
    pub num_final: usize,
    /// Nodes routed to a later bucket or superbucket
    pub num_rerouted: usize,
}

/// Compacts fine buckets and routes the resulting nodes
#[derive(Debug, Clone)]
pub struct Compactor {
    k: usize,
    m: usize,
    result_stream: String,
    watermark: LargestBucketWatermark,
}

impl Compactor {
    /// Create a compactor writing finalized nodes to the default result stream
    pub fn new(k: usize, m: usize, watermark: LargestBucketWatermark) -> Self {
        Self { k, m, result_stream: RESULT_STREAM_NAME.to_string(), watermark }
    }

    /// Compactor using the k, m and watermark settings of `config`
    pub fn from_config(config: &BuildConfiguration) -> Self {
        let watermark = LargestBucketWatermark::new(
            config.initial_largest_bucket,
            config.largest_bucket_dump.clone(),
        );
        Self::new(config.k, config.m, watermark)
    }

    /// Name of the stream receiving finalized nodes
    pub fn result_stream(&self) -> &str {
        &self.result_stream
    }

    /// Largest-bucket watermark
    pub fn watermark(&self) -> &LargestBucketWatermark {
        &self.watermark
    }

    /// Compact fine bucket `fine` of superbucket `superbucket` and route its nodes.
    ///
    /// The bucket stream and the tag stream are deleted afterwards. An empty
    /// or missing bucket is deleted and reported with zero records.
    pub fn compact_bucket<S: RecordStore>(
        &mut self,
        store: &mut S,
        superbucket: u64,
        fine: u64,
    ) -> Result<CompactionReport> {
        let bucket_id = superbucket * buckets_per_level(self.m) + fine;
        let name = BucketName::Bucket(bucket_id).to_string();
        let mut report = CompactionReport { bucket: bucket_id, ..CompactionReport::default() };

        let lengths = index_lengths(store, &name)?;
        if lengths.is_empty() {
            store.remove(&name)?;
            return Ok(report);
        }
        report.num_records = lengths.len();

        if self.watermark.observe(lengths.len()) {
            if let Some(path) = self.watermark.dump_path.clone() {
                store.export(&name, &path)?;
                self.watermark.num_dumps += 1;
            }
            info!("New largest bucket {}: {} records", name, lengths.len());
        }

        let (mut graph, tags) = self.load_bucket(store, &name, &lengths, &mut report)?;
        store.remove(&name)?;

        graph.compact(bucket_id)?;
        graph.renumber(bucket_id);

        let mut tag_reader = store.open_read(TAG_STREAM_NAME)?;
        let mut writers: AHashMap<Placement, StreamWriter> = AHashMap::new();
        writers.insert(Placement::Final, store.open_append(&self.result_stream)?);

        for node in graph.nodes() {
            if node.sequence.is_empty() {
                continue;
            }
            report.num_nodes += 1;

            let placement = Placement::of(node.leftmin, node.rightmin, bucket_id, self.m);
            let trailer = if placement.is_final() {
                report.num_final += 1;
                FINAL_TERMINATOR.to_vec()
            } else {
                report.num_rerouted += 1;
                minimizer_trailer(node.leftmin, node.rightmin)?
            };

            let writer = match writers.entry(placement) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(store.open_append(&placement.stream_name(&self.result_stream))?)
                }
            };
            write_node(store, writer, node.sequence, &trailer, &tags, tag_reader.as_mut())?;
        }

        store.remove(TAG_STREAM_NAME)?;
        debug!(
            "Bucket {}: {} records, {} tags, {} nodes ({} final, {} rerouted)",
            name,
            report.num_records,
            report.num_tags,
            report.num_nodes,
            report.num_final,
            report.num_rerouted
        );
        Ok(report)
    }

    /// Read every record of bucket `name` into a fresh graph
    fn load_bucket<S: RecordStore>(
        &self,
        store: &mut S,
        name: &str,
        lengths: &[u64],
        report: &mut CompactionReport,
    ) -> Result<(Graph, TagTable)> {
        let k = self.k as u64;
        let mut reader = store
            .open_read(name)?
            .ok_or_else(|| PipelineError::MissingStream(name.to_string()))?;
        let mut tag_writer = store.open_truncate(TAG_STREAM_NAME)?;
        let mut tags = TagTable::new();
        let mut graph = Graph::new(self.k);

        for &length in lengths {
            let offset = reader.tell();
            let body = length
                .checked_sub(MINIMIZER_FIELDS_SIZE as u64)
                .ok_or_else(|| PipelineError::NegativeLength {
                    stream: name.to_string(),
                    length,
                    needed: MINIMIZER_FIELDS_SIZE as u64,
                })?;

            let (vertex, fields, delimiter) = if body <= 2 * k {
                let mut record = reader.read_exactly(store, length as usize + 1)?;
                if (record.len() as u64) < length {
                    return Err(PipelineError::MalformedRecord {
                        stream: name.to_string(),
                        offset,
                        msg: format!("stream ends inside a record of length {}", length),
                    });
                }
                let delimiter = record.get(length as usize).copied();
                record.truncate(length as usize);
                let fields = record.split_off(body as usize);
                (record, fields, delimiter)
            } else {
                let mut vertex = reader.read_exactly(store, self.k)?;
                let id = tags.externalize(store, &mut reader, body - 2 * k, &mut tag_writer)?;
                vertex.extend_from_slice(&reference(id));
                vertex.extend_from_slice(&reader.read_exactly(store, self.k)?);
                let fields = reader.read_exactly(store, MINIMIZER_FIELDS_SIZE)?;
                let delimiter = reader.read_exactly(store, 1)?.pop();
                report.num_tags += 1;
                (vertex, fields, delimiter)
            };

            if delimiter != Some(RECORD_DELIMITER) {
                return Err(PipelineError::MalformedRecord {
                    stream: name.to_string(),
                    offset,
                    msg: format!("record of length {} is not followed by a delimiter", length),
                });
            }
            let (leftmin, rightmin) = parse_minimizer_fields(&fields, name, offset + body)?;
            graph.add_vertex(vertex);
            graph.add_left_minimizer(leftmin);
            graph.add_right_minimizer(rightmin);
        }

        Ok((graph, tags))
    }
}

/// Compact every fine bucket of `superbucket`, in increasing id order
pub fn compact_superbucket<S: RecordStore>(
    compactor: &mut Compactor,
    store: &mut S,
    superbucket: u64,
) -> Result<Vec<CompactionReport>> {
    let mut reports = Vec::new();
    for fine in 0..buckets_per_level(compactor.m) {
        let report = compactor.compact_bucket(store, superbucket, fine)?;
        if report.num_records > 0 {
            reports.push(report);
        }
    }
    Ok(reports)
}
