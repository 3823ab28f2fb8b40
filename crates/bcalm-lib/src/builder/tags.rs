//! Out-of-line storage for long record bodies
//!
//! While a bucket is compacted, the middle of every oversized record is
//! moved to the bucket's tag stream and replaced in the vertex text by a
//! reference `+<id>+`. Reverse-complementing a vertex turns the reference
//! into `-<reversed id>-`. When the compacted nodes are written out, every
//! reference is replaced again by the stored bytes, reverse-complemented for
//! `-` references.
//!
//! Literal DNA never contains a decimal digit, so "contains a digit" is the
//! test for "contains a reference". The reference length counts its digits
//! and its trailing sign.

use std::io::SeekFrom;

use crate::error::{PipelineError, Result};
use crate::store::{copy, copy_reverse_complement, RecordStore, StreamReader, StreamWriter};

/// Location of one tag inside the tag stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpan {
    /// Byte offset in the tag stream
    pub offset: u64,
    /// Length in bytes
    pub len: u64,
}

/// Tags externalized for the bucket being compacted, indexed by id
#[derive(Debug, Default, Clone)]
pub struct TagTable {
    spans: Vec<TagSpan>,
    total_len: u64,
}

impl TagTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True if no tag was recorded
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total bytes held in the tag stream
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Move `len` bytes from `source` to the end of the tag stream and return the new id
    pub fn externalize<S: RecordStore>(
        &mut self,
        store: &mut S,
        source: &mut StreamReader,
        len: u64,
        tag_writer: &mut StreamWriter,
    ) -> Result<u64> {
        let id = self.spans.len() as u64;
        copy(store, source, len, tag_writer)?;
        self.spans.push(TagSpan { offset: self.total_len, len });
        self.total_len += len;
        Ok(id)
    }

    /// Span of tag `id`
    pub fn get(&self, id: u64) -> Result<TagSpan> {
        self.spans
            .get(id as usize)
            .copied()
            .ok_or(PipelineError::UnknownTag { tag: id, available: self.spans.len() })
    }
}

/// Forward reference text for tag `id`
pub fn reference(id: u64) -> Vec<u8> {
    format!("+{}+", id).into_bytes()
}

/// Position of the first digit at or after `start`, `None` if the rest of the node is literal
pub fn find_tag(node: &[u8], start: usize) -> Option<usize> {
    node.get(start..)?
        .iter()
        .position(u8::is_ascii_digit)
        .map(|offset| start + offset)
}

/// Length of the reference starting at digit position `j`: its digits and signs
pub fn tag_length(node: &[u8], j: usize) -> usize {
    1 + node[j + 1..]
        .iter()
        .take_while(|&&b| b.is_ascii_digit() || b == b'+' || b == b'-')
        .count()
}

/// Write `node` followed by `trailer`, replacing every tag reference by the
/// tag's bytes read from `tag_reader`.
pub fn write_node<S: RecordStore>(
    store: &mut S,
    writer: &mut StreamWriter,
    node: &[u8],
    trailer: &[u8],
    tags: &TagTable,
    tag_reader: Option<&mut StreamReader>,
) -> Result<()> {
    let Some(mut j) = find_tag(node, 0) else {
        writer.write(store, node)?;
        return writer.write(store, trailer);
    };
    let tag_reader = tag_reader.ok_or_else(|| PipelineError::MissingStream("tag stream".to_string()))?;

    let stream = writer.name().to_string();
    let malformed = |msg: String| PipelineError::MalformedRecord {
        stream: stream.clone(),
        offset: 0,
        msg: format!("{} in node {:?}", msg, String::from_utf8_lossy(node)),
    };

    let mut cut = 0usize;
    loop {
        if j == 0 || j - 1 < cut {
            return Err(malformed(format!("tag reference at {} has no orientation sign", j)));
        }
        writer.write(store, &node[cut..j - 1])?;

        let sign = node[j - 1];
        let length = tag_length(node, j);
        let digits_end = node[j..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(node.len(), |p| j + p);
        let mut digits = node[j..digits_end].to_vec();
        if sign == b'-' {
            digits.reverse();
        }
        let id: u64 = std::str::from_utf8(&digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed(format!("bad tag id at {}", j)))?;
        cut = j + length;

        let span = tags.get(id)?;
        tag_reader.seek(SeekFrom::Start(span.offset));
        match sign {
            b'+' => copy(store, tag_reader, span.len, writer)?,
            b'-' => copy_reverse_complement(store, tag_reader, span.len, writer)?,
            other => {
                return Err(malformed(format!("unexpected sign {:?} before tag", other as char)));
            }
        }

        match find_tag(node, cut) {
            Some(next) => j = next,
            None => break,
        }
    }

    writer.write(store, &node[cut..])?;
    writer.write(store, trailer)
}
