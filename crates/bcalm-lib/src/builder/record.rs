//! Record layout and bucket naming
//!
//! A pending record is `sequence + rank(left) + rank(right) + ';'` where each
//! rank is written as exactly [`MINIMIZER_STR_SIZE`] zero-padded decimal
//! digits. The fixed width lets readers recover both ranks by counting back
//! from the delimiter without parsing the sequence.

use std::fmt;

use crate::constants::{
    buckets_per_level, MINIMIZER_FIELDS_SIZE, MINIMIZER_STR_SIZE, RECORD_DELIMITER,
    SUPERBUCKET_PREFIX,
};
use crate::error::{PipelineError, Result};

/// Serialize a minimizer rank as a fixed-width zero-padded decimal field
pub fn pad10(rank: u64) -> Result<[u8; MINIMIZER_STR_SIZE]> {
    let digits = format!("{:0width$}", rank, width = MINIMIZER_STR_SIZE);
    if digits.len() != MINIMIZER_STR_SIZE {
        return Err(PipelineError::RankOverflow(rank));
    }
    let mut field = [0u8; MINIMIZER_STR_SIZE];
    field.copy_from_slice(digits.as_bytes());
    Ok(field)
}

/// Parse a fixed-width rank field, `None` unless it is exactly ten digits
pub fn parse_rank(field: &[u8]) -> Option<u64> {
    if field.len() != MINIMIZER_STR_SIZE || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(field.iter().fold(0u64, |acc, &d| acc * 10 + (d - b'0') as u64))
}

/// Parse the two trailing rank fields of a record body.
///
/// `fields` must be exactly [`MINIMIZER_FIELDS_SIZE`] bytes long.
pub fn parse_minimizer_fields(fields: &[u8], stream: &str, offset: u64) -> Result<(u64, u64)> {
    let malformed = || PipelineError::MalformedRecord {
        stream: stream.to_string(),
        offset,
        msg: format!("bad minimizer fields {:?}", String::from_utf8_lossy(fields)),
    };
    if fields.len() != MINIMIZER_FIELDS_SIZE {
        return Err(malformed());
    }
    let left = parse_rank(&fields[..MINIMIZER_STR_SIZE]).ok_or_else(malformed)?;
    let right = parse_rank(&fields[MINIMIZER_STR_SIZE..]).ok_or_else(malformed)?;
    Ok((left, right))
}

/// Both rank fields followed by the delimiter
pub fn minimizer_trailer(leftmin: u64, rightmin: u64) -> Result<Vec<u8>> {
    let mut trailer = Vec::with_capacity(MINIMIZER_FIELDS_SIZE + 1);
    trailer.extend_from_slice(&pad10(leftmin)?);
    trailer.extend_from_slice(&pad10(rightmin)?);
    trailer.push(RECORD_DELIMITER);
    Ok(trailer)
}

/// Build a complete pending record: sequence, both rank fields and the delimiter
pub fn pending_record(sequence: &[u8], leftmin: u64, rightmin: u64) -> Result<Vec<u8>> {
    let mut record = Vec::with_capacity(sequence.len() + MINIMIZER_FIELDS_SIZE + 1);
    record.extend_from_slice(sequence);
    record.extend_from_slice(&minimizer_trailer(leftmin, rightmin)?);
    Ok(record)
}

/// Name of a bucket stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketName {
    /// Superbucket not refined yet, by superbucket index
    Superbucket(u64),
    /// Fine bucket, by global bucket id
    Bucket(u64),
}

impl BucketName {
    /// Fine bucket of a superbucket
    pub fn fine(superbucket: u64, fine: u64, m: usize) -> Self {
        BucketName::Bucket(superbucket * buckets_per_level(m) + fine)
    }

    /// Numeric id used as the routing baseline for records held in this bucket.
    ///
    /// For a superbucket this is the id just below its first fine bucket,
    /// which is `-1` for superbucket 0.
    pub fn baseline(&self, m: usize) -> i64 {
        match *self {
            BucketName::Superbucket(index) => (index * buckets_per_level(m)) as i64 - 1,
            BucketName::Bucket(id) => id as i64,
        }
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketName::Superbucket(index) => write!(f, "{}{}", SUPERBUCKET_PREFIX, index),
            BucketName::Bucket(id) => write!(f, "{}", id),
        }
    }
}
