//! Record length indexing
//!
//! Locates every delimiter of a bucket stream and reports the byte length of
//! each record (delimiter excluded) without materializing any record.

use crate::constants::{INDEX_SCAN_CHUNK_SIZE, RECORD_DELIMITER};
use crate::error::Result;
use crate::store::RecordStore;

/// Ordered byte lengths of the records of stream `name`.
///
/// The stream is scanned in [`INDEX_SCAN_CHUNK_SIZE`]-byte chunks. A missing
/// stream, or one shorter than two bytes, yields an empty list.
pub fn index_lengths<S: RecordStore>(store: &mut S, name: &str) -> Result<Vec<u64>> {
    let mut lengths = Vec::new();
    let Some(mut reader) = store.open_read(name)? else {
        return Ok(lengths);
    };
    if reader.len() < 2 {
        return Ok(lengths);
    }

    let mut last_delimiter: i64 = -1;
    let mut position: i64 = 0;
    loop {
        let chunk = reader.read_exactly(store, INDEX_SCAN_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        for &byte in &chunk {
            if byte == RECORD_DELIMITER {
                lengths.push((position - last_delimiter - 1) as u64);
                last_delimiter = position;
            }
            position += 1;
        }
    }
    Ok(lengths)
}
