//! DNA nucleotide encoding and reverse complementation
//!
//! Bases are encoded lexicographically so that comparing two encoded windows
//! numerically gives the same answer as comparing the strings:
//! - A (65/97)  -> 00
//! - C (67/99)  -> 01
//! - G (71/103) -> 10
//! - T (84/116) -> 11
//!
//! Reverse complementation works on node text, which besides bases may carry
//! tag references (`+12+`, `-21-`). Digits map to themselves and the two
//! orientation signs swap, so reversing a node also flips its references.

use thiserror::Error;

/// Error type for encoding operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The input byte is not a valid DNA base (A/C/G/T)
    #[error("Invalid DNA base: {:?} at position {position}", as_char(.base))]
    InvalidBase {
        /// Offending byte
        base: u8,
        /// Position inside the inspected slice
        position: usize,
    },
    /// The sequence is shorter than the window it must hold
    #[error("Sequence of length {actual} is shorter than window {expected}")]
    TooShort {
        /// Required length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}

fn as_char(b: &u8) -> char {
    char::from(*b)
}

/// Encode a single DNA nucleotide to 2 bits
#[inline]
pub const fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

/// Decode a 2-bit value to a lower-case DNA nucleotide
#[inline]
pub const fn decode_base(bits: u64) -> u8 {
    match bits & 0b11 {
        0b00 => b'a',
        0b01 => b'c',
        0b10 => b'g',
        _ => b't',
    }
}

/// Complement of an encoded base
#[inline]
pub const fn complement_code(bits: u64) -> u64 {
    0b11 - (bits & 0b11)
}

/// Complement of a single character of node text, `None` if unrecognized
#[inline]
pub const fn complement_char(c: u8) -> Option<u8> {
    match c {
        b'a' => Some(b't'),
        b'c' => Some(b'g'),
        b'g' => Some(b'c'),
        b't' => Some(b'a'),
        b'A' => Some(b'T'),
        b'C' => Some(b'G'),
        b'G' => Some(b'C'),
        b'T' => Some(b'A'),
        b'+' => Some(b'-'),
        b'-' => Some(b'+'),
        b'0'..=b'9' => Some(c),
        _ => None,
    }
}

/// Reverse complement of node text (bases, digits and orientation signs)
///
/// # Errors
/// Returns an error on any other character; intermediate streams only ever
/// hold these, so anything else means a corrupt stream.
pub fn reverse_complement(seq: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(seq.len());
    for (i, &c) in seq.iter().enumerate().rev() {
        match complement_char(c) {
            Some(rc) => out.push(rc),
            None => return Err(EncodingError::InvalidBase { base: c, position: i }),
        }
    }
    Ok(out)
}

/// Encode a window of DNA into a `2 * len`-bit integer (first base most significant)
///
/// # Errors
/// Returns an error if the window contains a non-ACGT character
pub fn encode_window(window: &[u8]) -> Result<u64, EncodingError> {
    let mut code = 0u64;
    for (i, &base) in window.iter().enumerate() {
        let bits = encode_base(base).ok_or(EncodingError::InvalidBase { base, position: i })?;
        code = (code << 2) | bits;
    }
    Ok(code)
}

/// Reverse complement of an encoded window of `len` bases
pub fn reverse_complement_code(mut code: u64, len: usize) -> u64 {
    let mut rc = 0u64;
    for _ in 0..len {
        rc = (rc << 2) | complement_code(code);
        code >>= 2;
    }
    rc
}

/// Canonical form of an encoded window: the smaller of it and its reverse complement
#[inline]
pub fn canonical_code(code: u64, len: usize) -> u64 {
    code.min(reverse_complement_code(code, len))
}

/// Decode an encoded window of `len` bases (lower-case)
pub fn decode_window(code: u64, len: usize) -> String {
    (0..len)
        .rev()
        .map(|i| decode_base(code >> (2 * i)) as char)
        .collect()
}

/// Check that a sequence contains only A, C, G, T (any case)
///
/// # Errors
/// Returns the first offending character and its position
pub fn validate_dna_sequence(seq: &[u8]) -> Result<(), EncodingError> {
    match seq.iter().position(|&b| encode_base(b).is_none()) {
        Some(position) => Err(EncodingError::InvalidBase { base: seq[position], position }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_base() {
        assert_eq!(encode_base(b'A'), Some(0b00));
        assert_eq!(encode_base(b'c'), Some(0b01));
        assert_eq!(encode_base(b'G'), Some(0b10));
        assert_eq!(encode_base(b't'), Some(0b11));
        assert_eq!(encode_base(b'N'), None);
        assert_eq!(encode_base(b'0'), None);
    }

    #[test]
    fn test_lexicographic_order() {
        let a = encode_window(b"acgt").unwrap();
        let b = encode_window(b"actg").unwrap();
        assert!(a < b);
        assert!(encode_window(b"aaaa").unwrap() < encode_window(b"tttt").unwrap());
    }

    #[test]
    fn test_reverse_complement_dna() {
        assert_eq!(reverse_complement(b"aacg").unwrap(), b"cgtt");
        assert_eq!(reverse_complement(b"ACGT").unwrap(), b"ACGT");
    }

    #[test]
    fn test_reverse_complement_flips_tags() {
        assert_eq!(reverse_complement(b"aa+12+cc").unwrap(), b"gg-21-tt");
        let twice = reverse_complement(&reverse_complement(b"ac+7+gt").unwrap()).unwrap();
        assert_eq!(twice, b"ac+7+gt");
    }

    #[test]
    fn test_reverse_complement_rejects_garbage() {
        let err = reverse_complement(b"acnt").unwrap_err();
        assert_eq!(err, EncodingError::InvalidBase { base: b'n', position: 2 });
    }

    #[test]
    fn test_code_reverse_complement_matches_text() {
        let text = b"aacgtg";
        let code = encode_window(text).unwrap();
        let rc_text = reverse_complement(text).unwrap();
        assert_eq!(reverse_complement_code(code, text.len()), encode_window(&rc_text).unwrap());
        assert_eq!(decode_window(code, text.len()), "aacgtg");
    }

    #[test]
    fn test_canonical_code() {
        // tttt is the reverse complement of aaaa
        let tttt = encode_window(b"tttt").unwrap();
        assert_eq!(canonical_code(tttt, 4), 0);
    }

    #[test]
    fn test_validate() {
        assert!(validate_dna_sequence(b"ACGTacgt").is_ok());
        assert!(validate_dna_sequence(b"ACGTN").is_err());
        assert!(validate_dna_sequence(b"ac+1+").is_err());
    }
}
