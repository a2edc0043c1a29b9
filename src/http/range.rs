//! HTTP Range request parsing module
//!
//! Parses the single-range byte form `bytes=<start>-<end>?`. The grammar is
//! deliberately narrow: suffix ranges (`bytes=-500`) and units other than
//! `bytes` are rejected, and a multi-range value is read as its first range.

use thiserror::Error;

const BYTES_UNIT: &[u8] = b"bytes=";

/// Parsed Range request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// Start byte position
    pub start: u64,
    /// End byte position, None means until end of file
    pub end: Option<u64>,
}

impl RangeSpec {
    /// Calculate actual end position against a resource size.
    ///
    /// Signed so an open-ended range on an empty resource resolves to `-1`.
    #[inline]
    pub fn end_position(&self, size: u64) -> i128 {
        self.end
            .map_or_else(|| i128::from(size) - 1, i128::from)
    }

    /// Length of the span `start..=end`, negative for descending ranges
    #[inline]
    pub fn content_length(&self, size: u64) -> i128 {
        self.end_position(size) - i128::from(self.start) + 1
    }
}

/// Range header parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Invalid range header: {0:?}")]
    Malformed(String),
}

/// Parse HTTP Range header (single range only, bytes unit)
///
/// Accepted grammar, searched anywhere in the value:
/// `bytes=` (ASCII case-insensitive), optional whitespace, one or more digits,
/// `-`, zero or more digits.
///
/// # Examples
/// ```
/// use rangeserve::http::range::{parse_range_header, RangeSpec};
///
/// let spec = parse_range_header("bytes=0-99").unwrap();
/// assert_eq!(spec, RangeSpec { start: 0, end: Some(99) });
///
/// assert!(parse_range_header("bytes=-20").is_err());
/// ```
pub fn parse_range_header(header: &str) -> Result<RangeSpec, RangeError> {
    let bytes = header.as_bytes();

    // First match wins, like an unanchored pattern search
    (0..bytes.len())
        .filter(|&i| starts_with_unit(&bytes[i..]))
        .find_map(|i| parse_at(&bytes[i + BYTES_UNIT.len()..]))
        .ok_or_else(|| RangeError::Malformed(header.to_string()))
}

fn starts_with_unit(input: &[u8]) -> bool {
    input.len() >= BYTES_UNIT.len() && input[..BYTES_UNIT.len()].eq_ignore_ascii_case(BYTES_UNIT)
}

/// Parse `\s*(\d+)-(\d*)` at the head of `input`
fn parse_at(input: &[u8]) -> Option<RangeSpec> {
    let rest = skip_whitespace(input);

    let (start_digits, rest) = take_digits(rest);
    if start_digits.is_empty() {
        return None;
    }

    let rest = rest.strip_prefix(b"-")?;
    let (end_digits, _) = take_digits(rest);

    let start = parse_u64(start_digits)?;
    let end = if end_digits.is_empty() {
        None // Open-ended range
    } else {
        Some(parse_u64(end_digits)?)
    };

    Some(RangeSpec { start, end })
}

fn skip_whitespace(input: &[u8]) -> &[u8] {
    let n = input
        .iter()
        .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c))
        .count();
    &input[n..]
}

fn take_digits(input: &[u8]) -> (&[u8], &[u8]) {
    let n = input.iter().take_while(|b| b.is_ascii_digit()).count();
    input.split_at(n)
}

/// Digits that overflow u64 do not match
fn parse_u64(digits: &[u8]) -> Option<u64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}
