//! Incremental Request Parser
//!
//! Decodes the length-prefixed request side of the wire protocol. The parser
//! is buffer-oriented: the connection layer appends raw socket bytes to a
//! buffer and calls [`RequestParser::parse`], which returns
//!
//! - `Ok(Some((value, consumed)))` — a complete request was decoded,
//!   `consumed` bytes of the buffer belong to it
//! - `Ok(None)` — the buffer holds a prefix of a valid request; read more
//! - `Err(ParseError)` — the stream is malformed and the connection can no
//!   longer be trusted
//!
//! Only `$` (bulk string) and `*` (array) may lead a request. Reply-side
//! prefixes (`+`, `-`, `:`, `#`) or anything else are protocol errors, not
//! inline commands.
//!
//! End-of-stream is not visible at this layer. When the socket closes while
//! a request is incomplete, the connection layer reports that as a disconnect
//! error, which is a normal hangup rather than a client bug.

use crate::protocol::types::{prefix, Value, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that make a request stream undecodable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A request led with a byte other than `$` or `*`
    #[error("unexpected type byte: {0:#04x}")]
    UnexpectedPrefix(u8),

    /// A length line was not a base-10 integer
    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    /// A length line held a negative number
    #[error("negative length: {0}")]
    NegativeLength(i64),

    /// A bulk payload was not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// A bulk length exceeded the hard cap
    #[error("bulk string too large: {size} bytes (max {max})")]
    BulkTooLarge { size: usize, max: usize },

    /// Arrays nested beyond the supported depth
    #[error("array nesting too deep (max {0})")]
    NestingTooDeep(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevents stack overflow on hostile input)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental request parser.
///
/// One instance lives per connection; it carries no buffered state between
/// calls, only the recursion depth guard.
#[derive(Debug, Default)]
pub struct RequestParser {
    depth: usize,
}

impl RequestParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to decode one request value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        match buf[0] {
            prefix::BULK => self.parse_bulk(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnexpectedPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::BULK);

        let (length, data_start) = match read_length(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if length > MAX_BULK_SIZE {
            return Err(ParseError::BulkTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        // Payload plus its mandatory trailing CRLF
        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..data_start + length + 2] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((Value::Bulk(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, mut consumed) = match read_length(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let mut elements = Vec::with_capacity(count.min(64));

        self.depth += 1;

        for _ in 0..count {
            if consumed >= buf.len() {
                return Ok(None);
            }

            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((Value::Array(elements), consumed)))
    }
}

/// Reads the `<n>\r\n` line that follows a type prefix.
///
/// Returns `Some((n, bytes_consumed))` once the line is complete, `None` if
/// the CRLF has not arrived yet.
fn read_length(buf: &[u8]) -> ParseResult<Option<(usize, usize)>> {
    let line_end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let line = &buf[1..1 + line_end];
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::InvalidLength(String::from_utf8_lossy(line).into_owned()))?;

    let n: i64 = text
        .parse()
        .map_err(|_| ParseError::InvalidLength(text.to_string()))?;

    if n < 0 {
        return Err(ParseError::NegativeLength(n));
    }

    // prefix byte + digits + CRLF
    Ok(Some((n as usize, 1 + line_end + 2)))
}

/// Finds the position of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single request from bytes.
///
/// Convenience wrapper for tests and one-shot use.
pub fn decode(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
    RequestParser::new().parse(buf)
}
