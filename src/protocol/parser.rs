//! Incremental RESP Reply Parser
//!
//! Replies arrive over a stream socket, so a single read may hold half a
//! reply, exactly one, or several pipelined replies back to back. The parser
//! therefore never assumes a complete frame:
//!
//! - `Ok(Some((value, consumed)))` - a whole reply was decoded from the first
//!   `consumed` bytes of the buffer
//! - `Ok(None)` - the frame is incomplete, read more bytes and try again
//! - `Err(ParseError)` - the bytes are not valid RESP
//!
//! Bulk strings and arrays are delimited by their declared lengths, never by
//! searching for CRLF inside the payload, so binary values and nested arrays
//! decode correctly.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP reply parser.
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b":42\r\n+OK\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::Integer(42));
/// assert_eq!(consumed, 5);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
    /// Offset up to which the frame being scanned has been walked
    scan_pos: usize,
    /// Elements still expected by each open array, innermost last
    open_arrays: Vec<usize>,
    /// Bytes still missing for the bulk string at `scan_pos`
    missing: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the length of the first complete frame in `buf`, without
    /// building any values.
    ///
    /// Progress is kept between calls: a caller that only appends to `buf`
    /// never walks a completed element twice, however many reads a large
    /// reply takes. Once a frame is reported the scan state starts over; call
    /// [`reset`](Self::reset) if the buffer is discarded mid-frame.
    ///
    /// ```
    /// use flashkv_client::protocol::RespParser;
    ///
    /// let mut parser = RespParser::new();
    /// assert_eq!(parser.frame_len(b"*2\r\n:1\r\n").unwrap(), None);
    /// assert_eq!(parser.frame_len(b"*2\r\n:1\r\n:2\r\n+OK\r\n").unwrap(), Some(12));
    /// ```
    pub fn frame_len(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        self.missing = 0;
        loop {
            if self.open_arrays.len() > MAX_NESTING_DEPTH {
                let err = ParseError::ProtocolError(format!(
                    "maximum nesting depth exceeded: {}",
                    MAX_NESTING_DEPTH
                ));
                self.reset();
                return Err(err);
            }

            let rest = buf.get(self.scan_pos..).unwrap_or_default();
            let (consumed, children) = match self.scan_element(rest) {
                Ok(Some(step)) => step,
                Ok(None) => return Ok(None),
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            };
            self.scan_pos += consumed;

            if let Some(count) = children {
                self.open_arrays.push(count);
                continue;
            }

            // One value finished; close every array it completes.
            loop {
                match self.open_arrays.last_mut() {
                    None => {
                        let len = self.scan_pos;
                        self.reset();
                        return Ok(Some(len));
                    }
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open_arrays.pop();
                    }
                }
            }
        }
    }

    /// Bytes the last [`frame_len`](Self::frame_len) call knows are still
    /// needed to finish a bulk string (0 when unknown).
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// Drops any scan progress.
    pub fn reset(&mut self) {
        self.scan_pos = 0;
        self.open_arrays.clear();
        self.missing = 0;
    }

    /// Walks one element header. Returns the bytes it spans and, for a
    /// non-empty array, how many elements follow.
    fn scan_element(&mut self, buf: &[u8]) -> ParseResult<Option<(usize, Option<usize>)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            prefix::SIMPLE_STRING | prefix::ERROR | prefix::INTEGER => {
                Ok(read_line(buf)?.map(|(_, consumed)| (consumed, None)))
            }
            prefix::BULK_STRING => {
                let (length, header_len) = match read_line(buf)? {
                    Some((line, consumed)) => (parse_i64(line)?, consumed),
                    None => return Ok(None),
                };
                if length == -1 {
                    return Ok(Some((header_len, None)));
                }
                let length = checked_bulk_length(length)?;
                let total_needed = header_len + length + CRLF.len();
                if buf.len() < total_needed {
                    self.missing = total_needed - buf.len();
                    return Ok(None);
                }
                Ok(Some((total_needed, None)))
            }
            prefix::ARRAY => {
                let (count, header_len) = match read_line(buf)? {
                    Some((line, consumed)) => (parse_i64(line)?, consumed),
                    None => return Ok(None),
                };
                match count {
                    -1 | 0 => Ok(Some((header_len, None))),
                    n if n < 0 => Err(ParseError::InvalidArrayLength(n)),
                    n => Ok(Some((header_len, Some(n as usize)))),
                }
            }
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(read_line(buf)?
                .map(|(line, consumed)| (RespValue::SimpleString(line.to_string()), consumed))),
            prefix::ERROR => Ok(read_line(buf)?
                .map(|(line, consumed)| (RespValue::Error(line.to_string()), consumed))),
            prefix::INTEGER => match read_line(buf)? {
                Some((line, consumed)) => Ok(Some((RespValue::Integer(parse_i64(line)?), consumed))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header_len) = match read_line(buf)? {
            Some((line, consumed)) => (parse_i64(line)?, consumed),
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        let length = checked_bulk_length(length)?;

        let total_needed = header_len + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match read_line(buf)? {
            Some((line, consumed)) => (parse_i64(line)?, consumed),
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        // Cap the preallocation; the count comes straight off the wire.
        let mut elements = Vec::with_capacity((count as usize).min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Reads the line after the prefix byte.
///
/// Returns the line (without prefix and CRLF) and the bytes consumed
/// including both.
fn read_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line, 1 + pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

/// Rejects negative (other than null) and oversized bulk lengths.
fn checked_bulk_length(length: i64) -> ParseResult<usize> {
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }
    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }
    Ok(length)
}

fn parse_i64(line: &str) -> ParseResult<i64> {
    line.parse()
        .map_err(|_| ParseError::InvalidInteger(line.to_string()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single RESP message from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
