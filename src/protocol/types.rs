//! Wire-Level Value Types
//!
//! krill's wire protocol is modeled after RESP but deliberately asymmetric:
//!
//! - **Requests** use length-prefixed framing. A request is a bulk string
//!   (`$<len>\r\n<bytes>\r\n`) or an array (`*<n>\r\n` followed by `n`
//!   elements). In practice every command is an array whose first element is
//!   the command name.
//! - **Replies** use simple-string framing for payloads: `+<text>\r\n` for
//!   any successful bulk result (even GET results are *not* length-prefixed),
//!   `-ERR <message>\r\n` for command errors, `:<n>\r\n` for integers and
//!   `#t\r\n`/`#f\r\n` for booleans. Only SMEMBERS replies with an array,
//!   whose members are length-prefixed.
//!
//! Clients must parse replies under these rules; the asymmetry is part of the
//! wire contract, not an implementation detail.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used throughout the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Wire protocol type prefixes
pub mod prefix {
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const SIMPLE: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BOOLEAN: u8 = b'#';
}

/// A decoded request value.
///
/// Bulk strings are the terminal scalar; arrays may nest. The parser
/// guarantees that an array's declared length equals the number of elements
/// actually decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Binary-safe, length-prefixed string: `$<len>\r\n<bytes>\r\n`
    Bulk(Bytes),

    /// Ordered sequence of values: `*<n>\r\n<element1><element2>...`
    Array(Vec<Value>),
}

impl Value {
    /// Creates a bulk value.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Value::Bulk(data.into())
    }

    /// Creates an array value.
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    /// Returns the bulk payload, or `None` for arrays.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Value::Bulk(b) => Some(b),
            Value::Array(_) => None,
        }
    }

    /// Encodes this value in *request* framing.
    ///
    /// Used by tests and client-side tooling; the server itself only decodes
    /// requests.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes this value into an existing buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Bulk(data) => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Value::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.encode_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary, {} bytes)", data.len()),
            },
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A reply produced by the command executor.
///
/// Replies are always well-formed; the executor never propagates an error
/// past its boundary, it returns `Reply::Error` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple-framed payload: `+<text>\r\n`.
    /// Carries OK/PONG as well as bulk results like GET and LPOP output.
    Simple(Bytes),

    /// Command-level error: `-<message>\r\n`
    Error(String),

    /// Integer reply: `:<n>\r\n`
    Integer(i64),

    /// Boolean reply: `#t\r\n` / `#f\r\n`
    Bool(bool),

    /// Member array (SMEMBERS): `*<n>\r\n` then `n` length-prefixed entries
    Members(Vec<Bytes>),
}

impl Reply {
    /// Creates a simple-framed reply.
    pub fn simple(data: impl Into<Bytes>) -> Self {
        Reply::Simple(data.into())
    }

    /// Creates an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// The canonical success reply.
    pub fn ok() -> Self {
        Reply::Simple(Bytes::from_static(b"OK"))
    }

    /// The reply to PING.
    pub fn pong() -> Self {
        Reply::Simple(Bytes::from_static(b"PONG"))
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Simple(data) => {
                buf.push(prefix::SIMPLE);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(message) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(message.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bool(b) => {
                buf.push(prefix::BOOLEAN);
                buf.push(if *b { b't' } else { b'f' });
                buf.extend_from_slice(CRLF);
            }
            Reply::Members(members) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(members.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for member in members {
                    buf.push(prefix::BULK);
                    buf.extend_from_slice(member.len().to_string().as_bytes());
                    buf.extend_from_slice(CRLF);
                    buf.extend_from_slice(member);
                    buf.extend_from_slice(CRLF);
                }
            }
        }
    }
}
