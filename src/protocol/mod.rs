//! Wire Protocol
//!
//! RESP-style codec for krill. Requests and replies do not share a framing:
//! requests are length-prefixed bulk strings and arrays, replies are
//! simple-framed lines (see [`types`] for the full contract).
//!
//! - [`types`]: the request [`Value`] and reply [`Reply`] types plus encoding
//! - [`parser`]: the incremental request decoder used by the connection layer

pub mod parser;
pub mod types;

pub use parser::{decode, ParseError, ParseResult, RequestParser};
pub use types::{Reply, Value};
