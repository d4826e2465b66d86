//! Connection Management
//!
//! Accepts nothing itself — the listener lives in `main` — but owns
//! everything that happens after `accept()`: one task per client running a
//! buffered read-decode-execute-write loop, plus the registry of live
//! connections.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionRegistry};
