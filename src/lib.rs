//! # krill — a small in-memory key-value store
//!
//! krill speaks a RESP-style, line-oriented wire protocol over TCP. It
//! stores scalar strings (with integer increment/decrement and time-based
//! expiry), double-ended lists and unordered sets.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  TCP listener (main)                                       │
//! │        │ accept                                            │
//! │        ▼                                                   │
//! │  ConnectionHandler ──> RequestParser ──> CommandExecutor   │
//! │   (task per client)      (protocol)          │             │
//! │                                              ▼             │
//! │                                   Store (one RwLock) <──── │──ExpirySweep
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests are length-prefixed bulk strings and arrays; replies are
//! simple-framed lines (`+`, `-ERR`, `:`, `#t`/`#f`), an asymmetry that is
//! part of the wire contract. String keys may carry an expiry deadline,
//! enforced lazily on access and reclaimed by a periodic background sweep.
//!
//! ## Modules
//!
//! - [`protocol`]: request/reply types and the incremental request parser
//! - [`storage`]: the shared store and the background expiry sweep
//! - [`commands`]: command dispatch, validation and reply production
//! - [`connection`]: per-client serving loops and the live-connection set

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandExecutor;
pub use connection::{handle_connection, ConnectionRegistry};
pub use protocol::{ParseError, Reply, RequestParser, Value};
pub use storage::{start_sweeper, Store, SweepConfig, Sweeper};

/// The default port krill listens on
pub const DEFAULT_PORT: u16 = 6379;

/// The default host krill binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of krill
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
