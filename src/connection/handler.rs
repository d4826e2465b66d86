//! Connection Handling
//!
//! Every accepted client gets its own tokio task running a blocking
//! read-decode-execute-write loop:
//!
//! ```text
//! read socket bytes ─> buffer ─> decode request ─> execute ─> write reply
//!         ▲                                                      │
//!         └──────────────────────────────────────────────────────┘
//! ```
//!
//! TCP is a stream, so a single read may carry a partial request or several
//! requests; a `BytesMut` buffer accumulates bytes and the incremental
//! parser consumes complete requests from its front.
//!
//! ## Error discipline
//!
//! Command-level failures become `-ERR` replies and the loop continues.
//! Protocol-level failures (malformed framing) poison the stream position,
//! so they terminate the connection. End-of-stream mid-request is a
//! disconnect, reported separately from malformed input because it is a
//! normal hangup rather than a client bug.
//!
//! ## Registry
//!
//! Live connections are tracked in a [`ConnectionRegistry`]. Its lock is
//! taken only for the register/deregister instant — never for the lifetime
//! of a connection, which would serialize all clients against each other.
//! Deregistration runs on every termination path.

use crate::commands::CommandExecutor;
use crate::protocol::{ParseError, Reply, RequestParser, Value};
use bytes::BytesMut;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// The set of live connections.
///
/// Exists for introspection and future shutdown support. The inner lock is
/// scoped strictly to the register/deregister instant.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    accepted: AtomicU64,
    conns: Mutex<HashMap<u64, SocketAddr>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection and returns its id.
    pub fn register(&self, addr: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.conns.lock().unwrap().insert(id, addr);
        id
    }

    /// Removes a connection; called on every termination path.
    pub fn deregister(&self, id: u64) {
        self.conns.lock().unwrap().remove(&id);
    }

    /// Number of currently live connections.
    pub fn active(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    /// Total connections accepted since startup.
    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

/// Errors that end a connection's serving loop.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O failure on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request framing; the stream position is untrustworthy
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The client closed the connection between requests
    #[error("client disconnected")]
    Disconnected,

    /// The stream ended in the middle of a request
    #[error("connection closed mid-request")]
    UnexpectedEof,

    /// A single request outgrew the read buffer
    #[error("request exceeds buffer limit")]
    BufferFull,
}

/// Serves a single client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    executor: CommandExecutor,
    parser: RequestParser,
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl ConnectionHandler {
    /// Creates a handler and registers the connection.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        executor: CommandExecutor,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let id = registry.register(addr);

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            executor,
            parser: RequestParser::new(),
            registry,
            id,
        }
    }

    /// Runs the serving loop to completion and deregisters the connection.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, active = self.registry.active(), "Client connected");

        let result = self.serve_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.registry.deregister(self.id);
        result
    }

    /// The read-decode-execute-write loop.
    async fn serve_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(request) = self.try_parse_request()? {
                if let Some(reply) = self.dispatch(request) {
                    self.send_reply(&reply).await?;
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Interprets one decoded request.
    ///
    /// Commands arrive as a non-empty array whose first element is the
    /// command name; anything else is logged and skipped without a reply,
    /// and the connection keeps serving.
    fn dispatch(&self, request: Value) -> Option<Reply> {
        let items = match request {
            Value::Array(items) => items,
            Value::Bulk(_) => {
                warn!(client = %self.addr, "Ignoring non-array request");
                return None;
            }
        };

        let (first, args) = match items.split_first() {
            Some(split) => split,
            None => {
                warn!(client = %self.addr, "Ignoring empty request array");
                return None;
            }
        };

        // A non-bulk name falls through to the unknown-command reply
        let name = first
            .as_bulk()
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or("");

        trace!(client = %self.addr, command = %name, args = args.len(), "Executing command");
        Some(self.executor.execute(name, args))
    }

    /// Attempts to decode one request from the front of the buffer.
    fn try_parse_request(&mut self) -> Result<Option<Value>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Malformed request, closing connection");
                Err(ConnectionError::Protocol(e))
            }
        }
    }

    /// Reads more bytes from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Request buffer limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::Disconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    /// Writes one reply to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Serves a client connection to completion.
///
/// Convenience entry point for the accept loop; errors are logged here and
/// never escalate past the connection's task.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    executor: CommandExecutor,
    registry: Arc<ConnectionRegistry>,
) {
    let handler = ConnectionHandler::new(stream, addr, executor, registry);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::Disconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
