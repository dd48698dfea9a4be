//! Blocking Client Connection
//!
//! A [`Connection`] owns one stream socket, a write buffer for outgoing
//! command frames, and a read buffer for incoming reply bytes.
//!
//! ## Request Lifecycle
//!
//! ```text
//!   exec(cmd, args)                 pipeline(cmd, args) x N
//!        │                                   │
//!        ▼                                   ▼
//!  ┌─────────────┐                    ┌─────────────┐
//!  │ encode into │                    │ encode into │  state: queued
//!  │ write_buf   │                    │ write_buf   │
//!  └──────┬──────┘                    └──────┬──────┘
//!         │                                  │ commit()
//!         ▼                                  ▼
//!  ┌─────────────────────────────────────────────────┐
//!  │ flush: one write of write_buf, buffer cleared   │  state: idle
//!  └──────────────────────┬──────────────────────────┘
//!                         ▼
//!  ┌─────────────────────────────────────────────────┐
//!  │ read + parse until one complete reply per       │
//!  │ queued command is decoded                       │
//!  └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Buffer Management
//!
//! The write buffer is cleared after every flush, whether the write succeeded
//! or not, so a half-sent command is never replayed. Replies are read in
//! chunks (larger when a bulk header announces a big payload) and located
//! with a resumable scan, then decoded once; bytes past the end of one reply
//! stay in the read buffer for the next.
//!
//! ## Failure
//!
//! A failed read or write, or bytes that are not RESP, leave the connection
//! broken: later commands fail with [`ClientError::Broken`] and never reach
//! the socket. Server error replies do not break it.

use crate::connection::reply::Reply;
use crate::protocol::{encode_command, Arg, EncodeError, ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Size of one socket read while waiting for a reply
const READ_CHUNK_SIZE: usize = 4096;

/// Largest single read when a bulk header has declared more bytes to come
const MAX_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Initial capacity of the write buffer
const INITIAL_WRITE_BUFFER_SIZE: usize = 1024;

/// Errors surfaced by the client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The server closed the connection before a full reply arrived
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// The reply bytes were not valid RESP
    #[error("Parse error: {0}")]
    Protocol(#[from] ParseError),

    /// The command could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The server answered with an error reply; the message is kept verbatim
    #[error("{0}")]
    Server(String),

    /// A typed accessor was called on a reply of another type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The server rejected the AUTH handshake
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Address could not be resolved to a socket address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// An earlier transport or protocol failure left the reply stream out of
    /// step with the commands sent; the connection must be replaced
    #[error("Connection broken by earlier failure: {0}")]
    Broken(#[source] Box<ClientError>),
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }
}

/// Connection settings used by [`connect_with_config`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Password sent with `AUTH` right after connecting.
    pub password: Option<String>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("{}:{}", crate::DEFAULT_HOST, crate::DEFAULT_PORT),
            password: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// A byte stream a [`Connection`] can run over.
///
/// Implemented for `TcpStream`; tests plug in in-memory streams.
pub trait Transport: Read + Write {
    /// Releases the underlying socket. Called by [`Connection::close`].
    ///
    /// There is no default: a stream with nothing to release says so with an
    /// explicit `Ok(())`, and everything else is freed on drop.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// A client connection to a RESP server.
///
/// Not meant to be shared: every operation takes `&mut self`, and the write
/// buffer belongs to this connection alone.
pub struct Connection<S = TcpStream> {
    stream: S,
    write_buf: BytesMut,
    read_buf: BytesMut,
    parser: RespParser,
    /// Commands written to `write_buf` whose replies have not been read
    pending: usize,
    /// Set by the first read or write failure; later commands fail with it
    broken: Option<ClientError>,
}

impl<S: Transport> Connection<S> {
    /// Wraps an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            write_buf: BytesMut::with_capacity(INITIAL_WRITE_BUFFER_SIZE),
            read_buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            parser: RespParser::new(),
            pending: 0,
            broken: None,
        }
    }

    /// Sends one command and waits for its reply.
    ///
    /// Equivalent to [`pipeline`](Self::pipeline) followed by
    /// [`commit`](Self::commit). If commands were already queued they go out
    /// in the same write; their replies are read and dropped so the reply
    /// stream stays aligned.
    pub fn exec(&mut self, cmd: &str, args: &[Arg]) -> Reply {
        if let Err(e) = self.pipeline(cmd, args) {
            return Reply::failed(e.into());
        }

        let mut replies = self.commit();
        if replies.len() > 1 {
            warn!(
                command = cmd,
                discarded = replies.len() - 1,
                "exec flushed queued commands, dropping their replies"
            );
        }
        replies
            .pop()
            .unwrap_or_else(|| Reply::failed(ClientError::UnexpectedEof))
    }

    /// Queues a command without sending it.
    ///
    /// Nothing touches the socket until [`commit`](Self::commit) (or the next
    /// [`exec`](Self::exec)). An encoding error leaves the queue unchanged.
    pub fn pipeline(&mut self, cmd: &str, args: &[Arg]) -> Result<(), EncodeError> {
        encode_command(&mut self.write_buf, cmd, args)?;
        self.pending += 1;
        trace!(
            command = cmd,
            pending = self.pending,
            buffered = self.write_buf.len(),
            "Queued command"
        );
        Ok(())
    }

    /// Sends every queued command in one write and reads one reply per command.
    ///
    /// Replies come back in the order the commands were queued. If the write
    /// fails, every slot carries the write error. If a read fails, the
    /// failing slot and all slots after it carry that error.
    ///
    /// Either failure breaks the connection: a reply still in flight would
    /// otherwise be taken as the answer to a later command. Every later
    /// commit fails with [`ClientError::Broken`] without touching the socket.
    pub fn commit(&mut self) -> Vec<Reply> {
        let expected = std::mem::take(&mut self.pending);
        if expected == 0 {
            return Vec::new();
        }

        if let Some(cause) = &self.broken {
            self.write_buf.clear();
            let err = ClientError::Broken(Box::new(cause.clone()));
            debug!(discarded = expected, "Dropping commands on broken connection");
            return vec![Reply::failed(err); expected];
        }

        if let Err(e) = self.flush() {
            self.mark_broken(&e);
            return vec![Reply::failed(e); expected];
        }

        let mut replies = Vec::with_capacity(expected);
        while replies.len() < expected {
            match self.read_reply() {
                Ok(value) => replies.push(Reply::from(value)),
                Err(e) => {
                    warn!(
                        error = %e,
                        received = replies.len(),
                        expected,
                        "Failed to read reply"
                    );
                    self.mark_broken(&e);
                    replies.resize(expected, Reply::failed(e));
                }
            }
        }
        replies
    }

    /// Number of queued commands not yet committed.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns the failure that broke this connection, if any.
    pub fn broken(&self) -> Option<&ClientError> {
        self.broken.as_ref()
    }

    /// Number of bytes sitting in the write buffer.
    pub fn buffered(&self) -> usize {
        self.write_buf.len()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Closes the connection, dropping any queued commands.
    pub fn close(mut self) -> Result<(), ClientError> {
        if self.pending > 0 {
            warn!(pending = self.pending, "Closing connection with uncommitted commands");
        }
        self.stream.close()?;
        debug!("Connection closed");
        Ok(())
    }

    /// Writes the whole write buffer, then clears it unconditionally.
    fn flush(&mut self) -> Result<(), ClientError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }

        let len = self.write_buf.len();
        let result = self
            .stream
            .write_all(&self.write_buf)
            .and_then(|()| self.stream.flush());
        self.write_buf.clear();

        match result {
            Ok(()) => {
                trace!(bytes = len, "Flushed command buffer");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, bytes = len, "Failed to write command buffer");
                Err(e.into())
            }
        }
    }

    fn mark_broken(&mut self, cause: &ClientError) {
        // Bytes in the read buffer belong to a frame that will never complete.
        self.read_buf.clear();
        self.parser.reset();
        if self.broken.is_none() {
            self.broken = Some(cause.clone());
        }
    }

    /// Reads until one complete reply is buffered, then decodes it.
    ///
    /// The frame is located with the parser's resumable scan first, so a
    /// reply spanning many reads is decoded exactly once.
    fn read_reply(&mut self) -> Result<RespValue, ClientError> {
        loop {
            if let Some(len) = self.parser.frame_len(&self.read_buf)? {
                let value = match self.parser.parse(&self.read_buf[..len])? {
                    Some((value, _)) => value,
                    None => {
                        return Err(ParseError::ProtocolError(
                            "incomplete frame after scan".to_string(),
                        )
                        .into())
                    }
                };
                self.read_buf.advance(len);
                trace!(consumed = len, remaining = self.read_buf.len(), "Parsed reply");
                return Ok(value);
            }
            self.read_more()?;
        }
    }

    fn read_more(&mut self) -> Result<(), ClientError> {
        let start = self.read_buf.len();
        let missing = self.parser.missing();
        if missing > 0 {
            // A bulk header told us how much is coming; allocate once.
            self.read_buf.reserve(missing);
        }
        let chunk = missing.clamp(READ_CHUNK_SIZE, MAX_READ_CHUNK_SIZE);
        self.read_buf.resize(start + chunk, 0);

        let result = loop {
            match self.stream.read(&mut self.read_buf[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        let n = match result {
            Ok(n) => n,
            Err(e) => {
                self.read_buf.truncate(start);
                return Err(e.into());
            }
        };
        self.read_buf.truncate(start + n);

        if n == 0 {
            return Err(ClientError::UnexpectedEof);
        }
        trace!(bytes = n, buffered = self.read_buf.len(), "Read reply data");
        Ok(())
    }
}

impl<S: Transport> Connection<S> {
    /// Sends `AUTH <password>` and checks the server accepted it.
    pub fn auth(&mut self, password: &str) -> Result<(), ClientError> {
        match self.exec("AUTH", &[Arg::from(password)]).text() {
            Ok(_) => Ok(()),
            Err(ClientError::Server(message)) => Err(ClientError::Auth(message)),
            Err(e) => Err(e),
        }
    }
}

/// Connects to a server, authenticating when a password is given.
///
/// # Example
///
/// ```no_run
/// use flashkv_client::{args, connect};
///
/// let mut conn = connect("127.0.0.1:6379", None)?;
/// conn.exec("SET", args!["name", "chia"]).text()?;
/// assert_eq!(conn.exec("GET", args!["name"]).text()?, "chia");
/// conn.close()?;
/// # Ok::<(), flashkv_client::ClientError>(())
/// ```
pub fn connect(addr: &str, password: Option<&str>) -> Result<Connection, ClientError> {
    let config = ClientConfig {
        addr: addr.to_string(),
        password: password.map(str::to_string),
        ..ClientConfig::default()
    };
    connect_with_config(&config)
}

/// Connects using a full [`ClientConfig`].
pub fn connect_with_config(config: &ClientConfig) -> Result<Connection, ClientError> {
    let stream = connect_stream(config)?;
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_write_timeout(config.write_timeout)?;
    // Disable Nagle to keep request latency low for small frames.
    stream.set_nodelay(true)?;

    debug!(addr = %config.addr, "Connected");

    let mut conn = Connection::new(stream);
    if let Some(password) = &config.password {
        conn.auth(password)?;
        debug!(addr = %config.addr, "Authenticated");
    }
    Ok(conn)
}

fn connect_stream(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let addrs: Vec<SocketAddr> = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(e.into()),
        None => Err(ClientError::InvalidAddress(config.addr.clone())),
    }
}
