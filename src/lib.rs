//! # FlashKV Client - A Blocking RESP Client with Pipelining
//!
//! A small synchronous client for FlashKV and any other server speaking the
//! Redis Serialization Protocol (RESP2).
//!
//! ## Features
//!
//! - **Redis-Compatible**: Commands go out as RESP arrays of bulk strings
//! - **Typed Arguments**: Text, bytes, `i32`/`i64` and `f32`/`f64` arguments
//! - **Pipelining**: Queue commands and send them in a single write
//! - **Full Reply Decoding**: Nested arrays, nulls, and replies of any size
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           FlashKV Client                                │
//! │                                                                         │
//! │   exec / pipeline                                                       │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Frame     │───>│ Connection  │───>│  TCP socket │                  │
//! │  │   Writer    │    │ (write_buf) │    │             │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐                  │
//! │   Reply  <──────────│    RESP     │<───│  read_buf   │                  │
//! │                     │   Parser    │    │             │                  │
//! │                     └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashkv_client::{args, connect};
//!
//! let mut conn = connect("127.0.0.1:6379", None)?;
//!
//! // One command, one round trip
//! conn.exec("SET", args!["name", "chia"]).text()?;
//! let name = conn.exec("GET", args!["name"]).text()?;
//! assert_eq!(name, "chia");
//!
//! // Several commands, one write
//! conn.pipeline("INCR", args!["visits"])?;
//! conn.pipeline("EXPIRE", args!["visits", 60i64])?;
//! let replies = conn.commit();
//! assert_eq!(replies.len(), 2);
//!
//! conn.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Command frame writer, reply types and reply parser
//! - [`connection`]: The blocking connection, `connect`, and `Reply`
//!
//! ## Error Model
//!
//! Runtime failures (socket errors, a server `-ERR` reply, malformed reply
//! bytes) are carried inside the returned [`Reply`] and surface when a typed
//! accessor such as [`Reply::text`] is called. Asking for the wrong type
//! fails with [`ClientError::TypeMismatch`] instead of returning a default.

pub mod connection;
pub mod protocol;

pub use connection::{
    connect, connect_with_config, ClientConfig, ClientError, Connection, Reply, Transport,
};
pub use protocol::{Arg, EncodeError, ParseError, RespValue};

/// Builds an argument slice for [`Connection::exec`] and
/// [`Connection::pipeline`], converting each element with `Arg::from`.
///
/// ```
/// use flashkv_client::{args, Arg};
///
/// let a: &[Arg] = args!["key", 10i64, 0.5f64, b"raw"];
/// assert_eq!(a.len(), 4);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        &[$($crate::protocol::Arg::from($arg)),*]
    };
}

/// The default port FlashKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host the client connects to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
