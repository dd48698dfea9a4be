//! Client Connection Module
//!
//! Talks to a RESP server over one blocking stream socket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Connection                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Frame       │───>│ write_buf   │───>│ flush       │──────┼──> socket
//! │  │ writer      │    │ (BytesMut)  │    │ (one write) │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Reply       │<───│ RESP parser │<───│ read_buf    │<─────┼─── socket
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Blocking I/O**: every call waits for the socket; no runtime needed
//! - **Pipelining**: queue commands with `pipeline`, send them with one `commit`
//! - **Framed reads**: replies larger than one read are reassembled
//! - **Errors as values**: transport and server failures come back inside `Reply`
//!
//! ## Example
//!
//! ```no_run
//! use flashkv_client::{args, connect};
//!
//! let mut conn = connect("127.0.0.1:6379", None)?;
//! conn.pipeline("INCR", args!["hits"])?;
//! conn.pipeline("INCR", args!["hits"])?;
//! for reply in conn.commit() {
//!     println!("{}", reply.integer()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod reply;

pub use client::{connect, connect_with_config, ClientConfig, ClientError, Connection, Transport};
pub use reply::Reply;
