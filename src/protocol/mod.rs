//! RESP Protocol Implementation
//!
//! The client side of the Redis Serialization Protocol (RESP2).
//!
//! ## Modules
//!
//! - `command`: Frame writer for outgoing commands (array of bulk strings)
//! - `types`: The `RespValue` reply tree
//! - `parser`: Incremental parser for incoming replies
//!
//! ## Example
//!
//! ```
//! use flashkv_client::protocol::{encode_command, parse_message, Arg, RespValue};
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::new();
//! encode_command(&mut buf, "GET", &[Arg::from("name")]).unwrap();
//! assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! let (reply, _) = parse_message(b"$4\r\nchia\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_str(), Some("chia"));
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::{encode_command, Arg, EncodeError};
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
