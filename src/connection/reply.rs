//! Command Replies
//!
//! A [`Reply`] is what every command returns. It holds either the decoded
//! server reply or the transport/protocol failure that prevented one, so a
//! caller always gets a value back and decides at the accessor call how to
//! handle failure.
//!
//! ```text
//!                 Reply
//!                   │
//!        ┌──────────┴──────────┐
//!        ▼                     ▼
//!   RespValue             ClientError
//!   (decoded)        (I/O, EOF, protocol)
//!        │
//!        ├── SimpleString / BulkString ──> text(), bytes()
//!        ├── Integer ───────────────────> integer()
//!        ├── Array ─────────────────────> strings(), values()
//!        ├── Null ──────────────────────> is_nil()
//!        └── Error ─────────────────────> error() / ClientError::Server
//! ```

use crate::connection::client::ClientError;
use crate::protocol::RespValue;
use bytes::Bytes;

/// The result of one command.
#[derive(Debug, Clone)]
pub struct Reply {
    inner: Result<RespValue, ClientError>,
}

impl Reply {
    /// Creates a reply carrying a failure instead of a server value.
    pub fn failed(err: ClientError) -> Self {
        Self { inner: Err(err) }
    }

    /// Returns the value as text.
    ///
    /// Accepts simple strings and bulk strings that hold valid UTF-8.
    pub fn text(&self) -> Result<String, ClientError> {
        match self.checked()? {
            RespValue::SimpleString(s) => Ok(s.clone()),
            RespValue::BulkString(b) => std::str::from_utf8(b)
                .map(str::to_string)
                .map_err(|_| mismatch("text", "binary bulk string")),
            other => Err(mismatch("text", other.kind())),
        }
    }

    /// Returns the raw bytes of a simple or bulk string.
    pub fn bytes(&self) -> Result<Bytes, ClientError> {
        match self.checked()? {
            RespValue::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            RespValue::BulkString(b) => Ok(b.clone()),
            other => Err(mismatch("bytes", other.kind())),
        }
    }

    pub fn integer(&self) -> Result<i64, ClientError> {
        match self.checked()? {
            RespValue::Integer(n) => Ok(*n),
            other => Err(mismatch("integer", other.kind())),
        }
    }

    /// Returns an array reply as a list of strings.
    ///
    /// Fails unless every element is text. Use [`Reply::values`] for arrays
    /// holding integers, nils or nested arrays.
    pub fn strings(&self) -> Result<Vec<String>, ClientError> {
        let items = match self.checked()? {
            RespValue::Array(items) => items,
            other => return Err(mismatch("array", other.kind())),
        };

        items
            .iter()
            .map(|item| match item {
                RespValue::Error(msg) => Err(ClientError::Server(msg.clone())),
                other => other
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch("text", other.kind())),
            })
            .collect()
    }

    /// Returns the elements of an array reply, nested arrays included.
    pub fn values(&self) -> Result<Vec<RespValue>, ClientError> {
        match self.checked()? {
            RespValue::Array(items) => Ok(items.clone()),
            other => Err(mismatch("array", other.kind())),
        }
    }

    /// Returns the error this reply carries, if any.
    ///
    /// Server error replies come back as [`ClientError::Server`] holding the
    /// message verbatim.
    pub fn error(&self) -> Option<ClientError> {
        self.checked().err()
    }

    /// True when the server answered with something other than an error.
    pub fn is_ok(&self) -> bool {
        self.checked().is_ok()
    }

    /// True for a null bulk string or null array (e.g. `GET` on a missing key).
    pub fn is_nil(&self) -> bool {
        matches!(self.inner, Ok(RespValue::Null))
    }

    /// The decoded reply, with server error replies left in the tree.
    pub fn as_result(&self) -> Result<&RespValue, &ClientError> {
        self.inner.as_ref()
    }

    /// Consumes the reply, returning the decoded value or the error it carries.
    pub fn into_value(self) -> Result<RespValue, ClientError> {
        match self.inner {
            Ok(RespValue::Error(msg)) => Err(ClientError::Server(msg)),
            other => other,
        }
    }

    fn checked(&self) -> Result<&RespValue, ClientError> {
        match &self.inner {
            Ok(RespValue::Error(msg)) => Err(ClientError::Server(msg.clone())),
            Ok(value) => Ok(value),
            Err(e) => Err(e.clone()),
        }
    }
}

impl From<RespValue> for Reply {
    fn from(value: RespValue) -> Self {
        Self { inner: Ok(value) }
    }
}

fn mismatch(expected: &'static str, found: &'static str) -> ClientError {
    ClientError::TypeMismatch { expected, found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_message;

    fn reply(wire: &[u8]) -> Reply {
        let (value, _) = parse_message(wire).unwrap().unwrap();
        Reply::from(value)
    }

    #[test]
    fn test_status_reply_text() {
        assert_eq!(reply(b"+OK\r\n").text().unwrap(), "OK");
    }

    #[test]
    fn test_bulk_reply_text_and_bytes() {
        let r = reply(b"$1\r\nv\r\n");
        assert_eq!(r.text().unwrap(), "v");
        assert_eq!(r.bytes().unwrap(), Bytes::from("v"));
    }

    #[test]
    fn test_binary_bulk_is_not_text() {
        let r = reply(b"$2\r\n\xff\xfe\r\n");
        assert!(matches!(
            r.text(),
            Err(ClientError::TypeMismatch { expected: "text", .. })
        ));
        assert_eq!(r.bytes().unwrap(), Bytes::from(&b"\xff\xfe"[..]));
    }

    #[test]
    fn test_integer_reply() {
        let r = reply(b":42\r\n");
        assert_eq!(r.integer().unwrap(), 42);
        assert!(matches!(
            r.text(),
            Err(ClientError::TypeMismatch {
                expected: "text",
                found: "integer"
            })
        ));
    }

    #[test]
    fn test_array_reply_strings() {
        let r = reply(b"*2\r\n$1\r\na\r\n$1\r\nb\r\n");
        assert_eq!(r.strings().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(
            r.integer(),
            Err(ClientError::TypeMismatch {
                expected: "integer",
                found: "array"
            })
        ));
    }

    #[test]
    fn test_nested_array_values() {
        let r = reply(b"*2\r\n$1\r\n0\r\n*1\r\n$1\r\nk\r\n");
        let values = r.values().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_str(), Some("0"));
        assert_eq!(values[1].as_array().unwrap()[0].as_str(), Some("k"));

        assert!(matches!(
            r.strings(),
            Err(ClientError::TypeMismatch {
                expected: "text",
                found: "array"
            })
        ));
    }

    #[test]
    fn test_error_reply() {
        let r = reply(b"-ERR no such key\r\n");

        let err = r.error().unwrap();
        assert_eq!(err.to_string(), "ERR no such key");
        assert!(!r.is_ok());

        // Typed accessors hand back the server error, never a default value.
        assert!(matches!(r.text(), Err(ClientError::Server(ref m)) if m == "ERR no such key"));
        assert!(matches!(r.integer(), Err(ClientError::Server(_))));
        assert!(matches!(r.strings(), Err(ClientError::Server(_))));
        assert!(matches!(r.clone().into_value(), Err(ClientError::Server(_))));
        assert!(r.as_result().unwrap().is_error());
    }

    #[test]
    fn test_nil_reply() {
        let r = reply(b"$-1\r\n");
        assert!(r.is_nil());
        assert!(r.is_ok());
        assert!(r.error().is_none());
        assert!(matches!(
            r.text(),
            Err(ClientError::TypeMismatch {
                expected: "text",
                found: "nil"
            })
        ));
    }

    #[test]
    fn test_failed_reply_forwards_error() {
        let r = Reply::failed(ClientError::UnexpectedEof);
        assert!(matches!(r.text(), Err(ClientError::UnexpectedEof)));
        assert!(matches!(r.integer(), Err(ClientError::UnexpectedEof)));
        assert!(matches!(r.error(), Some(ClientError::UnexpectedEof)));
        assert!(r.as_result().is_err());
        assert!(!r.is_nil());
    }
}
