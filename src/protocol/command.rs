//! Command Frame Writer
//!
//! Every command goes over the wire as an array of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<len(cmd)>\r\n<cmd>\r\n
//! $<len(arg1)>\r\n<arg1>\r\n
//! ...
//! ```
//!
//! `N` counts the command name plus its arguments. Lengths are byte lengths
//! for every argument kind, and numbers are sent as their decimal text.
//!
//! Encoding appends to a caller-owned buffer and never touches the socket,
//! which is what lets a connection queue several commands and send them with
//! one write.

use crate::protocol::types::{prefix, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use std::any::Any;
use thiserror::Error;

/// Errors raised while encoding a command frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    /// The command name was empty
    #[error("empty command name")]
    EmptyCommand,

    /// NaN and infinities have no decimal form a server will accept
    #[error("non-finite float argument: {0}")]
    NonFiniteFloat(f64),

    /// A dynamically typed argument was not one of the supported scalar types
    #[error("unsupported argument type: {0}")]
    UnsupportedType(&'static str),
}

/// A single command argument.
///
/// Anything convertible with `Into<Arg>` can be passed to
/// [`encode_command`] or the connection methods: text, bytes, 32/64-bit
/// signed integers and 32/64-bit floats.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Bytes(Bytes),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Arg {
    /// Converts a value whose type is only known to be `'static` into an
    /// argument.
    ///
    /// Types outside the supported set return
    /// [`EncodeError::UnsupportedType`] naming the type.
    ///
    /// ```
    /// use flashkv_client::{Arg, EncodeError};
    ///
    /// assert_eq!(Arg::from_any(&7i32), Ok(Arg::Int32(7)));
    /// assert_eq!(Arg::from_any(&true), Err(EncodeError::UnsupportedType("bool")));
    /// ```
    pub fn from_any<T: Any>(value: &T) -> Result<Arg, EncodeError> {
        Self::downcast(value).ok_or(EncodeError::UnsupportedType(std::any::type_name::<T>()))
    }

    /// Converts a type-erased value, e.g. from a `Vec<Box<dyn Any>>`.
    ///
    /// The concrete type's name is gone once erased, so an unsupported value
    /// is reported as `dyn Any`.
    pub fn from_dyn(value: &dyn Any) -> Result<Arg, EncodeError> {
        Self::downcast(value).ok_or(EncodeError::UnsupportedType("dyn Any"))
    }

    fn downcast(value: &dyn Any) -> Option<Arg> {
        if let Some(s) = value.downcast_ref::<String>() {
            Some(Arg::Str(s.clone()))
        } else if let Some(s) = value.downcast_ref::<&str>() {
            Some(Arg::Str((*s).to_string()))
        } else if let Some(b) = value.downcast_ref::<Vec<u8>>() {
            Some(Arg::Bytes(Bytes::copy_from_slice(b)))
        } else if let Some(b) = value.downcast_ref::<&[u8]>() {
            Some(Arg::Bytes(Bytes::copy_from_slice(b)))
        } else if let Some(b) = value.downcast_ref::<Bytes>() {
            Some(Arg::Bytes(b.clone()))
        } else if let Some(n) = value.downcast_ref::<i32>() {
            Some(Arg::Int32(*n))
        } else if let Some(n) = value.downcast_ref::<i64>() {
            Some(Arg::Int64(*n))
        } else if let Some(f) = value.downcast_ref::<f32>() {
            Some(Arg::Float32(*f))
        } else {
            value.downcast_ref::<f64>().map(|f| Arg::Float64(*f))
        }
    }

    /// Appends this argument as a bulk string.
    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            Arg::Str(s) => put_bulk(buf, s.as_bytes()),
            Arg::Bytes(b) => put_bulk(buf, b),
            Arg::Int32(n) => put_bulk(buf, n.to_string().as_bytes()),
            Arg::Int64(n) => put_bulk(buf, n.to_string().as_bytes()),
            Arg::Float32(f) => {
                if !f.is_finite() {
                    return Err(EncodeError::NonFiniteFloat(*f as f64));
                }
                put_bulk(buf, f.to_string().as_bytes())
            }
            Arg::Float64(f) => {
                if !f.is_finite() {
                    return Err(EncodeError::NonFiniteFloat(*f));
                }
                put_bulk(buf, f.to_string().as_bytes())
            }
        }
        Ok(())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Str(s.clone())
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(b: &[u8; N]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg::Bytes(b)
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Arg::Int32(n)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Int64(n)
    }
}

impl From<f32> for Arg {
    fn from(f: f32) -> Self {
        Arg::Float32(f)
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float64(f)
    }
}

/// Appends one command frame to `buf`.
///
/// On error the buffer is truncated back to its length before the call, so a
/// failed encode never leaves half a frame queued.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use flashkv_client::protocol::{encode_command, Arg};
///
/// let mut buf = BytesMut::new();
/// encode_command(&mut buf, "SET", &[Arg::from("k"), Arg::from(10i64)]).unwrap();
/// assert_eq!(&buf[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$2\r\n10\r\n");
/// ```
pub fn encode_command(buf: &mut BytesMut, cmd: &str, args: &[Arg]) -> Result<(), EncodeError> {
    if cmd.is_empty() {
        return Err(EncodeError::EmptyCommand);
    }

    let mark = buf.len();
    buf.put_u8(prefix::ARRAY);
    put_decimal(buf, args.len() + 1);
    buf.put_slice(CRLF);
    put_bulk(buf, cmd.as_bytes());

    for arg in args {
        if let Err(e) = arg.encode_into(buf) {
            buf.truncate(mark);
            return Err(e);
        }
    }
    Ok(())
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(data.len() + 16);
    buf.put_u8(prefix::BULK_STRING);
    put_decimal(buf, data.len());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

fn put_decimal(buf: &mut BytesMut, value: usize) {
    buf.put_slice(value.to_string().as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parser::parse_message;
    use crate::protocol::types::RespValue;

    fn encode(cmd: &str, args: &[Arg]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, cmd, args).unwrap();
        buf
    }

    /// Decodes a command frame back into its bulk-string parts.
    fn decode_parts(frame: &[u8]) -> Vec<Vec<u8>> {
        let (value, consumed) = parse_message(frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        value
            .into_array()
            .unwrap()
            .into_iter()
            .map(|v| match v {
                RespValue::BulkString(b) => b.to_vec(),
                other => panic!("expected bulk string, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_encode_command_without_args() {
        assert_eq!(&encode("PING", &[])[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_encode_set() {
        let buf = encode("SET", &["name".into(), "chia".into()]);
        assert_eq!(&buf[..], b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nchia\r\n");
    }

    #[test]
    fn test_multibyte_text_uses_byte_length() {
        // "héllo" is five characters but six bytes.
        let buf = encode("SET", &["k".into(), "héllo".into()]);
        assert_eq!(
            &buf[..],
            "*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\nhéllo\r\n".as_bytes()
        );
    }

    #[test]
    fn test_numbers_are_decimal_text() {
        let buf = encode(
            "CMD",
            &[
                Arg::from(-7i32),
                Arg::from(9_000_000_000i64),
                Arg::from(1.5f32),
                Arg::from(0.1f64),
            ],
        );
        assert_eq!(
            decode_parts(&buf),
            vec![
                b"CMD".to_vec(),
                b"-7".to_vec(),
                b"9000000000".to_vec(),
                b"1.5".to_vec(),
                b"0.1".to_vec(),
            ]
        );
    }

    #[test]
    fn test_roundtrip_all_argument_kinds() {
        let args = vec![
            Arg::from("text"),
            Arg::from("ünïcödé"),
            Arg::from(&b"\x00\xff\r\n"[..]),
            Arg::from(Vec::from(&b"raw"[..])),
            Arg::from(i32::MIN),
            Arg::from(i64::MAX),
            Arg::from(-2.25f32),
            Arg::from(1e-3f64),
        ];
        let buf = encode("MIXED", &args);
        let parts = decode_parts(&buf);

        assert_eq!(parts.len(), args.len() + 1);
        assert_eq!(parts[0], b"MIXED");
        assert_eq!(parts[1], b"text");
        assert_eq!(parts[2], "ünïcödé".as_bytes());
        assert_eq!(parts[3], b"\x00\xff\r\n");
        assert_eq!(parts[4], b"raw");
        assert_eq!(parts[5], i32::MIN.to_string().as_bytes());
        assert_eq!(parts[6], i64::MAX.to_string().as_bytes());
        assert_eq!(std::str::from_utf8(&parts[7]).unwrap().parse::<f32>().unwrap(), -2.25);
        assert_eq!(std::str::from_utf8(&parts[8]).unwrap().parse::<f64>().unwrap(), 1e-3);
    }

    #[test]
    fn test_frames_accumulate() {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, "SET", &["a".into(), "1".into()]).unwrap();
        encode_command(&mut buf, "GET", &["a".into()]).unwrap();
        assert_eq!(
            &buf[..],
            &b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n"[..]
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut buf = BytesMut::new();
        assert_eq!(
            encode_command(&mut buf, "", &[]),
            Err(EncodeError::EmptyCommand)
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_non_finite_float_rolls_back() {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, "PING", &[]).unwrap();
        let before = buf.clone();

        let result = encode_command(&mut buf, "SET", &["k".into(), f64::NAN.into()]);
        assert!(matches!(result, Err(EncodeError::NonFiniteFloat(f)) if f.is_nan()));
        assert_eq!(buf, before);

        let result = encode_command(&mut buf, "SET", &["k".into(), f32::INFINITY.into()]);
        assert_eq!(result, Err(EncodeError::NonFiniteFloat(f64::INFINITY)));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_from_any() {
        let values: Vec<Box<dyn Any>> = vec![
            Box::new(String::from("s")),
            Box::new(5i64),
            Box::new(2.5f64),
            Box::new(vec![1u8, 2]),
        ];
        let args: Vec<Arg> = values
            .iter()
            .map(|v| Arg::from_dyn(v.as_ref()).unwrap())
            .collect();
        assert_eq!(
            args,
            vec![
                Arg::Str("s".to_string()),
                Arg::Int64(5),
                Arg::Float64(2.5),
                Arg::Bytes(Bytes::from(vec![1u8, 2])),
            ]
        );
    }

    #[test]
    fn test_from_any_names_unsupported_type() {
        assert_eq!(Arg::from_any(&"text"), Ok(Arg::Str("text".to_string())));

        let err = Arg::from_any(&vec![1u16]).unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedType(name) if name.ends_with("Vec<u16>")));
        assert!(err.to_string().starts_with("unsupported argument type: "));
    }

    #[test]
    fn test_from_dyn_unsupported() {
        let value: Box<dyn Any> = Box::new(true);
        assert_eq!(
            Arg::from_dyn(value.as_ref()),
            Err(EncodeError::UnsupportedType("dyn Any"))
        );
    }
}
