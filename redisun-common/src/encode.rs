//! # RESP Encoding
//!
//! Purpose: Write values and commands in their canonical wire form.
//!
//! ## Design Principles
//! 1. **Caller-Owned Buffers**: Everything appends to a `BytesMut` the caller
//!    reuses, so the hot path does not allocate per command.
//! 2. **Pre-Encoded Tokens**: Fixed tokens such as command names are framed
//!    once (`PreEncoded`) and copied verbatim; the bytes are identical to
//!    what `encode_bulk` produces.
//! 3. **No Formatting Machinery**: Integers are written through a small stack
//!    buffer instead of `format!`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::value::{
    RespValue, TAG_ARRAY, TAG_BULK_STRING, TAG_DOUBLE, TAG_INTEGER, TAG_MAP, TAG_NULL,
    TAG_SIMPLE_ERROR, TAG_SIMPLE_STRING,
};

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

impl RespValue {
    /// Encodes the value into a fresh buffer.
    pub fn encode(&self) -> BytesMut {
        let mut out = BytesMut::new();
        self.encode_into(&mut out);
        out
    }

    /// Appends the wire form of the value to `out`.
    ///
    /// Simple strings and errors are written as-is; they must not contain CR or LF.
    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            RespValue::SimpleString(text) => encode_line(TAG_SIMPLE_STRING, text.as_bytes(), out),
            RespValue::SimpleError(text) => encode_line(TAG_SIMPLE_ERROR, text.as_bytes(), out),
            RespValue::Integer(value) => encode_integer(*value, out),
            RespValue::BulkString(data) => encode_bulk(data, out),
            RespValue::Null => {
                out.put_u8(TAG_NULL);
                out.extend_from_slice(CRLF);
            }
            RespValue::Array(items) => {
                encode_header(TAG_ARRAY, items.len(), out);
                for item in items {
                    item.encode_into(out);
                }
            }
            RespValue::Map(pairs) => {
                encode_header(TAG_MAP, pairs.len(), out);
                for (key, value) in pairs {
                    key.encode_into(out);
                    value.encode_into(out);
                }
            }
            RespValue::Double(value) => {
                out.put_u8(TAG_DOUBLE);
                push_double(out, *value);
                out.extend_from_slice(CRLF);
            }
        }
    }
}

/// Encodes a command as a RESP array of bulk strings.
pub fn encode_command<T: AsRef<[u8]>>(args: &[T], out: &mut BytesMut) {
    encode_header(TAG_ARRAY, args.len(), out);
    for arg in args {
        encode_bulk(arg.as_ref(), out);
    }
}

/// Writes `*N\r\n` (or any other `<tag>N\r\n` header).
pub fn encode_header(tag: u8, len: usize, out: &mut BytesMut) {
    out.put_u8(tag);
    push_u64(out, len as u64);
    out.extend_from_slice(CRLF);
}

/// Writes `$len\r\ndata\r\n`.
pub fn encode_bulk(data: &[u8], out: &mut BytesMut) {
    out.reserve(data.len() + 16);
    encode_header(TAG_BULK_STRING, data.len(), out);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

/// Writes `:value\r\n`.
pub fn encode_integer(value: i64, out: &mut BytesMut) {
    out.put_u8(TAG_INTEGER);
    push_i64(out, value);
    out.extend_from_slice(CRLF);
}

fn encode_line(tag: u8, text: &[u8], out: &mut BytesMut) {
    out.put_u8(tag);
    out.extend_from_slice(text);
    out.extend_from_slice(CRLF);
}

fn push_double(out: &mut BytesMut, value: f64) {
    if value.is_nan() {
        out.extend_from_slice(b"nan");
    } else if value.is_infinite() {
        out.extend_from_slice(if value > 0.0 { &b"inf"[..] } else { &b"-inf"[..] });
    } else {
        // Display gives the shortest text that parses back to the same f64.
        out.extend_from_slice(value.to_string().as_bytes());
    }
}

fn push_i64(out: &mut BytesMut, value: i64) {
    if value < 0 {
        out.put_u8(b'-');
    }
    push_u64(out, value.unsigned_abs());
}

fn push_u64(out: &mut BytesMut, mut value: u64) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    buf[..len].reverse();
    out.extend_from_slice(&buf[..len]);
}

/// A bulk-string token framed once and written verbatim afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreEncoded {
    frame: Bytes,
    payload_start: usize,
}

impl PreEncoded {
    /// Frames `token` as `$len\r\ntoken\r\n`.
    pub fn new(token: impl AsRef<[u8]>) -> Self {
        let token = token.as_ref();
        let mut frame = BytesMut::with_capacity(token.len() + 16);
        encode_bulk(token, &mut frame);
        let payload_start = frame.len() - token.len() - CRLF.len();
        PreEncoded {
            frame: frame.freeze(),
            payload_start,
        }
    }

    /// The token itself, without framing.
    pub fn token(&self) -> &[u8] {
        &self.frame[self.payload_start..self.frame.len() - CRLF.len()]
    }

    /// Full wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    /// Appends the framed token to `out`.
    #[inline]
    pub fn write_to(&self, out: &mut BytesMut) {
        out.extend_from_slice(&self.frame);
    }
}
