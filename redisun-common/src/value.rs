//! # RESP Value Model
//!
//! Purpose: Represent every protocol value the client decodes as a single
//! tagged enum.
//!
//! ## Design Principles
//! 1. **Tagged Variant**: One enum, matched by tag, instead of a type per kind.
//! 2. **Binary-Safe**: Bulk strings are raw `Bytes`, never forced into text.
//! 3. **Wire Order**: Map pairs keep the order they arrived in; duplicate keys
//!    are not collapsed.

use bytes::Bytes;

/// `+` simple string.
pub const TAG_SIMPLE_STRING: u8 = b'+';
/// `-` simple error.
pub const TAG_SIMPLE_ERROR: u8 = b'-';
/// `:` integer.
pub const TAG_INTEGER: u8 = b':';
/// `$` bulk string.
pub const TAG_BULK_STRING: u8 = b'$';
/// `*` array.
pub const TAG_ARRAY: u8 = b'*';
/// `_` null (RESP3).
pub const TAG_NULL: u8 = b'_';
/// `,` double (RESP3).
pub const TAG_DOUBLE: u8 = b',';
/// `%` map (RESP3).
pub const TAG_MAP: u8 = b'%';

/// RESP3 tags that are part of the protocol but not decoded here.
pub const UNSUPPORTED_TAGS: [u8; 7] = [b'#', b'(', b'!', b'=', b'~', b'|', b'>'];

/// A fully decoded RESP value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK` style status reply.
    SimpleString(String),
    /// `-ERR ...` reply.
    SimpleError(String),
    /// `:123`.
    Integer(i64),
    /// `$5\r\nhello`.
    BulkString(Bytes),
    /// `_`, `$-1` or `*-1`.
    Null,
    /// `*N` followed by N values.
    Array(Vec<RespValue>),
    /// `%N` followed by N key/value pairs.
    Map(Vec<(RespValue, RespValue)>),
    /// `,1.5`.
    Double(f64),
}

impl RespValue {
    /// Builds a bulk string value.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Builds a simple string value.
    pub fn simple(text: impl Into<String>) -> Self {
        RespValue::SimpleString(text.into())
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::SimpleError(_) => "simple error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
            RespValue::Map(_) => "map",
            RespValue::Double(_) => "double",
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    /// Raw bytes of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::SimpleString(text) => Some(text.as_bytes()),
            RespValue::BulkString(data) => Some(data),
            _ => None,
        }
    }

    /// Text of a simple string, or of a bulk string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(text) => Some(text),
            RespValue::BulkString(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Value of an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Looks up `key` in a map, or in an array of alternating keys and values
    /// (the RESP2 shape of map-like replies). The first match wins.
    pub fn lookup(&self, key: &str) -> Option<&RespValue> {
        match self {
            RespValue::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            RespValue::Array(items) => items
                .chunks_exact(2)
                .find(|pair| pair[0].as_str() == Some(key))
                .map(|pair| &pair[1]),
            _ => None,
        }
    }
}
