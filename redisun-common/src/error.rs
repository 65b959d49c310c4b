//! # Protocol Errors
//!
//! Purpose: Name every way a RESP byte stream can be malformed.
//!
//! Any of these leaves the framing of the stream undefined, so the owning
//! connection must be discarded once one is raised.

use thiserror::Error;

/// Result type for codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Malformed or unsupported bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Tag byte outside the RESP type set.
    #[error("unknown type byte {0:#04x}")]
    UnknownType(u8),
    /// RESP3 type that this decoder does not handle (`#`, `(`, `!`, `=`, `~`, `|`, `>`).
    #[error("unsupported RESP3 type '{}'", *.0 as char)]
    UnsupportedType(u8),
    /// Non-digit byte inside a length or integer token.
    #[error("invalid digit {0:#04x} in length or integer")]
    InvalidDigit(u8),
    /// Length or integer token with no digits.
    #[error("empty length or integer")]
    EmptyNumber,
    /// Integer token does not fit in an i64.
    #[error("integer overflow")]
    Overflow,
    /// Negative length other than the null sentinel, or a length above the limit.
    #[error("invalid length {0}")]
    InvalidLength(i64),
    /// Expected CRLF was not found.
    #[error("missing CRLF terminator")]
    MissingTerminator,
    /// CR or LF inside a simple string, error, or double line.
    #[error("bare CR or LF inside a line")]
    BareLineBreak,
    /// Line payload is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
    /// Double line does not parse as a float.
    #[error("invalid double {0:?}")]
    InvalidDouble(String),
    /// Aggregates nested deeper than the decoder allows.
    #[error("aggregate nesting deeper than {0} levels")]
    TooDeep(usize),
    /// A reply arrived while no request was waiting for one.
    #[error("unsolicited response with no pending request")]
    Unsolicited,
}
