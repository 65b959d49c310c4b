//! # Resumable RESP Decoding
//!
//! Purpose: Turn an arbitrarily fragmented byte stream into `RespValue`s
//! without ever blocking or re-reading bytes.
//!
//! ## Design Principles
//! 1. **Explicit Cursor**: All progress lives in a `DecodeState`; a call that
//!    runs out of bytes returns `None` and the next call picks up exactly
//!    where it stopped, even mid-token or mid-CRLF.
//! 2. **Forward Only**: Bytes are consumed through `bytes::Buf` and never
//!    looked at twice, so 1-byte fragments decode the same as whole frames.
//! 3. **Tag Dispatch**: The type tag selects the state to enter; there is no
//!    per-type decoder object.
//! 4. **Fail Fast**: Any framing violation is a `ProtocolError`; the cursor is
//!    dropped because the stream position is no longer meaningful.
//!
//! ## State Flow
//!
//! ```text
//! AwaitingHeader --tag--> AwaitingLine ----------------------> value
//!                    |--> AwaitingLength --$--> AwaitingBody --> AwaitingTerminator --> value
//!                    |                    |--*/%--> AwaitingChild (child cursor, at most MAX_DEPTH deep)
//!                    |                    `--:--> value
//!                    `--> AwaitingTerminator (`_`) ---------> value
//! ```

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use crate::value::{
    RespValue, TAG_ARRAY, TAG_BULK_STRING, TAG_DOUBLE, TAG_INTEGER, TAG_MAP, TAG_NULL,
    TAG_SIMPLE_ERROR, TAG_SIMPLE_STRING, UNSUPPORTED_TAGS,
};

/// Largest bulk string accepted (matches the server's proto-max-bulk-len default).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Upper bound on buffer space reserved up front from an untrusted length.
const MAX_PREALLOC: usize = 64 * 1024;

/// Deepest aggregate nesting accepted. Each level is one child cursor, so
/// this also bounds the recursion in `advance` and in dropping a cursor.
pub const MAX_DEPTH: usize = 512;

/// Length sentinel meaning "null" for bulk strings and arrays.
const NULL_LENGTH: i64 = -1;

/// What a length/integer token introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    /// `:` integer reply; the number is the value.
    Integer,
    /// `$` bulk string byte count.
    BulkLength,
    /// `*` element count.
    ArrayLength,
    /// `%` pair count.
    MapLength,
}

/// Which CRLF-terminated line is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `+` simple string.
    Simple,
    /// `-` simple error.
    Error,
    /// `,` double.
    Double,
}

/// Aggregate shape being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// Children are the elements.
    Array,
    /// Children alternate key, value.
    Map,
}

/// Partially accumulated ASCII integer (`v = v * 10 + digit`).
#[derive(Debug, Default)]
pub struct Digits {
    value: i64,
    negative: bool,
    sign_seen: bool,
    count: u32,
    cr: bool,
}

impl Digits {
    /// Consumes bytes through the closing CRLF.
    ///
    /// `-` is always accepted as a leading sign (lengths use it for the null
    /// sentinel); `+` only when `allow_plus` is set.
    fn feed<B: Buf>(&mut self, src: &mut B, allow_plus: bool) -> ProtocolResult<Option<i64>> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if self.cr {
                if byte != b'\n' {
                    return Err(ProtocolError::MissingTerminator);
                }
                if self.count == 0 {
                    return Err(ProtocolError::EmptyNumber);
                }
                return Ok(Some(self.value));
            }
            match byte {
                b'0'..=b'9' => {
                    let digit = i64::from(byte - b'0');
                    // Accumulate toward the sign so i64::MIN stays representable.
                    self.value = self
                        .value
                        .checked_mul(10)
                        .and_then(|v| {
                            if self.negative {
                                v.checked_sub(digit)
                            } else {
                                v.checked_add(digit)
                            }
                        })
                        .ok_or(ProtocolError::Overflow)?;
                    self.count += 1;
                }
                b'-' if !self.sign_seen && self.count == 0 => {
                    self.negative = true;
                    self.sign_seen = true;
                }
                b'+' if allow_plus && !self.sign_seen && self.count == 0 => {
                    self.sign_seen = true;
                }
                b'\r' => self.cr = true,
                other => return Err(ProtocolError::InvalidDigit(other)),
            }
        }
        Ok(None)
    }
}

/// Resumable cursor for one in-flight value.
#[derive(Debug)]
pub enum DecodeState {
    /// Waiting for the type tag byte.
    AwaitingHeader,
    /// Reading a length or integer token.
    AwaitingLength { kind: NumberKind, digits: Digits },
    /// Reading a simple string, error, or double line.
    AwaitingLine { kind: LineKind, line: Vec<u8>, cr: bool },
    /// Copying bulk payload; `remaining` bytes still to come.
    AwaitingBody { data: BytesMut, remaining: usize },
    /// Payload is complete; waiting for its CRLF.
    AwaitingTerminator { value: RespValue, cr: bool },
    /// Decoding child `items.len()` of `total` through `child`.
    AwaitingChild {
        kind: AggregateKind,
        total: usize,
        items: Vec<RespValue>,
        child: Box<DecodeState>,
    },
}

/// Outcome of reading a length token.
enum Step {
    Done(RespValue),
    Next(DecodeState),
}

impl Default for DecodeState {
    fn default() -> Self {
        DecodeState::AwaitingHeader
    }
}

impl DecodeState {
    /// Index of the child currently being decoded, when inside an aggregate.
    pub fn child_index(&self) -> Option<usize> {
        match self {
            DecodeState::AwaitingChild { items, .. } => Some(items.len()),
            _ => None,
        }
    }

    /// Advances the cursor over `src`.
    ///
    /// Returns the value once it is complete, or `None` when `src` ran out
    /// first. After a value is returned the state is spent and must be replaced.
    pub fn advance<B: Buf>(&mut self, src: &mut B) -> ProtocolResult<Option<RespValue>> {
        self.advance_at(src, 0)
    }

    /// `depth` is the number of aggregates enclosing this cursor.
    fn advance_at<B: Buf>(
        &mut self,
        src: &mut B,
        depth: usize,
    ) -> ProtocolResult<Option<RespValue>> {
        loop {
            let next = match self {
                DecodeState::AwaitingHeader => {
                    if !src.has_remaining() {
                        return Ok(None);
                    }
                    Self::from_tag(src.get_u8())?
                }
                DecodeState::AwaitingLength { kind, digits } => {
                    let allow_plus = *kind == NumberKind::Integer;
                    let Some(number) = digits.feed(src, allow_plus)? else {
                        return Ok(None);
                    };
                    match Self::after_length(*kind, number, depth)? {
                        Step::Done(value) => return Ok(Some(value)),
                        Step::Next(state) => state,
                    }
                }
                DecodeState::AwaitingLine { kind, line, cr } => {
                    if !read_line(src, line, cr)? {
                        return Ok(None);
                    }
                    return finish_line(*kind, std::mem::take(line)).map(Some);
                }
                DecodeState::AwaitingBody { data, remaining } => {
                    while *remaining > 0 && src.has_remaining() {
                        let chunk = src.chunk();
                        let take = chunk.len().min(*remaining);
                        data.extend_from_slice(&chunk[..take]);
                        src.advance(take);
                        *remaining -= take;
                    }
                    if *remaining > 0 {
                        return Ok(None);
                    }
                    DecodeState::AwaitingTerminator {
                        value: RespValue::BulkString(std::mem::take(data).freeze()),
                        cr: false,
                    }
                }
                DecodeState::AwaitingTerminator { value, cr } => {
                    if !read_crlf(src, cr)? {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::replace(value, RespValue::Null)));
                }
                DecodeState::AwaitingChild {
                    kind,
                    total,
                    items,
                    child,
                } => {
                    let Some(value) = child.advance_at(src, depth + 1)? else {
                        return Ok(None);
                    };
                    items.push(value);
                    if items.len() == *total {
                        return Ok(Some(finish_aggregate(*kind, std::mem::take(items))));
                    }
                    **child = DecodeState::AwaitingHeader;
                    continue;
                }
            };
            *self = next;
        }
    }

    fn from_tag(tag: u8) -> ProtocolResult<DecodeState> {
        let line = |kind| DecodeState::AwaitingLine {
            kind,
            line: Vec::new(),
            cr: false,
        };
        let number = |kind| DecodeState::AwaitingLength {
            kind,
            digits: Digits::default(),
        };
        Ok(match tag {
            TAG_SIMPLE_STRING => line(LineKind::Simple),
            TAG_SIMPLE_ERROR => line(LineKind::Error),
            TAG_DOUBLE => line(LineKind::Double),
            TAG_INTEGER => number(NumberKind::Integer),
            TAG_BULK_STRING => number(NumberKind::BulkLength),
            TAG_ARRAY => number(NumberKind::ArrayLength),
            TAG_MAP => number(NumberKind::MapLength),
            TAG_NULL => DecodeState::AwaitingTerminator {
                value: RespValue::Null,
                cr: false,
            },
            tag if UNSUPPORTED_TAGS.contains(&tag) => {
                return Err(ProtocolError::UnsupportedType(tag))
            }
            tag => return Err(ProtocolError::UnknownType(tag)),
        })
    }

    fn after_length(kind: NumberKind, number: i64, depth: usize) -> ProtocolResult<Step> {
        match kind {
            NumberKind::Integer => Ok(Step::Done(RespValue::Integer(number))),
            NumberKind::BulkLength => {
                if number == NULL_LENGTH {
                    return Ok(Step::Done(RespValue::Null));
                }
                if !(0..=MAX_BULK_LEN).contains(&number) {
                    return Err(ProtocolError::InvalidLength(number));
                }
                let len = number as usize;
                if len == 0 {
                    return Ok(Step::Next(DecodeState::AwaitingTerminator {
                        value: RespValue::BulkString(Default::default()),
                        cr: false,
                    }));
                }
                Ok(Step::Next(DecodeState::AwaitingBody {
                    data: BytesMut::with_capacity(len.min(MAX_PREALLOC)),
                    remaining: len,
                }))
            }
            NumberKind::ArrayLength => {
                if number == NULL_LENGTH {
                    return Ok(Step::Done(RespValue::Null));
                }
                Self::aggregate(AggregateKind::Array, number, number, depth)
            }
            NumberKind::MapLength => {
                let children = number.checked_mul(2).ok_or(ProtocolError::Overflow)?;
                Self::aggregate(AggregateKind::Map, number, children, depth)
            }
        }
    }

    fn aggregate(
        kind: AggregateKind,
        count: i64,
        children: i64,
        depth: usize,
    ) -> ProtocolResult<Step> {
        if count < 0 {
            return Err(ProtocolError::InvalidLength(count));
        }
        if children == 0 {
            return Ok(Step::Done(finish_aggregate(kind, Vec::new())));
        }
        if depth >= MAX_DEPTH {
            return Err(ProtocolError::TooDeep(MAX_DEPTH));
        }
        let total = usize::try_from(children).map_err(|_| ProtocolError::InvalidLength(count))?;
        Ok(Step::Next(DecodeState::AwaitingChild {
            kind,
            total,
            items: Vec::with_capacity(total.min(1024)),
            child: Box::new(DecodeState::AwaitingHeader),
        }))
    }
}

/// Reads line bytes up to CRLF. Returns true once the terminator is consumed.
fn read_line<B: Buf>(src: &mut B, line: &mut Vec<u8>, cr: &mut bool) -> ProtocolResult<bool> {
    while src.has_remaining() {
        let byte = src.get_u8();
        if *cr {
            if byte == b'\n' {
                return Ok(true);
            }
            return Err(ProtocolError::BareLineBreak);
        }
        match byte {
            b'\r' => *cr = true,
            b'\n' => return Err(ProtocolError::BareLineBreak),
            other => line.push(other),
        }
    }
    Ok(false)
}

/// Reads exactly CRLF. Returns true once both bytes are consumed.
fn read_crlf<B: Buf>(src: &mut B, cr: &mut bool) -> ProtocolResult<bool> {
    while src.has_remaining() {
        match (*cr, src.get_u8()) {
            (false, b'\r') => *cr = true,
            (true, b'\n') => return Ok(true),
            _ => return Err(ProtocolError::MissingTerminator),
        }
    }
    Ok(false)
}

fn finish_line(kind: LineKind, line: Vec<u8>) -> ProtocolResult<RespValue> {
    match kind {
        LineKind::Simple => String::from_utf8(line)
            .map(RespValue::SimpleString)
            .map_err(|_| ProtocolError::InvalidUtf8("simple string")),
        LineKind::Error => String::from_utf8(line)
            .map(RespValue::SimpleError)
            .map_err(|_| ProtocolError::InvalidUtf8("simple error")),
        LineKind::Double => {
            let text = std::str::from_utf8(&line).map_err(|_| ProtocolError::InvalidUtf8("double"))?;
            text.parse::<f64>()
                .map(RespValue::Double)
                .map_err(|_| ProtocolError::InvalidDouble(text.to_string()))
        }
    }
}

fn finish_aggregate(kind: AggregateKind, items: Vec<RespValue>) -> RespValue {
    match kind {
        AggregateKind::Array => RespValue::Array(items),
        AggregateKind::Map => {
            let mut pairs = Vec::with_capacity(items.len() / 2);
            let mut iter = items.into_iter();
            while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                pairs.push((key, value));
            }
            RespValue::Map(pairs)
        }
    }
}

/// Stream decoder: an optional in-progress cursor, `None` when idle.
#[derive(Debug, Default)]
pub struct Decoder {
    state: Option<DecodeState>,
}

impl Decoder {
    /// Creates an idle decoder.
    pub fn new() -> Self {
        Decoder { state: None }
    }

    /// True when no value is partially decoded.
    pub fn is_idle(&self) -> bool {
        self.state.is_none()
    }

    /// Current cursor, if a value is in progress.
    pub fn state(&self) -> Option<&DecodeState> {
        self.state.as_ref()
    }

    /// Decodes at most one value from `src`, consuming only its bytes.
    ///
    /// On error the cursor is cleared; the caller must stop feeding this stream.
    pub fn decode<B: Buf>(&mut self, src: &mut B) -> ProtocolResult<Option<RespValue>> {
        if self.state.is_none() && !src.has_remaining() {
            return Ok(None);
        }
        let state = self.state.get_or_insert_with(DecodeState::default);
        match state.advance(src) {
            Ok(Some(value)) => {
                self.state = None;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.state = None;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn decode_whole(input: &[u8]) -> ProtocolResult<Option<RespValue>> {
        let mut decoder = Decoder::new();
        let mut src = input;
        decoder.decode(&mut src)
    }

    /// Feeds `input` one byte per call and collects every completed value.
    fn decode_bytewise(input: &[u8]) -> ProtocolResult<Vec<RespValue>> {
        let mut decoder = Decoder::new();
        let mut out = Vec::new();
        for byte in input {
            let mut src: &[u8] = std::slice::from_ref(byte);
            while src.has_remaining() {
                if let Some(value) = decoder.decode(&mut src)? {
                    out.push(value);
                }
            }
        }
        assert!(decoder.is_idle());
        Ok(out)
    }

    #[test]
    fn decodes_bulk_string() {
        let value = decode_whole(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from_static(b"hello")));
    }

    #[test]
    fn decodes_array_of_bulk_strings() {
        let value = decode_whole(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n").unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![RespValue::bulk("foo"), RespValue::bulk("bar")])
        );
    }

    #[test]
    fn decodes_resp3_null() {
        assert_eq!(decode_whole(b"_\r\n").unwrap(), Some(RespValue::Null));
    }

    #[test]
    fn decodes_map() {
        let value = decode_whole(b"%1\r\n$3\r\nkey\r\n$5\r\nvalue\r\n").unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Map(vec![(RespValue::bulk("key"), RespValue::bulk("value"))])
        );
    }

    #[test]
    fn decodes_scalars() {
        assert_eq!(decode_whole(b"+OK\r\n").unwrap(), Some(RespValue::simple("OK")));
        assert_eq!(
            decode_whole(b"-ERR bad\r\n").unwrap(),
            Some(RespValue::SimpleError("ERR bad".into()))
        );
        assert_eq!(decode_whole(b":42\r\n").unwrap(), Some(RespValue::Integer(42)));
        assert_eq!(decode_whole(b":-7\r\n").unwrap(), Some(RespValue::Integer(-7)));
        assert_eq!(decode_whole(b":+7\r\n").unwrap(), Some(RespValue::Integer(7)));
        assert_eq!(decode_whole(b",1.5\r\n").unwrap(), Some(RespValue::Double(1.5)));
        assert_eq!(
            decode_whole(b",-inf\r\n").unwrap(),
            Some(RespValue::Double(f64::NEG_INFINITY))
        );
    }

    #[test]
    fn decodes_integer_extremes() {
        assert_eq!(
            decode_whole(b":-9223372036854775808\r\n").unwrap(),
            Some(RespValue::Integer(i64::MIN))
        );
        assert_eq!(
            decode_whole(b":9223372036854775808\r\n"),
            Err(ProtocolError::Overflow)
        );
    }

    #[test]
    fn negative_lengths_are_null_sentinels_only() {
        assert_eq!(decode_whole(b"$-1\r\n").unwrap(), Some(RespValue::Null));
        assert_eq!(decode_whole(b"*-1\r\n").unwrap(), Some(RespValue::Null));
        assert_eq!(decode_whole(b"$-2\r\n"), Err(ProtocolError::InvalidLength(-2)));
        assert_eq!(decode_whole(b"%-1\r\n"), Err(ProtocolError::InvalidLength(-1)));
        assert_eq!(decode_whole(b"$+1\r\n"), Err(ProtocolError::InvalidDigit(b'+')));
    }

    #[test]
    fn empty_aggregates_and_bulk() {
        assert_eq!(decode_whole(b"*0\r\n").unwrap(), Some(RespValue::Array(vec![])));
        assert_eq!(decode_whole(b"%0\r\n").unwrap(), Some(RespValue::Map(vec![])));
        assert_eq!(decode_whole(b"$0\r\n\r\n").unwrap(), Some(RespValue::bulk("")));
    }

    #[test]
    fn incomplete_input_keeps_cursor() {
        let mut decoder = Decoder::new();
        let mut src: &[u8] = b"*2\r\n$3\r\nfo";
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert!(src.is_empty());
        assert_eq!(decoder.state().and_then(DecodeState::child_index), Some(0));

        let mut src: &[u8] = b"o\r\n:1";
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(decoder.state().and_then(DecodeState::child_index), Some(1));

        let mut src: &[u8] = b"\r\n";
        assert_eq!(
            decoder.decode(&mut src).unwrap(),
            Some(RespValue::Array(vec![RespValue::bulk("foo"), RespValue::Integer(1)]))
        );
        assert!(decoder.is_idle());
    }

    #[test]
    fn stops_at_value_boundary() {
        let mut decoder = Decoder::new();
        let mut src: &[u8] = b"+A\r\n+B\r\n";
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(RespValue::simple("A")));
        assert_eq!(src, b"+B\r\n");
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(RespValue::simple("B")));
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert!(decoder.is_idle());
    }

    #[test]
    fn bytewise_fragmentation_matches_whole_decode() {
        let input: &[u8] = b"%2\r\n+server\r\n$5\r\nredis\r\n$7\r\nmodules\r\n*2\r\n*1\r\n:-12\r\n_\r\n\
                             ,3.25\r\n-ERR x\r\n$0\r\n\r\n";
        let values = decode_bytewise(input).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(
            values[0],
            RespValue::Map(vec![
                (RespValue::simple("server"), RespValue::bulk("redis")),
                (
                    RespValue::bulk("modules"),
                    RespValue::Array(vec![
                        RespValue::Array(vec![RespValue::Integer(-12)]),
                        RespValue::Null,
                    ])
                ),
            ])
        );
        assert_eq!(values[1], RespValue::Double(3.25));
        assert_eq!(values[2], RespValue::SimpleError("ERR x".into()));
        assert_eq!(values[3], RespValue::bulk(""));
    }

    #[test]
    fn bulk_payload_may_contain_crlf() {
        let values = decode_bytewise(b"$4\r\n\r\n\r\n\r\n").unwrap();
        assert_eq!(values, vec![RespValue::bulk("\r\n\r\n")]);
    }

    #[test]
    fn large_bulk_spans_many_reads() {
        let payload = vec![b'x'; 200_000];
        let mut wire = format!("${}\r\n", payload.len()).into_bytes();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(b"\r\n");

        let mut decoder = Decoder::new();
        let mut result = None;
        for chunk in wire.chunks(4096) {
            let mut src = chunk;
            if let Some(value) = decoder.decode(&mut src).unwrap() {
                result = Some(value);
            }
        }
        assert_eq!(result, Some(RespValue::bulk(payload)));
    }

    #[test]
    fn malformed_length_is_protocol_error() {
        assert_eq!(
            decode_whole(b"*2\r\n$x\r\n"),
            Err(ProtocolError::InvalidDigit(b'x'))
        );
        assert_eq!(decode_whole(b"$\r\n"), Err(ProtocolError::EmptyNumber));
        assert_eq!(decode_whole(b":12\rX"), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn bulk_terminator_mismatch_is_protocol_error() {
        assert_eq!(
            decode_whole(b"$3\r\nfooXY"),
            Err(ProtocolError::MissingTerminator)
        );
        assert_eq!(decode_whole(b"_X\r\n"), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn bare_line_breaks_are_rejected() {
        assert_eq!(decode_whole(b"+O\nK\r\n"), Err(ProtocolError::BareLineBreak));
        assert_eq!(decode_whole(b"+O\rK\r\n"), Err(ProtocolError::BareLineBreak));
    }

    #[test]
    fn unknown_and_unsupported_tags() {
        assert_eq!(decode_whole(b"?\r\n"), Err(ProtocolError::UnknownType(b'?')));
        for tag in UNSUPPORTED_TAGS {
            let input = [tag, b't', b'\r', b'\n'];
            assert_eq!(decode_whole(&input), Err(ProtocolError::UnsupportedType(tag)));
        }
    }

    #[test]
    fn error_clears_cursor() {
        let mut decoder = Decoder::new();
        let mut src: &[u8] = b"*2\r\n:1\r\n";
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        let mut src: &[u8] = b"!";
        assert!(decoder.decode(&mut src).is_err());
        assert!(decoder.is_idle());
    }

    #[test]
    fn nesting_limit_is_a_protocol_error() {
        let mut wire = b"*1\r\n".repeat(100_000);
        wire.extend_from_slice(b":1\r\n");
        let mut decoder = Decoder::new();
        let mut src: &[u8] = &wire;
        assert_eq!(decoder.decode(&mut src), Err(ProtocolError::TooDeep(MAX_DEPTH)));
        assert!(decoder.is_idle());
    }

    #[test]
    fn nesting_at_the_limit_decodes() {
        let mut wire = b"*1\r\n".repeat(MAX_DEPTH);
        wire.extend_from_slice(b":1\r\n");
        let mut value = decode_bytewise(&wire).unwrap().pop().unwrap();
        let mut levels = 0;
        while let RespValue::Array(mut items) = value {
            levels += 1;
            value = items.pop().unwrap();
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(value, RespValue::Integer(1));
    }

    #[test]
    fn invalid_double_text() {
        assert_eq!(
            decode_whole(b",abc\r\n"),
            Err(ProtocolError::InvalidDouble("abc".into()))
        );
    }
}
