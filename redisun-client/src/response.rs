//! Conversion of decoded replies into Rust types.

use bytes::Bytes;
use redisun_common::RespValue;

use crate::error::{ClientError, ClientResult};

/// Types that can be built from a reply.
pub trait FromResp: Sized {
    fn from_resp(value: RespValue) -> ClientResult<Self>;
}

fn mismatch(expected: &'static str, value: &RespValue) -> ClientError {
    ClientError::UnexpectedResponse {
        expected,
        actual: value.kind(),
    }
}

impl FromResp for RespValue {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        Ok(value)
    }
}

/// Status replies such as `+OK`.
impl FromResp for () {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(mismatch("simple string", &other)),
        }
    }
}

impl FromResp for i64 {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match &value {
            RespValue::Integer(n) => Ok(*n),
            RespValue::BulkString(_) | RespValue::SimpleString(_) => value
                .as_str()
                .and_then(|text| text.parse().ok())
                .ok_or_else(|| mismatch("integer", &value)),
            _ => Err(mismatch("integer", &value)),
        }
    }
}

/// `:1` is true, `:0` false; `+OK` true and null false (conditional SET).
impl FromResp for bool {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::Integer(n) => Ok(n != 0),
            RespValue::SimpleString(_) => Ok(true),
            RespValue::Null => Ok(false),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FromResp for f64 {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match &value {
            RespValue::Double(n) => Ok(*n),
            RespValue::Integer(n) => Ok(*n as f64),
            RespValue::BulkString(_) | RespValue::SimpleString(_) => value
                .as_str()
                .and_then(|text| text.parse().ok())
                .ok_or_else(|| mismatch("double", &value)),
            _ => Err(mismatch("double", &value)),
        }
    }
}

impl FromResp for Bytes {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::BulkString(data) => Ok(data),
            RespValue::SimpleString(text) => Ok(Bytes::from(text)),
            other => Err(mismatch("bulk string", &other)),
        }
    }
}

impl FromResp for String {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::SimpleString(text) => Ok(text),
            RespValue::BulkString(data) => String::from_utf8(data.to_vec())
                .map_err(|_| ClientError::UnexpectedResponse {
                    expected: "utf-8 string",
                    actual: "bulk string",
                }),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl<T: FromResp> FromResp for Option<T> {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::Null => Ok(None),
            other => T::from_resp(other).map(Some),
        }
    }
}

/// Arrays convert element-wise; map entries are offered as two-element arrays
/// so `Vec<(K, V)>` reads both shapes. Null is an empty list.
impl<T: FromResp> FromResp for Vec<T> {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::Array(items) => items.into_iter().map(T::from_resp).collect(),
            RespValue::Map(pairs) => pairs
                .into_iter()
                .map(|(key, value)| T::from_resp(RespValue::Array(vec![key, value])))
                .collect(),
            RespValue::Null => Ok(Vec::new()),
            other => Err(mismatch("array", &other)),
        }
    }
}

impl<K: FromResp, V: FromResp> FromResp for (K, V) {
    fn from_resp(value: RespValue) -> ClientResult<Self> {
        match value {
            RespValue::Array(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                match (items.next(), items.next()) {
                    (Some(key), Some(value)) => Ok((K::from_resp(key)?, V::from_resp(value)?)),
                    _ => Err(ClientError::UnexpectedResponse {
                        expected: "pair",
                        actual: "array",
                    }),
                }
            }
            other => Err(mismatch("pair", &other)),
        }
    }
}

/// Reads a RESP2 flat `[k1, v1, k2, v2, ...]` reply, or a RESP3 map or array
/// of pairs, as a list of pairs.
pub fn pairs<K: FromResp, V: FromResp>(value: RespValue) -> ClientResult<Vec<(K, V)>> {
    match value {
        RespValue::Array(items) if items.iter().all(|item| !matches!(item, RespValue::Array(_))) => {
            if items.len() % 2 != 0 {
                return Err(ClientError::UnexpectedResponse {
                    expected: "even-length array",
                    actual: "array",
                });
            }
            let mut out = Vec::with_capacity(items.len() / 2);
            let mut items = items.into_iter();
            while let (Some(key), Some(value)) = (items.next(), items.next()) {
                out.push((K::from_resp(key)?, V::from_resp(value)?));
            }
            Ok(out)
        }
        other => Vec::<(K, V)>::from_resp(other),
    }
}
