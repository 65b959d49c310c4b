//! # Command Builder
//!
//! Purpose: Turn a command and its arguments into the token list the server
//! expects, written straight into a connection's outbound buffer.
//!
//! ## Design Principles
//! 1. **Tokens, Not Strings**: A `Cmd` is an ordered list of byte tokens; it
//!    never goes through text formatting of the whole command.
//! 2. **Pre-Encoded Keywords**: Command names and option keywords are framed
//!    once into process-wide statics and copied verbatim per use.
//! 3. **Borrow-Friendly API**: Constructors accept anything `AsRef<[u8]>`.

use std::sync::LazyLock;

use bytes::{Bytes, BytesMut};
use redisun_common::{encode_bulk, encode_header, PreEncoded, TAG_ARRAY};

macro_rules! keywords {
    ($($name:ident => $text:literal),* $(,)?) => {
        $(static $name: LazyLock<PreEncoded> = LazyLock::new(|| PreEncoded::new($text));)*
    };
}

keywords! {
    HELLO => "HELLO",
    AUTH => "AUTH",
    SETNAME => "SETNAME",
    SELECT => "SELECT",
    PING => "PING",
    GET => "GET",
    SET => "SET",
    DEL => "DEL",
    EXISTS => "EXISTS",
    EXPIRE => "EXPIRE",
    TTL => "TTL",
    INCR => "INCR",
    INCRBY => "INCRBY",
    DECR => "DECR",
    DECRBY => "DECRBY",
    APPEND => "APPEND",
    STRLEN => "STRLEN",
    MGET => "MGET",
    MSET => "MSET",
    HSET => "HSET",
    HGET => "HGET",
    SADD => "SADD",
    LPUSH => "LPUSH",
    RPUSH => "RPUSH",
    LPOP => "LPOP",
    RPOP => "RPOP",
    ZADD => "ZADD",
    ZREM => "ZREM",
    ZSCORE => "ZSCORE",
    ZRANGE => "ZRANGE",
    DBSIZE => "DBSIZE",
    FLUSHDB => "FLUSHDB",
    FLUSHALL => "FLUSHALL",
    TYPE => "TYPE",
    NX => "NX",
    XX => "XX",
    GT => "GT",
    LT => "LT",
    EX => "EX",
    PX => "PX",
    EXAT => "EXAT",
    PXAT => "PXAT",
    KEEPTTL => "KEEPTTL",
    BYSCORE => "BYSCORE",
    BYLEX => "BYLEX",
    REV => "REV",
    LIMIT => "LIMIT",
    WITHSCORES => "WITHSCORES",
}

/// A single command token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Keyword framed ahead of time.
    Encoded(PreEncoded),
    /// Caller-supplied bytes, framed on write.
    Bytes(Bytes),
}

impl Arg {
    /// Raw token bytes without framing.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Arg::Encoded(token) => token.token(),
            Arg::Bytes(data) => data,
        }
    }

    fn write_to(&self, out: &mut BytesMut) {
        match self {
            Arg::Encoded(token) => token.write_to(out),
            Arg::Bytes(data) => encode_bulk(data, out),
        }
    }
}

/// An ordered list of tokens sent as one RESP array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    args: Vec<Arg>,
}

impl Cmd {
    /// Starts a command whose name is copied from `name`.
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Cmd::default().arg(name)
    }

    /// Starts a command from a pre-encoded name.
    pub fn from_static(name: &PreEncoded) -> Self {
        Cmd {
            args: vec![Arg::Encoded(name.clone())],
        }
    }

    fn keyword(name: &LazyLock<PreEncoded>) -> Self {
        Cmd::from_static(name)
    }

    /// Appends a copied argument.
    pub fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args
            .push(Arg::Bytes(Bytes::copy_from_slice(value.as_ref())));
        self
    }

    /// Appends an argument without copying it.
    pub fn arg_bytes(mut self, value: Bytes) -> Self {
        self.args.push(Arg::Bytes(value));
        self
    }

    pub fn arg_int(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    pub fn arg_uint(self, value: u64) -> Self {
        self.arg(value.to_string())
    }

    /// Appends a float; infinities are written as `+inf` and `-inf`.
    pub fn arg_float(self, value: f64) -> Self {
        if value.is_infinite() {
            self.arg(if value > 0.0 { "+inf" } else { "-inf" })
        } else {
            self.arg(value.to_string())
        }
    }

    /// Appends every item of `values`.
    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    fn kw(mut self, keyword: &LazyLock<PreEncoded>) -> Self {
        self.args.push(Arg::Encoded(PreEncoded::clone(keyword)));
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn tokens(&self) -> &[Arg] {
        &self.args
    }

    /// Command name for logging.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|arg| String::from_utf8_lossy(arg.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    /// Appends `*N\r\n` followed by each token as a bulk string.
    pub fn encode_into(&self, out: &mut BytesMut) {
        encode_header(TAG_ARRAY, self.args.len(), out);
        for arg in &self.args {
            arg.write_to(out);
        }
    }
}

impl<T: AsRef<[u8]>> From<&[T]> for Cmd {
    fn from(tokens: &[T]) -> Self {
        Cmd::default().args(tokens)
    }
}

impl<T: AsRef<[u8]>> From<Vec<T>> for Cmd {
    fn from(tokens: Vec<T>) -> Self {
        Cmd::default().args(tokens)
    }
}

impl<T: AsRef<[u8]>, const N: usize> From<[T; N]> for Cmd {
    fn from(tokens: [T; N]) -> Self {
        Cmd::default().args(tokens)
    }
}

/// Condition for SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set if the key does not exist.
    Nx,
    /// Only set if the key already exists.
    Xx,
}

/// Expiration attached to SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Seconds from now.
    Ex(u64),
    /// Milliseconds from now.
    Px(u64),
    /// Unix time in seconds.
    ExAt(u64),
    /// Unix time in milliseconds.
    PxAt(u64),
    /// Keep the existing TTL.
    KeepTtl,
}

/// Options for SET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: Option<SetCondition>,
    pub expiry: Option<Expiry>,
    /// Return the previous value.
    pub get: bool,
}

impl SetOptions {
    pub fn nx(mut self) -> Self {
        self.condition = Some(SetCondition::Nx);
        self
    }

    pub fn xx(mut self) -> Self {
        self.condition = Some(SetCondition::Xx);
        self
    }

    pub fn expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }
}

/// Condition for EXPIRE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireCondition {
    Nx,
    Xx,
    Gt,
    Lt,
}

/// Range interpretation for ZRANGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZRangeBy {
    Score,
    Lex,
}

/// Options for ZRANGE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZRangeOptions {
    pub by: Option<ZRangeBy>,
    pub rev: bool,
    /// Offset and count; only honored by the server with BYSCORE or BYLEX.
    pub limit: Option<(i64, i64)>,
    pub with_scores: bool,
}

/// `HELLO protover [AUTH user pass] [SETNAME name]`.
///
/// A password without a user authenticates as `default`.
pub fn hello(
    protocol_version: u8,
    username: Option<&str>,
    password: Option<&str>,
    client_name: Option<&str>,
) -> Cmd {
    let mut cmd = Cmd::keyword(&HELLO).arg_uint(u64::from(protocol_version));
    if let Some(password) = password {
        cmd = cmd
            .kw(&AUTH)
            .arg(username.unwrap_or("default"))
            .arg(password);
    }
    if let Some(name) = client_name.filter(|name| !name.is_empty()) {
        cmd = cmd.kw(&SETNAME).arg(name);
    }
    cmd
}

pub fn select(database: u32) -> Cmd {
    Cmd::keyword(&SELECT).arg_uint(u64::from(database))
}

pub fn ping() -> Cmd {
    Cmd::keyword(&PING)
}

pub fn get(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&GET).arg(key)
}

pub fn set(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&SET).arg(key).arg(value)
}

pub fn set_with(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, options: &SetOptions) -> Cmd {
    let mut cmd = set(key, value);
    match options.condition {
        Some(SetCondition::Nx) => cmd = cmd.kw(&NX),
        Some(SetCondition::Xx) => cmd = cmd.kw(&XX),
        None => {}
    }
    if options.get {
        cmd = cmd.kw(&GET);
    }
    match options.expiry {
        Some(Expiry::Ex(secs)) => cmd = cmd.kw(&EX).arg_uint(secs),
        Some(Expiry::Px(millis)) => cmd = cmd.kw(&PX).arg_uint(millis),
        Some(Expiry::ExAt(at)) => cmd = cmd.kw(&EXAT).arg_uint(at),
        Some(Expiry::PxAt(at)) => cmd = cmd.kw(&PXAT).arg_uint(at),
        Some(Expiry::KeepTtl) => cmd = cmd.kw(&KEEPTTL),
        None => {}
    }
    cmd
}

pub fn del<I>(keys: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&DEL).args(keys)
}

pub fn exists<I>(keys: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&EXISTS).args(keys)
}

pub fn expire(key: impl AsRef<[u8]>, seconds: i64, condition: Option<ExpireCondition>) -> Cmd {
    let cmd = Cmd::keyword(&EXPIRE).arg(key).arg_int(seconds);
    match condition {
        Some(ExpireCondition::Nx) => cmd.kw(&NX),
        Some(ExpireCondition::Xx) => cmd.kw(&XX),
        Some(ExpireCondition::Gt) => cmd.kw(&GT),
        Some(ExpireCondition::Lt) => cmd.kw(&LT),
        None => cmd,
    }
}

pub fn ttl(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&TTL).arg(key)
}

pub fn incr(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&INCR).arg(key)
}

pub fn incr_by(key: impl AsRef<[u8]>, delta: i64) -> Cmd {
    Cmd::keyword(&INCRBY).arg(key).arg_int(delta)
}

pub fn decr(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&DECR).arg(key)
}

pub fn decr_by(key: impl AsRef<[u8]>, delta: i64) -> Cmd {
    Cmd::keyword(&DECRBY).arg(key).arg_int(delta)
}

pub fn append(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&APPEND).arg(key).arg(value)
}

pub fn strlen(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&STRLEN).arg(key)
}

pub fn mget<I>(keys: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&MGET).args(keys)
}

pub fn mset<I, K, V>(pairs: I) -> Cmd
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    pairs
        .into_iter()
        .fold(Cmd::keyword(&MSET), |cmd, (key, value)| cmd.arg(key).arg(value))
}

pub fn hset<I, F, V>(key: impl AsRef<[u8]>, fields: I) -> Cmd
where
    I: IntoIterator<Item = (F, V)>,
    F: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    fields
        .into_iter()
        .fold(Cmd::keyword(&HSET).arg(key), |cmd, (field, value)| {
            cmd.arg(field).arg(value)
        })
}

pub fn hget(key: impl AsRef<[u8]>, field: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&HGET).arg(key).arg(field)
}

pub fn sadd<I>(key: impl AsRef<[u8]>, members: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&SADD).arg(key).args(members)
}

pub fn lpush<I>(key: impl AsRef<[u8]>, values: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&LPUSH).arg(key).args(values)
}

pub fn rpush<I>(key: impl AsRef<[u8]>, values: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&RPUSH).arg(key).args(values)
}

pub fn lpop(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&LPOP).arg(key)
}

pub fn rpop(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&RPOP).arg(key)
}

/// `ZADD key score member [score member ...]`.
pub fn zadd<I, M>(key: impl AsRef<[u8]>, members: I) -> Cmd
where
    I: IntoIterator<Item = (f64, M)>,
    M: AsRef<[u8]>,
{
    members
        .into_iter()
        .fold(Cmd::keyword(&ZADD).arg(key), |cmd, (score, member)| {
            cmd.arg_float(score).arg(member)
        })
}

pub fn zrem<I>(key: impl AsRef<[u8]>, members: I) -> Cmd
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    Cmd::keyword(&ZREM).arg(key).args(members)
}

pub fn zscore(key: impl AsRef<[u8]>, member: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&ZSCORE).arg(key).arg(member)
}

/// `ZRANGE key start stop [BYSCORE|BYLEX] [REV] [LIMIT offset count] [WITHSCORES]`.
pub fn zrange(
    key: impl AsRef<[u8]>,
    start: impl AsRef<[u8]>,
    stop: impl AsRef<[u8]>,
    options: &ZRangeOptions,
) -> Cmd {
    let mut cmd = Cmd::keyword(&ZRANGE).arg(key).arg(start).arg(stop);
    match options.by {
        Some(ZRangeBy::Score) => cmd = cmd.kw(&BYSCORE),
        Some(ZRangeBy::Lex) => cmd = cmd.kw(&BYLEX),
        None => {}
    }
    if options.rev {
        cmd = cmd.kw(&REV);
    }
    if let Some((offset, count)) = options.limit {
        cmd = cmd.kw(&LIMIT).arg_int(offset).arg_int(count);
    }
    if options.with_scores {
        cmd = cmd.kw(&WITHSCORES);
    }
    cmd
}

pub fn dbsize() -> Cmd {
    Cmd::keyword(&DBSIZE)
}

pub fn flushdb() -> Cmd {
    Cmd::keyword(&FLUSHDB)
}

pub fn flushall() -> Cmd {
    Cmd::keyword(&FLUSHALL)
}

/// `TYPE key`.
pub fn key_type(key: impl AsRef<[u8]>) -> Cmd {
    Cmd::keyword(&TYPE).arg(key)
}
