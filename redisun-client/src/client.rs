//! # Async Client API
//!
//! Purpose: Expose a compact async API for issuing Redis commands over a
//! pool of pipelined RESP connections.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling, routing, and protocol details.
//! 2. **Borrow-Friendly API**: Keys and values are taken as `AsRef<[u8]>`.
//! 3. **Typed Replies**: Each helper states the reply type it expects; any
//!    other reply is an `UnexpectedResponse`.
//! 4. **Explicit Pipelining**: `send` queues now and resolves later.

use std::time::Duration;

use bytes::Bytes;
use redisun_common::RespValue;

use crate::cmd::{self, Cmd, SetOptions, ZRangeOptions};
use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, ResponseFuture};
use crate::error::{ClientError, ClientResult};
use crate::pool::{Pool, PoolStats};
use crate::response::{self, FromResp};

/// TTL state returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Async client with a pipelined connection pool.
///
/// Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Client {
    dispatcher: Dispatcher,
}

impl Client {
    /// Connects using a `redis://` or `rediss://` URL and default settings.
    pub async fn connect_url(url: &str) -> ClientResult<Self> {
        Self::connect(ClientConfig::from_url(url)?).await
    }

    /// Builds the pool and opens `min_connections` up front.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let pool = Pool::connect(config).await?;
        Ok(Client {
            dispatcher: Dispatcher::new(pool),
        })
    }

    /// Sends any command and waits for its raw reply.
    pub async fn submit(&self, cmd: impl Into<Cmd>) -> ClientResult<RespValue> {
        self.dispatcher.submit(cmd).await
    }

    /// Queues a command now; the returned future resolves with its reply.
    pub async fn send(&self, cmd: impl Into<Cmd>) -> ClientResult<ResponseFuture> {
        self.dispatcher.send(cmd).await
    }

    /// Sends a command and converts the reply.
    pub async fn query<T: FromResp>(&self, cmd: impl Into<Cmd>) -> ClientResult<T> {
        T::from_resp(self.submit(cmd).await?)
    }

    /// Pings the server. Returns the reply payload.
    pub async fn ping(&self, payload: Option<&[u8]>) -> ClientResult<Bytes> {
        let cmd = match payload {
            Some(data) => cmd::ping().arg(data),
            None => cmd::ping(),
        };
        self.query(cmd).await
    }

    /// Fetches a value by key. Returns `Ok(None)` when the key is missing.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> ClientResult<Option<Bytes>> {
        self.query(cmd::get(key)).await
    }

    /// Sets a value without expiration.
    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> ClientResult<()> {
        self.query(cmd::set(key, value)).await
    }

    /// Sets a value and attaches an expiration in seconds.
    pub async fn set_with_ttl(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        ttl: Duration,
    ) -> ClientResult<()> {
        let options = SetOptions::default().expiry(cmd::Expiry::Ex(ttl.as_secs()));
        self.query(cmd::set_with(key, value, &options)).await
    }

    /// SET with options. Read the reply as `bool` for NX/XX, or as
    /// `Option<Bytes>` when `get` is set.
    pub async fn set_with<T: FromResp>(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: &SetOptions,
    ) -> ClientResult<T> {
        self.query(cmd::set_with(key, value, options)).await
    }

    /// Deletes keys. Returns how many were removed.
    pub async fn del<I>(&self, keys: I) -> ClientResult<i64>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.query(cmd::del(keys)).await
    }

    /// Counts how many of `keys` exist.
    pub async fn exists<I>(&self, keys: I) -> ClientResult<i64>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.query(cmd::exists(keys)).await
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub async fn expire(&self, key: impl AsRef<[u8]>, ttl: Duration) -> ClientResult<bool> {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.query(cmd::expire(key, seconds, None)).await
    }

    /// Returns TTL status for a key.
    pub async fn ttl(&self, key: impl AsRef<[u8]>) -> ClientResult<Ttl> {
        match self.query::<i64>(cmd::ttl(key)).await? {
            -2 => Ok(Ttl::Missing),
            -1 => Ok(Ttl::NoExpiry),
            secs if secs >= 0 => Ok(Ttl::ExpiresIn(Duration::from_secs(secs as u64))),
            _ => Err(ClientError::UnexpectedResponse {
                expected: "ttl",
                actual: "integer",
            }),
        }
    }

    pub async fn incr(&self, key: impl AsRef<[u8]>) -> ClientResult<i64> {
        self.query(cmd::incr(key)).await
    }

    pub async fn incr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> ClientResult<i64> {
        self.query(cmd::incr_by(key, delta)).await
    }

    pub async fn decr(&self, key: impl AsRef<[u8]>) -> ClientResult<i64> {
        self.query(cmd::decr(key)).await
    }

    pub async fn decr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> ClientResult<i64> {
        self.query(cmd::decr_by(key, delta)).await
    }

    /// Fetches several keys; missing keys come back as `None`.
    pub async fn mget<I>(&self, keys: I) -> ClientResult<Vec<Option<Bytes>>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.query(cmd::mget(keys)).await
    }

    pub async fn mset<I, K, V>(&self, pairs: I) -> ClientResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.query(cmd::mset(pairs)).await
    }

    /// Sets hash fields. Returns how many fields were added.
    pub async fn hset<I, F, V>(&self, key: impl AsRef<[u8]>, fields: I) -> ClientResult<i64>
    where
        I: IntoIterator<Item = (F, V)>,
        F: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.query(cmd::hset(key, fields)).await
    }

    pub async fn hget(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
    ) -> ClientResult<Option<Bytes>> {
        self.query(cmd::hget(key, field)).await
    }

    /// Adds scored members. Returns how many were new.
    pub async fn zadd<I, M>(&self, key: impl AsRef<[u8]>, members: I) -> ClientResult<i64>
    where
        I: IntoIterator<Item = (f64, M)>,
        M: AsRef<[u8]>,
    {
        self.query(cmd::zadd(key, members)).await
    }

    pub async fn zscore(
        &self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> ClientResult<Option<f64>> {
        self.query(cmd::zscore(key, member)).await
    }

    /// Members between rank `start` and `stop`, inclusive.
    pub async fn zrange(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> ClientResult<Vec<Bytes>> {
        let cmd = cmd::zrange(
            key,
            start.to_string(),
            stop.to_string(),
            &ZRangeOptions::default(),
        );
        self.query(cmd).await
    }

    /// Members with their scores between rank `start` and `stop`.
    pub async fn zrange_with_scores(
        &self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> ClientResult<Vec<(Bytes, f64)>> {
        let options = ZRangeOptions {
            with_scores: true,
            ..ZRangeOptions::default()
        };
        let cmd = cmd::zrange(key, start.to_string(), stop.to_string(), &options);
        response::pairs(self.submit(cmd).await?)
    }

    /// Number of keys in the selected database.
    pub async fn dbsize(&self) -> ClientResult<i64> {
        self.query(cmd::dbsize()).await
    }

    /// The pool behind this client.
    pub fn pool(&self) -> &Pool {
        self.dispatcher.pool()
    }

    /// Pool occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        self.dispatcher.pool().stats()
    }

    /// Closes every connection. Pending commands fail with `PoolClosed`.
    pub fn close(&self) {
        self.dispatcher.pool().close();
    }
}
