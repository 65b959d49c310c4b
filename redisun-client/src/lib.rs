//! # Redisun Async Client
//!
//! Purpose: Provide an async Redis client that pipelines commands over a small
//! pool of RESP2/RESP3 connections and matches replies purely by order.
//!
//! ## Design Principles
//! 1. **Pipelining by Default**: Many callers share one connection; replies
//!    are paired with requests by a per-connection FIFO.
//! 2. **Sticky Routing**: One connection takes traffic until its inflight
//!    count crosses the high-water mark, then the pool spreads load.
//! 3. **Failure Isolation**: A broken connection fails only its own queue.
//! 4. **Minimal Allocation**: Keywords are pre-encoded and outbound bytes
//!    are appended to one reusable buffer per connection.

pub mod cmd;
mod client;
mod config;
mod connection;
mod dispatch;
mod error;
mod pool;
mod response;
mod session;

pub use client::{Client, Ttl};
pub use cmd::{Cmd, Expiry, ExpireCondition, SetCondition, SetOptions, ZRangeBy, ZRangeOptions};
pub use config::{ClientConfig, DEFAULT_HIGH_WATER_MARK, DEFAULT_PORT, DEFAULT_TLS_PORT};
pub use connection::{CloseHook, Connection, ConnectionState, ModuleInfo, ServerInfo};
pub use dispatch::{Dispatcher, ResponseFuture};
pub use error::{ClientError, ClientResult};
pub use pool::{Pool, PoolStats};
pub use redisun_common::{ProtocolError, RespValue};
pub use response::{pairs, FromResp};
pub use session::{PendingRequest, ResponseReceiver, Session};
