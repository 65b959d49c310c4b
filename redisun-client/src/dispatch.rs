//! # Command Dispatcher
//!
//! Purpose: Route a command to a connection, queue it, and hand back a future
//! for its reply.
//!
//! ## Design Principles
//! 1. **Enqueue Eagerly**: `send` returns only after the command sits in a
//!    connection's outbound buffer, so awaiting the reply later still keeps
//!    submission order.
//! 2. **No Retries**: Failures are surfaced as-is; nothing is resubmitted.
//!    A connection found closed before the command was queued is skipped,
//!    since no byte of the command was written to it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use redisun_common::RespValue;
use tokio::time::Sleep;
use tracing::{debug, trace};

use crate::cmd::Cmd;
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};
use crate::pool::Pool;
use crate::session::ResponseReceiver;

/// Resolves to the reply of one submitted command.
///
/// With a command timeout configured it resolves to `ClientError::Timeout`
/// once the deadline passes; the request stays queued on its connection and
/// its late reply is dropped.
pub struct ResponseFuture {
    rx: ResponseReceiver,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ResponseFuture {
    fn new(rx: ResponseReceiver, timeout: Option<Duration>) -> Self {
        ResponseFuture {
            rx,
            deadline: timeout.map(|timeout| Box::pin(tokio::time::sleep(timeout))),
        }
    }
}

impl Future for ResponseFuture {
    type Output = ClientResult<RespValue>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(result) = Pin::new(&mut self.rx).poll(cx) {
            // A dropped sender means the connection went away without failing us.
            return Poll::Ready(result.unwrap_or_else(|_| Err(ClientError::ConnectionClosed)));
        }
        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(ClientError::Timeout));
            }
        }
        Poll::Pending
    }
}

/// Submits commands through a pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Pool,
    command_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(pool: Pool) -> Self {
        let command_timeout = pool.config().command_timeout();
        Dispatcher {
            pool,
            command_timeout,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Queues `cmd` on a connection and returns the pending reply.
    pub async fn send(&self, cmd: impl Into<Cmd>) -> ClientResult<ResponseFuture> {
        let cmd = cmd.into();
        if cmd.is_empty() {
            return Err(ClientError::EmptyCommand);
        }
        let conn = self.pool.acquire().await?;
        let (conn, rx) = self.enqueue(conn, &cmd).await?;
        trace!(
            conn_id = conn.id(),
            command = %cmd.name(),
            inflight = conn.inflight(),
            "Command queued"
        );
        Ok(ResponseFuture::new(rx, self.command_timeout))
    }

    /// Queues `cmd` on `conn`, routing again if `conn` closed after it was
    /// acquired (for example, the idle reaper took it).
    async fn enqueue(
        &self,
        mut conn: Arc<Connection>,
        cmd: &Cmd,
    ) -> ClientResult<(Arc<Connection>, ResponseReceiver)> {
        // Every pass either queues or skips a closed connection, so more
        // passes than pool slots means connections are failing as fast as
        // they are opened.
        let mut passes = self.pool.config().max_connections + 1;
        loop {
            match conn.submit(cmd) {
                Ok(rx) => return Ok((conn, rx)),
                Err(err) if err.is_fatal_to_connection() && passes > 1 => {
                    passes -= 1;
                    debug!(
                        conn_id = conn.id(),
                        error = %err,
                        "Connection closed before queueing, rerouting"
                    );
                    conn = self.pool.acquire().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Queues `cmd` and waits for its reply.
    pub async fn submit(&self, cmd: impl Into<Cmd>) -> ClientResult<RespValue> {
        self.send(cmd).await?.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd;
    use crate::config::ClientConfig;
    use crate::session::PendingRequest;
    use bytes::BytesMut;
    use redisun_common::Decoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers HELLO with a one-field map and everything else with PONG.
    async fn spawn_pong_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = BytesMut::new();
                    let mut decoder = Decoder::new();
                    loop {
                        while let Ok(Some(value)) = decoder.decode(&mut buf) {
                            let name = match &value {
                                RespValue::Array(items) => items.first().and_then(RespValue::as_str),
                                _ => None,
                            };
                            let reply: &[u8] = if name == Some("HELLO") {
                                b"%1\r\n$5\r\nproto\r\n:3\r\n"
                            } else {
                                b"+PONG\r\n"
                            };
                            if stream.write_all(reply).await.is_err() {
                                return;
                            }
                        }
                        match stream.read_buf(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });
        addr
    }

    async fn idle_pool() -> Pool {
        let addr = spawn_pong_server().await;
        let config = ClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            min_connections: 0,
            max_connections: 2,
            idle_timeout_ms: 0,
            ..ClientConfig::default()
        };
        Pool::connect(config).await.unwrap()
    }

    #[tokio::test]
    async fn connection_reaped_after_routing_is_skipped() {
        let pool = idle_pool().await;
        let dispatcher = Dispatcher::new(pool.clone());

        // The reaper runs between routing and queueing.
        let stale = pool.acquire().await.unwrap();
        pool.reap_now();
        assert!(stale.is_closed());

        let (conn, rx) = dispatcher
            .enqueue(Arc::clone(&stale), &cmd::ping())
            .await
            .unwrap();
        assert_ne!(conn.id(), stale.id());
        assert_eq!(
            ResponseFuture::new(rx, None).await.unwrap(),
            RespValue::simple("PONG")
        );
        assert_eq!(pool.stats().connections, 1);
    }

    #[tokio::test]
    async fn closed_pool_is_not_rerouted() {
        let pool = idle_pool().await;
        let dispatcher = Dispatcher::new(pool.clone());

        let conn = pool.acquire().await.unwrap();
        pool.close();
        assert!(matches!(
            dispatcher.enqueue(conn, &cmd::ping()).await,
            Err(ClientError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn response_future_yields_reply() {
        let (request, rx) = PendingRequest::new();
        let future = ResponseFuture::new(rx, None);
        request.complete(Ok(RespValue::Integer(5)));
        assert_eq!(future.await.unwrap(), RespValue::Integer(5));
    }

    #[tokio::test]
    async fn dropped_request_reads_as_closed() {
        let (request, rx) = PendingRequest::new();
        drop(request);
        assert!(matches!(
            ResponseFuture::new(rx, None).await,
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn deadline_elapses_without_reply() {
        let (_request, rx) = PendingRequest::new();
        let future = ResponseFuture::new(rx, Some(Duration::from_millis(20)));
        assert!(matches!(future.await, Err(ClientError::Timeout)));
    }
}
