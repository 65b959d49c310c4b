//! # Pipelined Connection
//!
//! Purpose: Own one transport, run the HELLO/SELECT handshake on it, and then
//! multiplex any number of callers over it with strict reply ordering.
//!
//! ## Design Principles
//! 1. **Handshake Before Traffic**: The reader and writer tasks are spawned
//!    only after negotiation succeeds, so no application byte can precede it.
//! 2. **One Critical Section**: Enqueueing a request and appending its bytes
//!    to the outbound buffer happen under the same mutex.
//! 3. **Coalesced Flushes**: Submitters only poke a `Notify`; the writer task
//!    drains whatever has accumulated in one write.
//! 4. **Fail Everything Once**: A transport or protocol failure closes the
//!    connection for good and fails every queued request.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use parking_lot::Mutex;
use redisun_common::{Decoder, ProtocolResult, RespValue};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cmd::{self, Cmd};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::{PendingRequest, ResponseReceiver, Session};

/// Called once with the connection id when the connection closes.
pub type CloseHook = Box<dyn FnOnce(u64) + Send>;

/// Lifecycle of a connection. `Ready` connections are further idle or in use
/// depending on their inflight count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Created = 0,
    Handshaking = 1,
    Ready = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Created,
            1 => ConnectionState::Handshaking,
            2 => ConnectionState::Ready,
            _ => ConnectionState::Closed,
        }
    }
}

/// A module reported in the HELLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub ver: i64,
    pub path: String,
}

/// Server details returned by HELLO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub server: String,
    pub version: String,
    pub proto: i64,
    pub id: i64,
    pub mode: String,
    pub role: String,
    pub modules: Vec<ModuleInfo>,
}

fn text_field(value: &RespValue, key: &str) -> String {
    value
        .lookup(key)
        .and_then(RespValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(value: &RespValue, key: &str) -> i64 {
    value
        .lookup(key)
        .and_then(RespValue::as_integer)
        .unwrap_or_default()
}

impl ServerInfo {
    /// Parses a HELLO reply: a map under RESP3, a flat key/value array under RESP2.
    pub fn from_hello(reply: &RespValue) -> ClientResult<Self> {
        if !matches!(reply, RespValue::Map(_) | RespValue::Array(_)) {
            return Err(ClientError::UnexpectedResponse {
                expected: "map",
                actual: reply.kind(),
            });
        }
        let modules = match reply.lookup("modules") {
            Some(RespValue::Array(items)) => items
                .iter()
                .map(|module| ModuleInfo {
                    name: text_field(module, "name"),
                    ver: int_field(module, "ver"),
                    path: text_field(module, "path"),
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(ServerInfo {
            server: text_field(reply, "server"),
            version: text_field(reply, "version"),
            proto: int_field(reply, "proto"),
            id: int_field(reply, "id"),
            mode: text_field(reply, "mode"),
            role: text_field(reply, "role"),
            modules,
        })
    }
}

struct Pipeline {
    session: Session,
    outbound: BytesMut,
    failure: Option<ClientError>,
}

/// One multiplexed server connection.
pub struct Connection {
    id: u64,
    addr: String,
    state: AtomicU8,
    submitted: AtomicU64,
    completed: AtomicU64,
    pipeline: Mutex<Pipeline>,
    flush: Notify,
    closed: watch::Sender<bool>,
    info: OnceLock<ServerInfo>,
    on_close: Mutex<Option<CloseHook>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("inflight", &self.inflight())
            .finish()
    }
}

impl Connection {
    fn new(id: u64, addr: String, on_close: Option<CloseHook>) -> Self {
        Connection {
            id,
            addr,
            state: AtomicU8::new(ConnectionState::Created as u8),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            pipeline: Mutex::new(Pipeline {
                session: Session::new(),
                outbound: BytesMut::with_capacity(1024),
                failure: None,
            }),
            flush: Notify::new(),
            closed: watch::channel(false).0,
            info: OnceLock::new(),
            on_close: Mutex::new(on_close),
        }
    }

    /// Opens a TCP connection and completes the handshake.
    pub async fn connect(
        id: u64,
        config: &ClientConfig,
        on_close: Option<CloseHook>,
    ) -> ClientResult<Arc<Connection>> {
        if config.tls {
            return Err(ClientError::Unsupported("tls connections"));
        }
        let addr = config.addr();
        let stream = match timeout(config.connect_timeout(), TcpStream::connect(&addr)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(ClientError::ConnectTimeout),
        };
        // Disable Nagle; pipelined commands are small and latency bound.
        stream.set_nodelay(true)?;
        debug!(conn_id = id, addr = %addr, "Connected");
        Connection::establish(id, addr, stream, config, on_close).await
    }

    /// Runs the handshake on `stream` and starts the I/O tasks.
    ///
    /// Any transport works; tests pass an in-memory duplex stream.
    pub async fn establish<S>(
        id: u64,
        addr: String,
        mut stream: S,
        config: &ClientConfig,
        on_close: Option<CloseHook>,
    ) -> ClientResult<Arc<Connection>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let conn = Arc::new(Connection::new(id, addr, on_close));
        conn.set_state(ConnectionState::Handshaking);

        let mut read_buf = BytesMut::with_capacity(config.read_buffer_size);
        let result = match timeout(
            config.connect_timeout(),
            handshake(&mut stream, config, &mut read_buf),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectTimeout),
        };
        let info = match result {
            Ok(info) => info,
            Err(err) => {
                let err = ClientError::Handshake(Box::new(err));
                warn!(conn_id = id, addr = %conn.addr, error = %err, "Handshake failed");
                conn.close(err.clone());
                return Err(err);
            }
        };

        info!(
            conn_id = id,
            addr = %conn.addr,
            server = %info.server,
            version = %info.version,
            proto = info.proto,
            "Handshake complete"
        );
        conn.info.get_or_init(|| info);
        if conn
            .state
            .compare_exchange(
                ConnectionState::Handshaking as u8,
                ConnectionState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ClientError::ConnectionClosed);
        }

        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(read_loop(
            Arc::clone(&conn),
            reader,
            read_buf,
            config.read_buffer_size.max(64),
        ));
        tokio::spawn(write_loop(Arc::clone(&conn), writer));
        Ok(conn)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// HELLO details, set once the handshake completes.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.info.get()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Ready with nothing outstanding.
    pub fn is_idle(&self) -> bool {
        self.is_ready() && self.inflight() == 0
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Requests written but not yet answered.
    pub fn inflight(&self) -> u64 {
        let completed = self.completed.load(Ordering::Acquire);
        self.submitted
            .load(Ordering::Acquire)
            .saturating_sub(completed)
    }

    /// Queues `cmd` and its reply slot in one critical section, then wakes
    /// the writer.
    pub fn submit(&self, cmd: &Cmd) -> ClientResult<ResponseReceiver> {
        let (request, rx) = PendingRequest::new();
        {
            let mut pipeline = self.pipeline.lock();
            if let Some(err) = &pipeline.failure {
                return Err(err.clone());
            }
            pipeline.session.submit(request);
            self.submitted.fetch_add(1, Ordering::AcqRel);
            cmd.encode_into(&mut pipeline.outbound);
        }
        self.flush.notify_one();
        Ok(rx)
    }

    fn on_bytes(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        let mut pipeline = self.pipeline.lock();
        if pipeline.failure.is_some() {
            buf.clear();
            return Ok(());
        }
        // Count before resolving so a woken caller never sees its own reply as inflight.
        while let Some((request, result)) = pipeline.session.next_reply(buf)? {
            self.completed.fetch_add(1, Ordering::AcqRel);
            request.complete(result);
        }
        Ok(())
    }

    /// Closes the connection, failing every queued request with `err`.
    /// Later calls are no-ops.
    pub fn close(&self, err: ClientError) {
        self.shutdown(err, false);
    }

    /// Closes the connection only if nothing is queued on it. Checked under
    /// the pipeline lock, so a concurrent submit either lands first and keeps
    /// the connection alive or sees it closed.
    pub fn close_if_idle(&self) -> bool {
        self.shutdown(ClientError::ConnectionClosed, true)
    }

    fn shutdown(&self, err: ClientError, only_if_idle: bool) -> bool {
        let failed = {
            let mut pipeline = self.pipeline.lock();
            if pipeline.failure.is_some() {
                return false;
            }
            if only_if_idle && pipeline.session.pending() > 0 {
                return false;
            }
            self.set_state(ConnectionState::Closed);
            let failed = pipeline.session.fail_all(&err);
            pipeline.outbound.clear();
            pipeline.failure = Some(err.clone());
            failed
        };
        self.completed.fetch_add(failed as u64, Ordering::AcqRel);
        self.closed.send_replace(true);
        debug!(conn_id = self.id, addr = %self.addr, failed, error = %err, "Connection closed");

        let hook = self.on_close.lock().take();
        if let Some(hook) = hook {
            hook(self.id);
        }
        true
    }
}

async fn handshake<S>(
    stream: &mut S,
    config: &ClientConfig,
    buf: &mut BytesMut,
) -> ClientResult<ServerInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = cmd::hello(
        config.protocol_version,
        config.username.as_deref(),
        config.password.as_deref(),
        Some(&config.client_name),
    );
    let reply = roundtrip(stream, &hello, buf).await?;
    let info = ServerInfo::from_hello(&reply)?;

    if config.database != 0 {
        match roundtrip(stream, &cmd::select(config.database), buf).await? {
            RespValue::SimpleString(text) if text == "OK" => {}
            other => {
                return Err(ClientError::UnexpectedResponse {
                    expected: "OK",
                    actual: other.kind(),
                })
            }
        }
    }
    Ok(info)
}

async fn roundtrip<S>(stream: &mut S, cmd: &Cmd, buf: &mut BytesMut) -> ClientResult<RespValue>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();
    cmd.encode_into(&mut out);
    stream.write_all(&out).await?;
    stream.flush().await?;

    let mut decoder = Decoder::new();
    loop {
        if let Some(value) = decoder.decode(buf)? {
            return match value {
                RespValue::SimpleError(message) => Err(ClientError::Server(message)),
                value => Ok(value),
            };
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(ClientError::ConnectionClosed);
        }
    }
}

async fn read_loop<R>(conn: Arc<Connection>, mut reader: R, mut buf: BytesMut, chunk: usize)
where
    R: AsyncRead + Unpin,
{
    let mut closed = conn.closed.subscribe();
    let already_closed = *closed.borrow();
    if already_closed {
        return;
    }
    loop {
        if !buf.is_empty() {
            if let Err(err) = conn.on_bytes(&mut buf) {
                warn!(conn_id = conn.id, error = %err, "Protocol error");
                conn.close(err.into());
                return;
            }
        }
        buf.reserve(chunk);
        let read = tokio::select! {
            _ = closed.changed() => return,
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                conn.close(ClientError::ConnectionClosed);
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(conn_id = conn.id, error = %err, "Read failed");
                conn.close(err.into());
                return;
            }
        }
    }
}

async fn write_loop<W>(conn: Arc<Connection>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    let mut closed = conn.closed.subscribe();
    let already_closed = *closed.borrow();
    if already_closed {
        return;
    }
    loop {
        tokio::select! {
            _ = closed.changed() => return,
            _ = conn.flush.notified() => {}
        }
        loop {
            let chunk = {
                let mut pipeline = conn.pipeline.lock();
                if pipeline.outbound.is_empty() {
                    break;
                }
                pipeline.outbound.split().freeze()
            };
            if let Err(err) = writer.write_all(&chunk).await {
                warn!(conn_id = conn.id, error = %err, "Write failed");
                conn.close(err.into());
                return;
            }
        }
        if let Err(err) = writer.flush().await {
            conn.close(err.into());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redisun_common::ProtocolError;
    use tokio::io::DuplexStream;

    async fn read_command(stream: &mut DuplexStream, buf: &mut BytesMut) -> Vec<String> {
        let mut decoder = Decoder::new();
        loop {
            if let Some(value) = decoder.decode(buf).unwrap() {
                let RespValue::Array(items) = value else {
                    panic!("command must be an array");
                };
                return items
                    .iter()
                    .map(|item| item.as_str().unwrap().to_string())
                    .collect();
            }
            assert_ne!(stream.read_buf(buf).await.unwrap(), 0, "client hung up");
        }
    }

    fn hello_reply() -> BytesMut {
        RespValue::Map(vec![
            (RespValue::bulk("server"), RespValue::bulk("redis")),
            (RespValue::bulk("version"), RespValue::bulk("7.2.4")),
            (RespValue::bulk("proto"), RespValue::Integer(3)),
            (RespValue::bulk("id"), RespValue::Integer(42)),
            (RespValue::bulk("mode"), RespValue::bulk("standalone")),
            (RespValue::bulk("role"), RespValue::bulk("master")),
            (RespValue::bulk("modules"), RespValue::Array(vec![])),
        ])
        .encode()
    }

    #[tokio::test]
    async fn handshake_precedes_pipelined_commands() {
        let (client, mut server) = tokio::io::duplex(4096);
        let config = ClientConfig {
            database: 2,
            ..ClientConfig::default()
        };

        let server_task = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let hello = read_command(&mut server, &mut buf).await;
            assert_eq!(hello[..2], ["HELLO", "3"]);
            server.write_all(&hello_reply()).await.unwrap();

            let select = read_command(&mut server, &mut buf).await;
            assert_eq!(select, ["SELECT", "2"]);
            server.write_all(b"+OK\r\n").await.unwrap();

            let first = read_command(&mut server, &mut buf).await;
            let second = read_command(&mut server, &mut buf).await;
            assert_eq!(first, ["GET", "a"]);
            assert_eq!(second, ["GET", "b"]);
            // Both replies in one write.
            server.write_all(b"$1\r\nA\r\n$1\r\nB\r\n").await.unwrap();
            server
        });

        let conn = Connection::establish(1, "duplex".into(), client, &config, None)
            .await
            .unwrap();
        assert!(conn.is_ready());
        let info = conn.server_info().unwrap();
        assert_eq!(info.server, "redis");
        assert_eq!(info.id, 42);

        let first = conn.submit(&cmd::get("a")).unwrap();
        let second = conn.submit(&cmd::get("b")).unwrap();
        assert_eq!(conn.inflight(), 2);

        assert_eq!(second.await.unwrap().unwrap(), RespValue::bulk("B"));
        assert_eq!(first.await.unwrap().unwrap(), RespValue::bulk("A"));
        assert_eq!(conn.inflight(), 0);
        assert!(conn.is_idle());
        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_error_is_reported() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            read_command(&mut server, &mut buf).await;
            server
                .write_all(b"-WRONGPASS invalid username-password pair\r\n")
                .await
                .unwrap();
            server
        });

        let config = ClientConfig {
            password: Some("nope".into()),
            ..ClientConfig::default()
        };
        let err = Connection::establish(1, "duplex".into(), client, &config, None)
            .await
            .unwrap_err();
        match err {
            ClientError::Handshake(inner) => {
                assert!(matches!(*inner, ClientError::Server(ref m) if m.starts_with("WRONGPASS")))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn protocol_error_fails_every_pending_request() {
        let (client, mut server) = tokio::io::duplex(4096);
        let closed_ids = Arc::new(Mutex::new(Vec::new()));
        let hook_ids = Arc::clone(&closed_ids);

        let server_task = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            read_command(&mut server, &mut buf).await;
            server.write_all(&hello_reply()).await.unwrap();
            read_command(&mut server, &mut buf).await;
            read_command(&mut server, &mut buf).await;
            server.write_all(b"*2\r\n$x\r\n").await.unwrap();
            server
        });

        let hook: CloseHook = Box::new(move |id| hook_ids.lock().push(id));
        let conn = Connection::establish(7, "duplex".into(), client, &ClientConfig::default(), Some(hook))
            .await
            .unwrap();
        let first = conn.submit(&cmd::ping()).unwrap();
        let second = conn.submit(&cmd::ping()).unwrap();

        assert!(matches!(
            first.await.unwrap(),
            Err(ClientError::Protocol(ProtocolError::InvalidDigit(b'x')))
        ));
        assert!(matches!(second.await.unwrap(), Err(ClientError::Protocol(_))));
        assert!(conn.is_closed());
        // The close hook runs on the reader task right after the queue is failed.
        for _ in 0..100 {
            if !closed_ids.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(*closed_ids.lock(), vec![7]);
        assert!(matches!(conn.submit(&cmd::ping()), Err(ClientError::Protocol(_))));
        let _server = server_task.await.unwrap();
    }

    #[tokio::test]
    async fn peer_hangup_closes_connection() {
        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            read_command(&mut server, &mut buf).await;
            server.write_all(&hello_reply()).await.unwrap();
            read_command(&mut server, &mut buf).await;
            drop(server);
        });

        let conn = Connection::establish(1, "duplex".into(), client, &ClientConfig::default(), None)
            .await
            .unwrap();
        let rx = conn.submit(&cmd::ping()).unwrap();
        assert!(matches!(rx.await.unwrap(), Err(ClientError::ConnectionClosed)));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn tls_is_not_supported() {
        let config = ClientConfig {
            tls: true,
            ..ClientConfig::default()
        };
        assert!(matches!(
            Connection::connect(1, &config, None).await,
            Err(ClientError::Unsupported(_))
        ));
    }

    #[test]
    fn server_info_from_resp2_array() {
        let reply = RespValue::Array(vec![
            RespValue::bulk("server"),
            RespValue::bulk("redis"),
            RespValue::bulk("proto"),
            RespValue::Integer(2),
            RespValue::bulk("modules"),
            RespValue::Array(vec![RespValue::Array(vec![
                RespValue::bulk("name"),
                RespValue::bulk("search"),
                RespValue::bulk("ver"),
                RespValue::Integer(20407),
                RespValue::bulk("path"),
                RespValue::bulk("/usr/lib/redis/search.so"),
            ])]),
        ]);
        let info = ServerInfo::from_hello(&reply).unwrap();
        assert_eq!(info.proto, 2);
        assert_eq!(
            info.modules,
            vec![ModuleInfo {
                name: "search".into(),
                ver: 20407,
                path: "/usr/lib/redis/search.so".into(),
            }]
        );
        assert!(ServerInfo::from_hello(&RespValue::simple("OK")).is_err());
    }
}
