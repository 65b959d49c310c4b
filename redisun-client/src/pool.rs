//! # Connection Pool
//!
//! Purpose: Spread commands over a bounded set of pipelined connections,
//! preferring one sticky connection until it gets busy, and shrink the set
//! back down once traffic stops.
//!
//! ## Design Principles
//! 1. **Sticky Fast Path**: The last good connection sits in an `RwLock` slot
//!    that submissions only read; only promote and clear take the write
//!    side, and the fast path never touches the pool mutex.
//! 2. **Load, Not Ownership**: Connections stay in the pool while used; the
//!    inflight count decides routing. Overload is a routing hint, never a
//!    rejection.
//! 3. **Reserved Slots**: A connect in progress holds a slot through an RAII
//!    guard, so the bound holds even if the caller is cancelled.
//! 4. **Self-Stopping Reaper**: One supervisor task per pool, started and
//!    stopped by a flag flipped under the pool mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::connection::{CloseHook, Connection};
use crate::error::{ClientError, ClientResult};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live connections.
    pub connections: usize,
    /// Connects in progress.
    pub connecting: usize,
    /// Inflight count per live connection, in pool order.
    pub inflight: Vec<u64>,
    /// Id of the sticky connection, if any.
    pub sticky: Option<u64>,
}

struct PoolState {
    connections: Vec<Arc<Connection>>,
    connecting: usize,
    reaper_running: bool,
    closed: bool,
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
    sticky: RwLock<Option<Arc<Connection>>>,
    connected: Notify,
    next_id: AtomicU64,
    epoch: Instant,
    last_submit_ms: AtomicU64,
}

/// Pool handle. Cloning shares the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

enum Route<'a> {
    Use(Arc<Connection>),
    Overloaded(Arc<Connection>),
    Connect,
    Wait(tokio::sync::futures::Notified<'a>),
}

impl Pool {
    /// Creates a pool and eagerly opens `min_connections`.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let pool = Pool {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    connections: Vec::with_capacity(config.max_connections),
                    connecting: 0,
                    reaper_running: false,
                    closed: false,
                }),
                config,
                sticky: RwLock::new(None),
                connected: Notify::new(),
                next_id: AtomicU64::new(1),
                epoch: Instant::now(),
                last_submit_ms: AtomicU64::new(0),
            }),
        };
        for _ in 0..pool.inner.config.min_connections {
            let slot = pool.try_reserve().ok_or(ClientError::PoolClosed)?;
            let conn = pool.open(slot).await?;
            pool.promote(&conn);
        }
        Ok(pool)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Picks a connection for one command.
    ///
    /// Order: sticky connection under the high-water mark, then the least
    /// loaded pooled connection under the mark, then a new connection if
    /// below `max_connections`, then the least loaded connection regardless.
    pub async fn acquire(&self) -> ClientResult<Arc<Connection>> {
        self.inner.touch();
        if let Some(conn) = self.sticky() {
            return Ok(conn);
        }

        loop {
            match self.route()? {
                Route::Use(conn) => {
                    self.promote(&conn);
                    return Ok(conn);
                }
                Route::Overloaded(conn) => {
                    trace!(conn_id = conn.id(), inflight = conn.inflight(), "All connections busy");
                    return Ok(conn);
                }
                Route::Connect => {
                    let slot = SlotGuard::new(Arc::clone(&self.inner));
                    let conn = self.open(slot).await?;
                    self.promote(&conn);
                    return Ok(conn);
                }
                Route::Wait(notified) => notified.await,
            }
        }
    }

    fn sticky(&self) -> Option<Arc<Connection>> {
        let stale = {
            let sticky = self.inner.sticky.read();
            let conn = sticky.as_ref()?;
            if conn.is_ready() {
                if conn.inflight() < self.inner.config.high_water_mark {
                    return Some(Arc::clone(conn));
                }
                return None;
            }
            Arc::clone(conn)
        };
        self.inner.clear_sticky(&stale);
        None
    }

    fn route(&self) -> ClientResult<Route<'_>> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ClientError::PoolClosed);
        }
        state.connections.retain(|conn| !conn.is_closed());

        let least = state
            .connections
            .iter()
            .min_by_key(|conn| conn.inflight())
            .cloned();
        if let Some(conn) = &least {
            if conn.inflight() < self.inner.config.high_water_mark {
                return Ok(Route::Use(Arc::clone(conn)));
            }
        }
        if state.connections.len() + state.connecting < self.inner.config.max_connections {
            state.connecting += 1;
            return Ok(Route::Connect);
        }
        match least {
            Some(conn) => Ok(Route::Overloaded(conn)),
            // Every slot is a connect in progress. Registered before the
            // lock is released so the completion wakeup cannot be missed.
            None => Ok(Route::Wait(self.inner.connected.notified())),
        }
    }

    fn try_reserve(&self) -> Option<SlotGuard> {
        let mut state = self.inner.state.lock();
        if state.closed
            || state.connections.len() + state.connecting >= self.inner.config.max_connections
        {
            return None;
        }
        state.connecting += 1;
        Some(SlotGuard::new(Arc::clone(&self.inner)))
    }

    async fn open(&self, mut slot: SlotGuard) -> ClientResult<Arc<Connection>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let hook: CloseHook = Box::new(move |id| {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        });
        let conn = Connection::connect(id, &self.inner.config, Some(hook)).await?;

        let start_reaper = {
            let mut state = self.inner.state.lock();
            slot.disarm(&mut state);
            if state.closed {
                drop(state);
                conn.close(ClientError::PoolClosed);
                return Err(ClientError::PoolClosed);
            }
            state.connections.push(Arc::clone(&conn));
            !std::mem::replace(&mut state.reaper_running, true)
        };
        self.inner.connected.notify_waiters();
        if start_reaper {
            debug!("Starting idle reaper");
            tokio::spawn(reap_loop(
                Arc::downgrade(&self.inner),
                self.inner.config.reap_interval(),
            ));
        }
        Ok(conn)
    }

    fn promote(&self, conn: &Arc<Connection>) {
        if conn.is_ready() && conn.inflight() < self.inner.config.high_water_mark {
            *self.inner.sticky.write() = Some(Arc::clone(conn));
        }
    }

    /// Current occupancy.
    pub fn stats(&self) -> PoolStats {
        let sticky = self.inner.sticky.read().as_ref().map(|conn| conn.id());
        let state = self.inner.state.lock();
        let live: Vec<&Arc<Connection>> = state
            .connections
            .iter()
            .filter(|conn| !conn.is_closed())
            .collect();
        PoolStats {
            connections: live.len(),
            connecting: state.connecting,
            inflight: live.iter().map(|conn| conn.inflight()).collect(),
            sticky,
        }
    }

    /// Closes every connection and rejects further acquisitions.
    pub fn close(&self) {
        let connections = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            std::mem::take(&mut state.connections)
        };
        self.inner.sticky.write().take();
        self.inner.connected.notify_waiters();
        for conn in connections {
            conn.close(ClientError::PoolClosed);
        }
    }

    /// Runs one reaper pass immediately.
    pub fn reap_now(&self) {
        self.inner.reap();
    }
}

impl PoolInner {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.last_submit_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_submit_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }

    fn remove(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            let before = state.connections.len();
            state.connections.retain(|conn| conn.id() != id);
            before != state.connections.len()
        };
        let mut sticky = self.sticky.write();
        if sticky.as_ref().map(|conn| conn.id()) == Some(id) {
            *sticky = None;
        }
        if removed {
            debug!(conn_id = id, "Removed connection from pool");
        }
    }

    fn clear_sticky(&self, stale: &Arc<Connection>) {
        let mut sticky = self.sticky.write();
        if sticky
            .as_ref()
            .is_some_and(|conn| Arc::ptr_eq(conn, stale))
        {
            *sticky = None;
        }
    }

    /// One reaper pass. Returns false once the reaper has stopped itself.
    fn reap(&self) -> bool {
        let idle_for = self.idle_for();
        let candidates = {
            let mut state = self.state.lock();
            state.connections.retain(|conn| !conn.is_closed());
            if state.closed || (state.connections.is_empty() && state.connecting == 0) {
                state.reaper_running = false;
                return false;
            }
            if idle_for < self.config.idle_timeout() {
                return true;
            }
            let excess = state
                .connections
                .len()
                .saturating_sub(self.config.min_connections);
            state
                .connections
                .iter()
                .rev()
                .filter(|conn| conn.is_idle())
                .take(excess)
                .cloned()
                .collect::<Vec<_>>()
        };

        // Closing fires the removal hook, which takes the pool lock again.
        let mut reaped = 0;
        for conn in candidates {
            if conn.close_if_idle() {
                reaped += 1;
            }
        }
        if reaped > 0 {
            debug!(reaped, idle_ms = idle_for.as_millis() as u64, "Reaped idle connections");
        }
        true
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for conn in state.connections.drain(..) {
            conn.close(ClientError::PoolClosed);
        }
    }
}

async fn reap_loop(pool: Weak<PoolInner>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = pool.upgrade() else {
            return;
        };
        if !inner.reap() {
            debug!("Idle reaper stopped");
            return;
        }
    }
}

/// A reserved connection slot; released on drop unless disarmed.
struct SlotGuard {
    pool: Arc<PoolInner>,
    armed: bool,
}

impl SlotGuard {
    fn new(pool: Arc<PoolInner>) -> Self {
        SlotGuard { pool, armed: true }
    }

    fn disarm(&mut self, state: &mut PoolState) {
        if self.armed {
            state.connecting = state.connecting.saturating_sub(1);
            self.armed = false;
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.pool.state.lock();
            state.connecting = state.connecting.saturating_sub(1);
        }
        // Waiters re-route and may take the freed slot.
        self.pool.connected.notify_waiters();
    }
}
