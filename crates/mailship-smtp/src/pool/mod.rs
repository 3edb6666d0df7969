//! Bounded connection pool with direct handoff to queued waiters.

use crate::config::SmtpConfig;
use crate::connection::SmtpConnection;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;

/// What the caller wants done with a connection it is giving back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Reset the transaction state and make the connection available again.
    Reuse,
    /// Send QUIT and close the connection.
    Close,
    /// Drop the connection without further protocol traffic.
    Discard,
}

/// What a queued acquirer receives when the pool has something for it.
#[derive(Debug)]
enum Handoff {
    /// A live connection released by another task, bypassing the idle
    /// stack.
    Connection(Box<SmtpConnection>),
    /// Permission to establish a fresh connection within the bound.
    Permit,
}

#[derive(Debug)]
struct PoolState {
    /// Reusable connections, most recently released last.
    idle: Vec<SmtpConnection>,
    /// Queued acquirers, oldest first.
    waiters: VecDeque<oneshot::Sender<Handoff>>,
    /// Connections checked out or being established. Together with
    /// `idle.len()` this never exceeds the configured maximum.
    in_flight: usize,
    /// Set once by [`SmtpPool::shutdown`].
    closed: bool,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections parked and ready for reuse.
    pub idle: usize,
    /// Connections checked out or being established.
    pub in_flight: usize,
    /// Acquirers queued for a connection.
    pub waiting: usize,
}

/// Bounded pool of SMTP connections.
///
/// At most `max_connections` connections exist at once, counting idle and
/// checked-out ones together. When the bound is reached, acquirers queue in
/// FIFO order and a released connection goes straight to the oldest waiter
/// instead of through the idle stack. Idle reuse is LIFO so a small pool
/// keeps a warm connection busy instead of cycling cold ones.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub struct SmtpPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    config: SmtpConfig,
    state: Mutex<PoolState>,
}

impl SmtpPool {
    /// Creates a pool that dials with the given configuration.
    #[must_use]
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    waiters: VecDeque::new(),
                    in_flight: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// The configuration this pool dials with.
    #[must_use]
    pub fn config(&self) -> &SmtpConfig {
        &self.inner.config
    }

    /// Checks out a ready-to-use connection.
    ///
    /// Preference order: the most recently released idle connection, then a
    /// freshly established one when the bound allows, otherwise a queue
    /// slot with a deadline. With pooling disabled every call establishes a
    /// fresh connection and [`Self::release`] always closes it.
    ///
    /// Give the connection back with [`Self::release`]; a connection
    /// dropped instead of released keeps its slot occupied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] once the pool is shut down,
    /// [`Error::QueueTimeout`] when the wait deadline passes, or any
    /// session setup error.
    pub async fn acquire(&self) -> Result<SmtpConnection> {
        if !self.inner.config.pool.enabled {
            if self.inner.state.lock().await.closed {
                return Err(Error::Shutdown);
            }
            return SmtpConnection::establish(&self.inner.config).await;
        }

        let rx = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::Shutdown);
            }

            // Connections that went stale while parked are dropped,
            // freeing their slot.
            while let Some(conn) = state.idle.pop() {
                if conn.is_open() {
                    state.in_flight += 1;
                    return Ok(conn);
                }
                tracing::debug!("dropping stale idle connection");
            }

            if state.in_flight < self.inner.config.pool.max_connections {
                state.in_flight += 1;
                drop(state);
                return self.establish_with_slot().await;
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            tracing::debug!(
                waiting = state.waiters.len(),
                "pool exhausted, queueing acquirer"
            );
            rx
        };

        self.wait_for_handoff(rx).await
    }

    /// Returns a connection to the pool.
    ///
    /// `Reuse` resets the transaction with RSET first; a failed reset
    /// downgrades to a close because the channel state is no longer
    /// trustworthy. `Close` says goodbye with QUIT. `Discard` drops the
    /// connection without further traffic and is the right choice after
    /// any send failure.
    pub async fn release(&self, mut conn: SmtpConnection, disposition: Disposition) {
        if !self.inner.config.pool.enabled {
            Self::finish(conn, disposition).await;
            return;
        }

        let reusable = match disposition {
            Disposition::Reuse if conn.is_open() => match conn.rset().await {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(error = %err, "RSET failed, not reusing connection");
                    false
                }
            },
            _ => false,
        };

        if reusable {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                state.in_flight -= 1;
                drop(state);
                let _ = conn.quit().await;
                return;
            }
            Self::park_or_hand_over(&mut state, conn);
            return;
        }

        Self::finish(conn, disposition).await;
        let mut state = self.inner.state.lock().await;
        Self::free_slot(&mut state);
    }

    /// Shuts the pool down.
    ///
    /// Idle connections get a QUIT, queued acquirers fail with
    /// [`Error::Shutdown`], and so does every later acquire. Connections
    /// currently checked out are closed when released.
    pub async fn shutdown(&self) {
        let idle = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.waiters.clear();
            std::mem::take(&mut state.idle)
        };
        tracing::debug!(connections = idle.len(), "shutting down connection pool");
        for conn in idle {
            if let Err(err) = conn.quit().await {
                tracing::debug!(error = %err, "QUIT during shutdown failed");
            }
        }
    }

    /// Point-in-time counters, mostly for logging and tests.
    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        PoolStats {
            idle: state.idle.len(),
            in_flight: state.in_flight,
            waiting: state.waiters.len(),
        }
    }

    /// Establishes a new connection against an already reserved slot.
    async fn establish_with_slot(&self) -> Result<SmtpConnection> {
        match SmtpConnection::establish(&self.inner.config).await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                let mut state = self.inner.state.lock().await;
                Self::free_slot(&mut state);
                Err(err)
            }
        }
    }

    async fn wait_for_handoff(&self, mut rx: oneshot::Receiver<Handoff>) -> Result<SmtpConnection> {
        let wait = self.inner.config.pool.wait_timeout;
        match timeout(wait, &mut rx).await {
            Ok(Ok(Handoff::Connection(conn))) => Ok(*conn),
            Ok(Ok(Handoff::Permit)) => self.establish_with_slot().await,
            // The sender side only disappears when the pool shuts down.
            Ok(Err(_)) => Err(Error::Shutdown),
            Err(_) => {
                // A handoff may have raced the deadline; put it back.
                match rx.try_recv() {
                    Ok(Handoff::Connection(conn)) => {
                        let mut state = self.inner.state.lock().await;
                        Self::park_or_hand_over(&mut state, *conn);
                    }
                    Ok(Handoff::Permit) => {
                        let mut state = self.inner.state.lock().await;
                        Self::free_slot(&mut state);
                    }
                    Err(_) => {}
                }
                Err(Error::QueueTimeout(wait))
            }
        }
    }

    /// Gives a live connection to the oldest waiter still listening, or
    /// parks it on the idle stack. The slot travels with the connection.
    fn park_or_hand_over(state: &mut PoolState, conn: SmtpConnection) {
        if state.closed {
            state.in_flight -= 1;
            return;
        }
        let mut handoff = Handoff::Connection(Box::new(conn));
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(handoff) {
                Ok(()) => return,
                Err(back) => handoff = back,
            }
        }
        let Handoff::Connection(conn) = handoff else {
            return;
        };
        state.in_flight -= 1;
        state.idle.push(*conn);
    }

    /// Frees a reserved slot, passing it to the oldest live waiter as a
    /// permit to establish.
    fn free_slot(state: &mut PoolState) {
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(Handoff::Permit).is_ok() {
                return;
            }
        }
        state.in_flight -= 1;
    }

    async fn finish(conn: SmtpConnection, disposition: Disposition) {
        match disposition {
            Disposition::Discard => drop(conn),
            Disposition::Reuse | Disposition::Close => {
                if conn.is_open() {
                    if let Err(err) = conn.quit().await {
                        tracing::debug!(error = %err, "QUIT failed");
                    }
                }
            }
        }
    }
}
