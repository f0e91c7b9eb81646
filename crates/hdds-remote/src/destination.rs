// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination connection state machine.
//!
//! # State Machine
//!
//! ```text
//!      +--------------+
//!      | Disconnected |<-----------------------------+
//!      +------+-------+                              |
//!             | connect()                            |
//!             v                                      |
//!      +--------------+   fail    +--------+         |
//!      |  Connecting  |---------->| Failed |<--+     |
//!      +------+-------+           +---+----+   |     |
//!             | success               |        |     |
//!             v                       | connect()    |
//!      +--------------+   success     |  fail        |
//!      |  Connected   |<--------------+--------------+
//!      +------+-------+                         (transport closed/error)
//! ```
//!
//! Connect attempts are single-flight: the first caller spawns the attempt and
//! every concurrent caller (router or supervisor) subscribes to its outcome.
//! The attempt runs to completion even if every waiter goes away.
//!
//! The live handle is published and revoked together with the state under one
//! short lock, tagged with a generation so stale loss reports are ignored.

use crate::descriptor::ConnectionDescriptor;
use crate::error::{AttemptFailure, ConnectivityKind, RemoteError, TransportError};
use crate::stats::{DestinationStats, StatsSnapshot};
use crate::supervisor::ReconnectPolicy;
use crate::target::InvocationTarget;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};

/// Connection lifecycle of a destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No handle; never connected or connection lost.
    #[default]
    Disconnected,

    /// Connect attempt in progress.
    Connecting,

    /// Handle published and usable.
    Connected,

    /// Last connect attempt failed.
    Failed,
}

impl ConnectionState {
    /// Check if invocations can be dispatched.
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        };
        f.pad(s)
    }
}

/// Outcome of one connect attempt, shared with every waiter.
type ConnectOutcome = Result<(), AttemptFailure>;

/// Published connection.
struct Live<H> {
    handle: Arc<H>,
    generation: u64,
    revoked: Arc<Notify>,
}

struct Inner<H> {
    state: ConnectionState,
    live: Option<Live<H>>,
    generation: u64,
    failures: u32,
    last_attempt: Option<Instant>,
    in_flight: Option<watch::Receiver<Option<ConnectOutcome>>>,
}

/// Error from [`Destination::dispatch`].
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// No live handle at dispatch time.
    NotConnected(AttemptFailure),

    /// Connection failed or timed out mid-call.
    Connectivity(AttemptFailure),

    /// Remote component raised an error.
    Remote(RemoteError),

    /// Request refused locally before anything was written.
    InvalidRequest(String),
}

/// Point-in-time view of a destination.
#[derive(Debug, Clone)]
pub struct DestinationSnapshot {
    pub name: String,
    pub authority: String,
    pub state: ConnectionState,
    pub failures: u32,
    pub since_last_attempt: Option<Duration>,
    pub stats: StatsSnapshot,
}

/// A named outbound destination and its connection state.
pub struct Destination<T: Transport> {
    descriptor: Arc<ConnectionDescriptor>,
    transport: Arc<T>,
    inner: Mutex<Inner<T::Handle>>,
    stats: DestinationStats,
    retired: AtomicBool,
    /// Woken when an established connection is lost.
    lost: Option<Arc<Notify>>,
}

impl<T: Transport> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.descriptor.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<T: Transport> Destination<T> {
    /// Create a destination in the `Disconnected` state.
    pub fn new(descriptor: ConnectionDescriptor, transport: Arc<T>) -> Self {
        Self::with_loss_signal(descriptor, transport, None)
    }

    /// Create a destination that wakes `lost` whenever its connection drops.
    pub fn with_loss_signal(
        descriptor: ConnectionDescriptor,
        transport: Arc<T>,
        lost: Option<Arc<Notify>>,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            transport,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                live: None,
                generation: 0,
                failures: 0,
                last_attempt: None,
                in_flight: None,
            }),
            stats: DestinationStats::new(),
            retired: AtomicBool::new(false),
            lost,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// True iff the destination is `Connected`.
    pub fn is_usable(&self) -> bool {
        self.state().is_usable()
    }

    /// Consecutive failed connect attempts.
    pub fn failures(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn stats(&self) -> &DestinationStats {
        &self.stats
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> DestinationSnapshot {
        let inner = self.inner.lock();
        DestinationSnapshot {
            name: self.descriptor.name.clone(),
            authority: self.descriptor.authority(),
            state: inner.state,
            failures: inner.failures,
            since_last_attempt: inner.last_attempt.map(|t| t.elapsed()),
            stats: self.stats.snapshot(),
        }
    }

    /// Connect, or join the attempt already in flight.
    ///
    /// Returns immediately if already connected. The wait is bounded by the
    /// descriptor's connect timeout. Dropping the returned future abandons the
    /// wait but not the attempt.
    pub async fn connect(self: &Arc<Self>) -> Result<(), AttemptFailure> {
        let Some(mut rx) = self.begin_connect() else {
            return Ok(());
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(AttemptFailure::new(
                self.name(),
                ConnectivityKind::Closed,
                "connect attempt abandoned",
            ))
        })
    }

    /// Start a connect attempt unless one is running or the destination is
    /// connected.
    ///
    /// Returns `None` when already connected, otherwise a receiver for the
    /// outcome of the (possibly shared) attempt.
    pub fn begin_connect(self: &Arc<Self>) -> Option<watch::Receiver<Option<ConnectOutcome>>> {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Connected {
            return None;
        }
        if let Some(rx) = &inner.in_flight {
            return Some(rx.clone());
        }

        if self.is_retired() {
            let (_, rx) = watch::channel(Some(Err(AttemptFailure::new(
                self.name(),
                ConnectivityKind::Closed,
                "destination has been removed",
            ))));
            return Some(rx);
        }

        let (tx, rx) = watch::channel(None);
        inner.state = ConnectionState::Connecting;
        inner.last_attempt = Some(Instant::now());
        inner.in_flight = Some(rx.clone());
        drop(inner);

        self.stats.record_connect_attempt();
        tracing::debug!(
            "Connecting to destination '{}' ({})",
            self.name(),
            self.descriptor.authority()
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run_attempt().await;
            tx.send_replace(Some(outcome));
        });

        Some(rx)
    }

    async fn run_attempt(self: &Arc<Self>) -> ConnectOutcome {
        let timeout = self.descriptor.connect_timeout;
        let opened = tokio::time::timeout(timeout, self.transport.open(&self.descriptor, timeout)).await;

        match opened {
            Ok(Ok(handle)) => self.publish(handle),
            Ok(Err(e)) => Err(self.record_failed_attempt(AttemptFailure::from_transport(self.name(), &e))),
            Err(_) => Err(self.record_failed_attempt(AttemptFailure::new(
                self.name(),
                ConnectivityKind::Timeout,
                format!("connect timed out after {:?}", timeout),
            ))),
        }
    }

    fn record_failed_attempt(&self, failure: AttemptFailure) -> AttemptFailure {
        let failures = {
            let mut inner = self.inner.lock();
            inner.in_flight = None;
            inner.state = ConnectionState::Failed;
            inner.failures = inner.failures.saturating_add(1);
            inner.failures
        };
        self.stats.record_connect_failure();
        tracing::warn!(
            "Connect to destination '{}' failed (attempt {}): {}",
            self.name(),
            failures,
            failure.detail
        );
        failure
    }

    fn publish(self: &Arc<Self>, handle: T::Handle) -> ConnectOutcome {
        let handle = Arc::new(handle);
        let revoked = Arc::new(Notify::new());

        let generation = {
            let mut inner = self.inner.lock();
            inner.in_flight = None;
            if self.is_retired() {
                inner.state = ConnectionState::Disconnected;
                None
            } else {
                inner.generation += 1;
                let generation = inner.generation;
                inner.live = Some(Live {
                    handle: Arc::clone(&handle),
                    generation,
                    revoked: Arc::clone(&revoked),
                });
                inner.state = ConnectionState::Connected;
                inner.failures = 0;
                Some(generation)
            }
        };

        let Some(generation) = generation else {
            self.transport.close(&handle);
            return Err(AttemptFailure::new(
                self.name(),
                ConnectivityKind::Closed,
                "destination removed while connecting",
            ));
        };

        tracing::info!(
            "Destination '{}' connected ({})",
            self.name(),
            self.descriptor.authority()
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = this.transport.closed(&handle) => {
                    this.handle_lost(generation, "transport reported connection closed");
                }
                _ = revoked.notified() => {}
            }
        });

        Ok(())
    }

    /// Current handle and its generation, if connected.
    fn current(&self) -> Option<(Arc<T::Handle>, u64)> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.live) {
            (ConnectionState::Connected, Some(live)) => Some((Arc::clone(&live.handle), live.generation)),
            _ => None,
        }
    }

    /// Revoke the handle of `generation` and move to `next`.
    ///
    /// Returns false when that generation is no longer published.
    fn revoke(&self, generation: u64, next: ConnectionState) -> bool {
        let live = {
            let mut inner = self.inner.lock();
            match &inner.live {
                Some(live) if live.generation == generation => {}
                _ => return false,
            }
            let live = inner.live.take();
            inner.state = next;
            if next == ConnectionState::Failed {
                inner.failures = inner.failures.saturating_add(1);
            }
            live
        };

        if let Some(live) = live {
            live.revoked.notify_one();
            self.transport.close(&live.handle);
        }
        self.stats.record_disconnect();
        if let Some(lost) = &self.lost {
            lost.notify_one();
        }
        true
    }

    /// Connection of `generation` was lost: revoke it and go `Disconnected`.
    pub fn handle_lost(&self, generation: u64, reason: &str) {
        if self.revoke(generation, ConnectionState::Disconnected) {
            tracing::warn!("Destination '{}' disconnected: {}", self.name(), reason);
        }
    }

    /// Connection of `generation` stopped answering: revoke it and go `Failed`.
    pub fn mark_failed(&self, generation: u64, reason: &str) {
        if self.revoke(generation, ConnectionState::Failed) {
            tracing::warn!("Destination '{}' failed: {}", self.name(), reason);
        }
    }

    /// Tear down the live handle, if any. Idempotent.
    pub fn disconnect(&self) {
        let live = {
            let mut inner = self.inner.lock();
            let live = inner.live.take();
            if inner.state == ConnectionState::Connected {
                inner.state = ConnectionState::Disconnected;
            }
            live
        };

        if let Some(live) = live {
            live.revoked.notify_one();
            self.transport.close(&live.handle);
            tracing::info!("Destination '{}' disconnected", self.name());
        }
    }

    /// Remove the destination from service. An attempt still in flight closes
    /// its handle instead of publishing it.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.disconnect();
    }

    /// Whether the supervisor should start a reconnect now.
    pub fn reconnect_due(&self, now: Instant, policy: &ReconnectPolicy) -> bool {
        if self.is_retired() {
            return false;
        }
        let inner = self.inner.lock();
        if inner.in_flight.is_some() {
            return false;
        }
        match inner.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {}
            ConnectionState::Connecting | ConnectionState::Connected => return false,
        }
        match inner.last_attempt {
            Some(last) if inner.failures > 0 => {
                now.saturating_duration_since(last) >= policy.backoff(inner.failures)
            }
            _ => true,
        }
    }

    /// Send one invocation over the live handle.
    ///
    /// Connectivity errors revoke the handle (`Disconnected`); a timeout
    /// revokes it as `Failed`. Remote application errors and requests the
    /// transport refuses before writing change nothing.
    pub async fn dispatch(&self, target: &InvocationTarget, payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let Some((handle, generation)) = self.current() else {
            return Err(DispatchError::NotConnected(AttemptFailure::new(
                self.name(),
                ConnectivityKind::Closed,
                "not connected",
            )));
        };

        let timeout = self.descriptor.invoke_timeout;
        let sent = tokio::time::timeout(timeout, self.transport.send(&handle, target, payload)).await;

        match sent {
            Ok(Ok(reply)) => {
                self.stats.record_invocation(payload.len(), reply.len());
                Ok(reply)
            }
            Ok(Err(TransportError::Application(message))) => {
                self.stats.record_remote_error(payload.len());
                Err(DispatchError::Remote(RemoteError {
                    destination: self.name().to_string(),
                    message,
                }))
            }
            Ok(Err(TransportError::InvalidRequest(reason))) => {
                tracing::debug!("Request to '{}' refused locally: {}", self.name(), reason);
                Err(DispatchError::InvalidRequest(reason))
            }
            Ok(Err(e)) => {
                self.stats.record_dispatch_failure();
                self.handle_lost(generation, &e.to_string());
                Err(DispatchError::Connectivity(AttemptFailure::from_transport(self.name(), &e)))
            }
            Err(_) => {
                self.stats.record_dispatch_failure();
                let detail = format!("invocation timed out after {:?}", timeout);
                self.mark_failed(generation, &detail);
                Err(DispatchError::Connectivity(AttemptFailure::new(
                    self.name(),
                    ConnectivityKind::Timeout,
                    detail,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemTransport;

    const AUTH: &str = "server-two:8080";

    fn setup() -> (Arc<MemTransport>, Arc<Destination<MemTransport>>) {
        let transport = Arc::new(MemTransport::new());
        transport.register(AUTH, |_: &InvocationTarget, payload: &[u8]| {
            let mut reply = b"ECHO:".to_vec();
            reply.extend_from_slice(payload);
            Ok(reply)
        });
        let descriptor = ConnectionDescriptor::new("server-two", "server-two", 8080)
            .with_connect_timeout(Duration::from_millis(200))
            .with_invoke_timeout(Duration::from_millis(200));
        let destination = Arc::new(Destination::new(descriptor, Arc::clone(&transport)));
        (transport, destination)
    }

    fn target() -> InvocationTarget {
        InvocationTarget::new("server-two-module", "EchoOnServerTwo", "RemoteEcho")
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert!(ConnectionState::Connected.is_usable());
        assert!(!ConnectionState::Failed.is_usable());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_fail_then_succeed() {
        let (transport, dest) = setup();
        assert_eq!(dest.state(), ConnectionState::Disconnected);

        let failure = dest.connect().await.expect_err("endpoint down");
        assert_eq!(failure.kind, ConnectivityKind::Refused);
        assert_eq!(dest.state(), ConnectionState::Failed);
        assert_eq!(dest.failures(), 1);

        dest.connect().await.expect_err("still down");
        assert_eq!(dest.failures(), 2);

        transport.start(AUTH);
        dest.connect().await.expect("connect");
        assert!(dest.is_usable());
        assert_eq!(dest.failures(), 0);

        // Already connected is a no-op.
        dest.connect().await.expect("connect");
        assert_eq!(transport.open_count(AUTH), 3);
    }

    #[tokio::test]
    async fn test_connect_timeout_marks_failed() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        transport.set_open_delay(AUTH, Duration::from_secs(5));

        let failure = dest.connect().await.expect_err("timeout");
        assert_eq!(failure.kind, ConnectivityKind::Timeout);
        assert_eq!(dest.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_connects_are_coalesced() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        transport.set_open_delay(AUTH, Duration::from_millis(50));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let dest = Arc::clone(&dest);
            tasks.spawn(async move { dest.connect().await });
        }
        while let Some(result) = tasks.join_next().await {
            result.expect("join").expect("connect");
        }

        assert_eq!(transport.open_count(AUTH), 1);
        assert_eq!(dest.stats().snapshot().connect_attempts, 1);
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_wedge() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        transport.set_open_delay(AUTH, Duration::from_millis(50));

        // Caller gives up long before the attempt finishes.
        let abandoned = tokio::time::timeout(Duration::from_millis(5), dest.connect()).await;
        assert!(abandoned.is_err());
        assert_eq!(dest.state(), ConnectionState::Connecting);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(dest.state(), ConnectionState::Connected);
        assert_eq!(transport.open_count(AUTH), 1);
    }

    #[tokio::test]
    async fn test_transport_close_moves_to_disconnected() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        dest.connect().await.expect("connect");

        transport.stop(AUTH);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dest.state(), ConnectionState::Disconnected);
        assert_eq!(dest.stats().snapshot().disconnects, 1);
    }

    #[tokio::test]
    async fn test_dispatch_paths() {
        let (transport, dest) = setup();

        let err = dest.dispatch(&target(), b"x").await.expect_err("not connected");
        assert!(matches!(err, DispatchError::NotConnected(_)));

        transport.start(AUTH);
        dest.connect().await.expect("connect");
        let reply = dest.dispatch(&target(), b"Hellooooo!").await.expect("dispatch");
        assert_eq!(reply, b"ECHO:Hellooooo!");

        // Silent drop: found out on the next send.
        transport.stop_silently(AUTH);
        let err = dest.dispatch(&target(), b"x").await.expect_err("reset");
        assert!(matches!(err, DispatchError::Connectivity(ref f) if f.kind == ConnectivityKind::Closed));
        assert_eq!(dest.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dispatch_timeout_marks_failed() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        dest.connect().await.expect("connect");
        transport.set_reply_delay(AUTH, Duration::from_secs(5));

        let err = dest.dispatch(&target(), b"x").await.expect_err("timeout");
        assert!(matches!(err, DispatchError::Connectivity(ref f) if f.kind == ConnectivityKind::Timeout));
        assert_eq!(dest.state(), ConnectionState::Failed);
        assert_eq!(dest.failures(), 1);
    }

    #[tokio::test]
    async fn test_stale_loss_report_ignored() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        dest.connect().await.expect("connect");

        dest.handle_lost(999, "stale");
        assert!(dest.is_usable());
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let (transport, dest) = setup();
        dest.disconnect();
        assert_eq!(dest.state(), ConnectionState::Disconnected);

        transport.start(AUTH);
        dest.connect().await.expect("connect");
        dest.disconnect();
        dest.disconnect();
        assert_eq!(dest.state(), ConnectionState::Disconnected);
        assert!(dest.dispatch(&target(), b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_retired_destination_never_reconnects() {
        let (transport, dest) = setup();
        transport.start(AUTH);
        transport.set_open_delay(AUTH, Duration::from_millis(30));

        let rx = dest.begin_connect();
        assert!(rx.is_some());
        dest.retire();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!dest.is_usable());
        assert!(dest.connect().await.is_err());
        assert!(!dest.reconnect_due(Instant::now(), &ReconnectPolicy::default()));
    }

    #[tokio::test]
    async fn test_reconnect_due_respects_backoff() {
        let (_transport, dest) = setup();
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(10),
            ..Default::default()
        };

        assert!(dest.reconnect_due(Instant::now(), &policy));
        dest.connect().await.expect_err("down");
        assert!(!dest.reconnect_due(Instant::now(), &policy));
        assert!(dest.reconnect_due(Instant::now() + Duration::from_secs(11), &policy));
    }
}
