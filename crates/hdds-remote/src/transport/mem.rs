// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport.
//!
//! Endpoints are registered by `host:port` authority with a handler closure and
//! can be started, stopped, restarted or slowed down at runtime. Stopping an
//! endpoint closes every handle opened against it, the same way a crashed
//! server would be observed by a real transport.

use super::Transport;
use crate::descriptor::ConnectionDescriptor;
use crate::error::TransportError;
use crate::target::InvocationTarget;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Endpoint request handler: `Ok(reply)` or an application error message.
pub type Handler = Arc<dyn Fn(&InvocationTarget, &[u8]) -> Result<Vec<u8>, String> + Send + Sync>;

struct Endpoint {
    handler: Handler,
    up: bool,
    /// Bumped on every stop so handles from a previous run stay dead.
    epoch: u64,
    open_delay: Duration,
    reply_delay: Duration,
    open_count: u64,
    live: Vec<Weak<watch::Sender<bool>>>,
}

impl Endpoint {
    fn close_live(&mut self) {
        for closed in self.live.drain(..).filter_map(|w| w.upgrade()) {
            closed.send_replace(true);
        }
    }
}

/// Handle to an in-process endpoint.
#[derive(Debug)]
pub struct MemHandle {
    authority: String,
    epoch: u64,
    closed: Arc<watch::Sender<bool>>,
}

impl MemHandle {
    /// Authority the handle is connected to.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// In-process transport with controllable endpoints.
#[derive(Clone, Default)]
pub struct MemTransport {
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. It starts stopped.
    pub fn register<F>(&self, authority: impl Into<String>, handler: F)
    where
        F: Fn(&InvocationTarget, &[u8]) -> Result<Vec<u8>, String> + Send + Sync + 'static,
    {
        self.endpoints.lock().insert(
            authority.into(),
            Endpoint {
                handler: Arc::new(handler),
                up: false,
                epoch: 0,
                open_delay: Duration::ZERO,
                reply_delay: Duration::ZERO,
                open_count: 0,
                live: Vec::new(),
            },
        );
    }

    /// Make an endpoint reachable.
    pub fn start(&self, authority: &str) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.up = true;
        }
    }

    /// Make an endpoint unreachable and close every open handle.
    pub fn stop(&self, authority: &str) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.up = false;
            ep.epoch += 1;
            ep.close_live();
        }
    }

    /// Make an endpoint unreachable without notifying open handles.
    ///
    /// Handles only find out on their next send (like a silently dropped peer).
    pub fn stop_silently(&self, authority: &str) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.up = false;
            ep.epoch += 1;
            ep.live.clear();
        }
    }

    /// Close every open handle but keep the endpoint reachable.
    pub fn drop_connections(&self, authority: &str) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.epoch += 1;
            ep.close_live();
        }
    }

    /// Delay applied to every open against the endpoint.
    pub fn set_open_delay(&self, authority: &str, delay: Duration) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.open_delay = delay;
        }
    }

    /// Delay applied before every reply from the endpoint.
    pub fn set_reply_delay(&self, authority: &str, delay: Duration) {
        if let Some(ep) = self.endpoints.lock().get_mut(authority) {
            ep.reply_delay = delay;
        }
    }

    /// Number of open attempts made against the endpoint.
    pub fn open_count(&self, authority: &str) -> u64 {
        self.endpoints
            .lock()
            .get(authority)
            .map(|ep| ep.open_count)
            .unwrap_or(0)
    }
}

impl Transport for MemTransport {
    type Handle = MemHandle;

    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        _timeout: Duration,
    ) -> impl Future<Output = Result<MemHandle, TransportError>> + Send {
        let authority = descriptor.authority();
        let endpoints = Arc::clone(&self.endpoints);

        async move {
            let delay = {
                let mut eps = endpoints.lock();
                let ep = eps
                    .get_mut(&authority)
                    .ok_or_else(|| TransportError::Refused(format!("no endpoint at {}", authority)))?;
                ep.open_count += 1;
                ep.open_delay
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut eps = endpoints.lock();
            let ep = eps
                .get_mut(&authority)
                .ok_or_else(|| TransportError::Refused(format!("no endpoint at {}", authority)))?;
            if !ep.up {
                return Err(TransportError::Refused(format!("{} is down", authority)));
            }

            let (closed, _) = watch::channel(false);
            let closed = Arc::new(closed);
            ep.live.retain(|w| w.strong_count() > 0);
            ep.live.push(Arc::downgrade(&closed));
            Ok(MemHandle {
                authority,
                epoch: ep.epoch,
                closed,
            })
        }
    }

    fn send(
        &self,
        handle: &MemHandle,
        target: &InvocationTarget,
        payload: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let endpoints = Arc::clone(&self.endpoints);
        let target = target.clone();
        let payload = payload.to_vec();

        async move {
            let lookup = |endpoints: &Mutex<HashMap<String, Endpoint>>| {
                let eps = endpoints.lock();
                match eps.get(&handle.authority) {
                    Some(ep) if ep.up && ep.epoch == handle.epoch && !handle.is_closed() => {
                        Ok((Arc::clone(&ep.handler), ep.reply_delay))
                    }
                    _ => Err(TransportError::Closed(format!(
                        "connection to {} reset",
                        handle.authority
                    ))),
                }
            };

            let (_, delay) = lookup(&*endpoints)?;
            if !delay.is_zero() {
                let mut closed = handle.closed.subscribe();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = closed.wait_for(|c| *c) => {
                        return Err(TransportError::Closed(format!(
                            "connection to {} closed mid-call",
                            handle.authority
                        )));
                    }
                }
            }

            // Re-check: the endpoint may have gone away while the reply was delayed.
            let (handler, _) = lookup(&*endpoints)?;
            handler(&target, &payload).map_err(TransportError::Application)
        }
    }

    fn close(&self, handle: &MemHandle) {
        handle.closed.send_replace(true);
    }

    fn closed(&self, handle: &MemHandle) -> impl Future<Output = ()> + Send {
        let mut rx = handle.closed.subscribe();
        async move {
            let _ = rx.wait_for(|c| *c).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(_: &InvocationTarget, payload: &[u8]) -> Result<Vec<u8>, String> {
        Ok(payload.to_vec())
    }

    #[tokio::test]
    async fn test_mem_lifecycle() {
        let transport = MemTransport::new();
        transport.register("b:1", echo);
        let descriptor = ConnectionDescriptor::new("b", "b", 1);
        let target = InvocationTarget::new("m", "c", "i");

        let err = transport
            .open(&descriptor, Duration::from_secs(1))
            .await
            .expect_err("down");
        assert!(matches!(err, TransportError::Refused(_)));
        assert_eq!(transport.open_count("b:1"), 1);

        transport.start("b:1");
        let handle = transport
            .open(&descriptor, Duration::from_secs(1))
            .await
            .expect("open");
        assert_eq!(transport.send(&handle, &target, b"x").await.expect("send"), b"x");

        transport.stop("b:1");
        assert!(handle.is_closed());
        let err = transport.send(&handle, &target, b"x").await.expect_err("stopped");
        assert!(matches!(err, TransportError::Closed(_)));

        // Restart does not revive old handles.
        transport.start("b:1");
        assert!(transport.send(&handle, &target, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_mem_unknown_endpoint() {
        let transport = MemTransport::new();
        let descriptor = ConnectionDescriptor::new("x", "nowhere", 9);
        assert!(transport
            .open(&descriptor, Duration::from_secs(1))
            .await
            .is_err());
        assert_eq!(transport.open_count("nowhere:9"), 0);
    }

    #[tokio::test]
    async fn test_mem_closed_resolves_on_drop_connections() {
        let transport = MemTransport::new();
        transport.register("b:1", echo);
        transport.start("b:1");
        let handle = transport
            .open(&ConnectionDescriptor::new("b", "b", 1), Duration::from_secs(1))
            .await
            .expect("open");

        transport.drop_connections("b:1");
        tokio::time::timeout(Duration::from_secs(1), transport.closed(&handle))
            .await
            .expect("closed resolves");
    }

    #[tokio::test]
    async fn test_mem_application_error() {
        let transport = MemTransport::new();
        transport.register("b:1", |_: &InvocationTarget, _: &[u8]| Err("bean threw".to_string()));
        transport.start("b:1");
        let handle = transport
            .open(&ConnectionDescriptor::new("b", "b", 1), Duration::from_secs(1))
            .await
            .expect("open");

        let err = transport
            .send(&handle, &InvocationTarget::new("m", "c", "i"), b"x")
            .await
            .expect_err("app error");
        assert!(matches!(err, TransportError::Application(ref m) if m == "bean threw"));
    }
}
