// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport capability used by destinations.
//!
//! The connection manager is agnostic to the wire format. A transport only
//! needs to open a handle, send one invocation over it, close it, and report
//! when the connection behind a handle has died.
//!
//! Implementations:
//! - [`tcp::TcpTransport`] - length-prefixed JSON frames over TCP
//! - [`mem::MemTransport`] - in-process endpoints that can be started, stopped and delayed

pub mod mem;
pub mod protocol;
pub mod tcp;

use crate::descriptor::ConnectionDescriptor;
use crate::error::TransportError;
use crate::target::InvocationTarget;
use std::future::Future;
use std::time::Duration;

pub use mem::{MemHandle, MemTransport};
pub use tcp::{TcpHandle, TcpTransport};

/// Narrow transport capability: `open`, `send`, `close`, `closed`.
pub trait Transport: Send + Sync + 'static {
    /// Live connection handle.
    type Handle: Send + Sync + 'static;

    /// Establish a connection to the destination.
    ///
    /// Expected network failures are returned as errors, never panics.
    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Handle, TransportError>> + Send;

    /// Send one invocation and wait for its reply.
    ///
    /// An error raised by the remote component must be returned as
    /// [`TransportError::Application`].
    fn send(
        &self,
        handle: &Self::Handle,
        target: &InvocationTarget,
        payload: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Tear the connection down. Idempotent; in-flight sends must fail.
    fn close(&self, handle: &Self::Handle);

    /// Resolves once the transport observes the connection is gone
    /// (EOF, I/O error, heartbeat timeout or `close`).
    fn closed(&self, handle: &Self::Handle) -> impl Future<Output = ()> + Send {
        let _ = handle;
        std::future::pending()
    }
}
