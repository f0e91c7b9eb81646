// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport.
//!
//! Each handle owns one TCP connection split into:
//! - a writer task fed with whole encoded frames, so a caller that gives up
//!   mid-send never leaves a partial frame on the socket
//! - a reader task that routes replies to waiting callers by request id
//! - an optional heartbeat task that pings the server
//!
//! EOF, read or write errors and missed pongs mark the handle closed, which
//! fails every pending call and resolves [`Transport::closed`].

use super::protocol::{encode_frame, read_frame, write_frame, ClientFrame, ServerFrame, MAX_FRAME_SIZE};
use super::Transport;
use crate::descriptor::ConnectionDescriptor;
use crate::error::TransportError;
use crate::target::InvocationTarget;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Frames queued for the writer task before senders wait.
const WRITE_QUEUE_DEPTH: usize = 64;

/// TCP transport speaking the length-prefixed JSON protocol.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    client_name: String,
    max_frame_size: usize,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new("hdds-remote")
    }
}

impl TcpTransport {
    /// Create a transport announcing itself as `client_name`.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Builder: set max frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

/// State shared between a handle and its background tasks.
struct Shared {
    destination: String,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerFrame>>>,
    closed: watch::Sender<bool>,
}

impl Shared {
    /// Mark closed and fail every pending call. Returns true on first call.
    fn mark_closed(&self, reason: &str) -> bool {
        let was_closed = self.closed.send_replace(true);
        // Dropping the senders wakes the waiters with an error.
        self.pending.lock().clear();
        if !was_closed {
            tracing::debug!("TCP connection to '{}' closed: {}", self.destination, reason);
        }
        !was_closed
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Removes a pending entry when its caller finishes or gives up.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

/// Live TCP connection.
pub struct TcpHandle {
    shared: Arc<Shared>,
    frames: mpsc::Sender<Vec<u8>>,
    next_id: AtomicU64,
    max_frame_size: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TcpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpHandle")
            .field("destination", &self.shared.destination)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

impl TcpHandle {
    /// Check if the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Send a request frame and wait for the frame answering it.
    ///
    /// Cancel-safe: the frame is either queued whole or not at all, and the
    /// pending entry goes away with the caller.
    async fn request(&self, id: u64, frame: ClientFrame) -> Result<ServerFrame, TransportError> {
        let buf = encode_frame(&frame, self.max_frame_size)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        // Checked after registering so a concurrent close cannot miss this entry.
        if self.shared.is_closed() {
            return Err(TransportError::Closed("connection already closed".into()));
        }

        self.frames
            .send(buf)
            .await
            .map_err(|_| TransportError::Closed("writer stopped".into()))?;

        rx.await
            .map_err(|_| TransportError::Closed("connection closed while awaiting reply".into()))
    }

    /// Requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.lock().len()
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for TcpHandle {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Transport for TcpTransport {
    type Handle = TcpHandle;

    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> impl Future<Output = Result<TcpHandle, TransportError>> + Send {
        let authority = descriptor.authority();
        let destination = descriptor.name.clone();
        let hello = ClientFrame::Hello {
            client: self.client_name.clone(),
            username: descriptor.credentials.as_ref().map(|c| c.username.clone()),
            password: descriptor.credentials.as_ref().and_then(|c| c.password.clone()),
        };
        let heartbeat = descriptor
            .heartbeat_interval
            .map(|interval| (interval, descriptor.invoke_timeout));
        let max_frame_size = self.max_frame_size;

        async move {
            let stream = tokio::time::timeout(timeout, TcpStream::connect(&authority))
                .await
                .map_err(|_| TransportError::Timeout(timeout))??;
            stream.set_nodelay(true)?;

            let (mut reader, mut writer) = stream.into_split();
            write_frame(&mut writer, &hello, max_frame_size).await?;

            let welcome = tokio::time::timeout(
                timeout,
                read_frame::<_, ServerFrame>(&mut reader, max_frame_size),
            )
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
            match welcome {
                Some(ServerFrame::Welcome) => {}
                Some(ServerFrame::Rejected { reason }) => return Err(TransportError::Rejected(reason)),
                Some(other) => {
                    return Err(TransportError::Protocol(format!(
                        "unexpected handshake reply: {:?}",
                        other
                    )))
                }
                None => {
                    return Err(TransportError::Closed(
                        "server closed connection during handshake".into(),
                    ))
                }
            }

            let (closed, _) = watch::channel(false);
            let shared = Arc::new(Shared {
                destination,
                pending: Mutex::new(HashMap::new()),
                closed,
            });
            let (frames, queue) = mpsc::channel(WRITE_QUEUE_DEPTH);
            let handle = TcpHandle {
                shared: Arc::clone(&shared),
                frames: frames.clone(),
                next_id: AtomicU64::new(1),
                max_frame_size,
                tasks: Mutex::new(Vec::new()),
            };

            let writer_task = tokio::spawn(run_writer(writer, queue, Arc::clone(&shared)));
            let reader_task = tokio::spawn(run_reader(reader, Arc::clone(&shared), max_frame_size));
            handle.tasks.lock().extend([writer_task, reader_task]);

            if let Some((interval, pong_timeout)) = heartbeat {
                let task = tokio::spawn(run_heartbeat(
                    Arc::clone(&shared),
                    frames,
                    interval,
                    pong_timeout,
                    max_frame_size,
                ));
                handle.tasks.lock().push(task);
            }

            tracing::debug!("TCP connection to '{}' ({}) established", shared.destination, authority);
            Ok(handle)
        }
    }

    fn send(
        &self,
        handle: &TcpHandle,
        target: &InvocationTarget,
        payload: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let id = handle.next_request_id();
        let frame = ClientFrame::Invoke {
            id,
            module: target.module.clone(),
            component: target.component.clone(),
            interface: target.interface.clone(),
            payload: payload.to_vec(),
        };

        async move {
            match handle.request(id, frame).await? {
                ServerFrame::Reply { payload, .. } => Ok(payload),
                ServerFrame::AppError { message, .. } => Err(TransportError::Application(message)),
                other => Err(TransportError::Protocol(format!(
                    "unexpected reply to invoke: {:?}",
                    other
                ))),
            }
        }
    }

    fn close(&self, handle: &TcpHandle) {
        if !handle.shared.mark_closed("closed locally") {
            return;
        }
        // Aborting the writer drops its half, which shuts down the write side.
        for task in handle.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn closed(&self, handle: &TcpHandle) -> impl Future<Output = ()> + Send {
        let mut rx = handle.shared.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

async fn run_writer(mut writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Vec<u8>>, shared: Arc<Shared>) {
    while let Some(buf) = queue.recv().await {
        let written = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            shared.mark_closed(&format!("write failed: {}", e));
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn run_reader(mut reader: OwnedReadHalf, shared: Arc<Shared>, max_frame_size: usize) {
    loop {
        match read_frame::<_, ServerFrame>(&mut reader, max_frame_size).await {
            Ok(Some(frame)) => {
                let Some(id) = frame.request_id() else {
                    tracing::debug!(
                        "Ignoring unsolicited frame from '{}': {:?}",
                        shared.destination,
                        frame
                    );
                    continue;
                };
                let waiter = shared.pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => tracing::trace!(
                        "Late reply {} from '{}' dropped",
                        id,
                        shared.destination
                    ),
                }
            }
            Ok(None) => {
                shared.mark_closed("peer closed connection");
                return;
            }
            Err(e) => {
                shared.mark_closed(&e.to_string());
                return;
            }
        }
    }
}

async fn run_heartbeat(
    shared: Arc<Shared>,
    frames: mpsc::Sender<Vec<u8>>,
    interval: Duration,
    pong_timeout: Duration,
    max_frame_size: usize,
) {
    // Heartbeat ids count down from the top so they never collide with invocations.
    let mut id = u64::MAX;
    loop {
        tokio::time::sleep(interval).await;
        if shared.is_closed() {
            return;
        }

        let ping = match encode_frame(&ClientFrame::Ping { id }, max_frame_size) {
            Ok(buf) => buf,
            Err(e) => {
                shared.mark_closed(&format!("heartbeat encode failed: {}", e));
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        shared.pending.lock().insert(id, tx);
        if frames.send(ping).await.is_err() {
            shared.mark_closed("heartbeat writer stopped");
            return;
        }

        match tokio::time::timeout(pong_timeout, rx).await {
            Ok(Ok(ServerFrame::Pong { .. })) => {}
            Ok(Ok(other)) => {
                tracing::debug!("Unexpected heartbeat reply: {:?}", other);
            }
            Ok(Err(_)) => return,
            Err(_) => {
                tracing::warn!(
                    "Heartbeat to '{}' not answered within {:?}",
                    shared.destination,
                    pong_timeout
                );
                shared.mark_closed("heartbeat timeout");
                return;
            }
        }
        id -= 1;
    }
}
