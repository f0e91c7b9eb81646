// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Test server speaking the remote invocation protocol.

#![allow(dead_code)]

use hdds_remote::transport::protocol::{read_frame, write_frame, ClientFrame, ServerFrame, MAX_FRAME_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Echo server that can be started late, stopped and restarted on the same port.
///
/// Replies with `prefix + payload`; a payload of `fail` is answered with an
/// application error.
pub struct EchoServer {
    port: u16,
    prefix: &'static str,
    accept: Mutex<Option<JoinHandle<()>>>,
    connections: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl EchoServer {
    /// Reserve a free port without listening on it yet.
    pub async fn reserve(prefix: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        Self {
            port,
            prefix,
            accept: Mutex::new(None),
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn start(&self) {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await.expect("rebind");
        let connections = Arc::clone(&self.connections);
        let prefix = self.prefix;

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = tokio::spawn(serve(stream, prefix));
                connections.lock().push(conn);
            }
        });
        *self.accept.lock() = Some(task);
    }

    /// Stop listening and drop every open connection.
    pub async fn stop(&self) {
        if let Some(task) = self.accept.lock().take() {
            task.abort();
        }
        for conn in self.connections.lock().drain(..) {
            conn.abort();
        }
        // Let the aborted tasks release their sockets.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn serve(stream: TcpStream, prefix: &'static str) {
    let (mut reader, mut writer) = stream.into_split();

    match read_frame::<_, ClientFrame>(&mut reader, MAX_FRAME_SIZE).await {
        Ok(Some(ClientFrame::Hello { .. })) => {}
        _ => return,
    }
    if write_frame(&mut writer, &ServerFrame::Welcome, MAX_FRAME_SIZE).await.is_err() {
        return;
    }

    while let Ok(Some(frame)) = read_frame::<_, ClientFrame>(&mut reader, MAX_FRAME_SIZE).await {
        let reply = match frame {
            ClientFrame::Invoke { id, payload, .. } if payload == b"fail" => ServerFrame::AppError {
                id,
                message: "component raised an error".into(),
            },
            ClientFrame::Invoke { id, payload, .. } => {
                let mut out = prefix.as_bytes().to_vec();
                out.extend_from_slice(&payload);
                ServerFrame::Reply { id, payload: out }
            }
            ClientFrame::Ping { id } => ServerFrame::Pong { id },
            ClientFrame::Hello { .. } => return,
        };
        if write_frame(&mut writer, &reply, MAX_FRAME_SIZE).await.is_err() {
            return;
        }
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
