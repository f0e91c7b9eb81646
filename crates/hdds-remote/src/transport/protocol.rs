// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote invocation wire protocol.
//!
//! Simple length-prefixed JSON protocol used by [`TcpTransport`](super::TcpTransport).
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! A connection starts with `hello` from the client, answered by `welcome`
//! or `rejected`. Afterwards `invoke` and `ping` frames carry a request id
//! echoed by the matching `result`, `app_error` or `pong`.

use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Handshake.
    Hello {
        client: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },

    /// Invoke a component interface.
    Invoke {
        id: u64,
        module: String,
        component: String,
        interface: String,
        payload: Vec<u8>,
    },

    /// Heartbeat request.
    Ping { id: u64 },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    Welcome,

    /// Handshake refused (bad credentials, unknown client).
    Rejected { reason: String },

    /// Successful invocation result.
    #[serde(rename = "result")]
    Reply { id: u64, payload: Vec<u8> },

    /// The remote component raised an error.
    AppError { id: u64, message: String },

    /// Heartbeat answer.
    Pong { id: u64 },
}

impl ServerFrame {
    /// Request id this frame answers, if any.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Self::Reply { id, .. } | Self::AppError { id, .. } | Self::Pong { id } => Some(*id),
            Self::Welcome | Self::Rejected { .. } => None,
        }
    }
}

/// Encode one frame, length prefix included.
///
/// Fails with [`TransportError::InvalidRequest`] when the message cannot be
/// serialized or exceeds `max_frame_size`.
pub fn encode_frame<M: Serialize>(msg: &M, max_frame_size: usize) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg)
        .map_err(|e| TransportError::InvalidRequest(format!("Serialize error: {}", e)))?;

    if json.len() > max_frame_size {
        return Err(TransportError::InvalidRequest(format!(
            "Frame too large: {} > {}",
            json.len(),
            max_frame_size
        )));
    }

    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Write one frame.
pub async fn write_frame<W, M>(
    writer: &mut W,
    msg: &M,
    max_frame_size: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    let buf = encode_frame(msg, max_frame_size)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly.
pub async fn read_frame<R, M>(reader: &mut R, max_frame_size: usize) -> Result<Option<M>, TransportError>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(TransportError::Protocol("Empty frame".into()));
    }
    if len > max_frame_size {
        return Err(TransportError::Protocol(format!(
            "Frame too large: {} > {}",
            len, max_frame_size
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let msg = serde_json::from_slice(&body)
        .map_err(|e| TransportError::Protocol(format!("Invalid JSON: {}", e)))?;
    Ok(Some(msg))
}
