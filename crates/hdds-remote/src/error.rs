// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for remote invocations.
//!
//! Callers branch on [`InvokeError`]:
//!
//! - [`InvokeError::NoReceiverAvailable`] - no configuration claims the target (permanent)
//! - [`InvokeError::Connectivity`] - connect or dispatch failed (transient)
//! - [`InvokeError::Remote`] - the remote component raised an application error

use crate::target::InvocationTarget;
use std::fmt;
use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request could not be encoded or exceeds the frame limit.
    /// Nothing was written and the connection is untouched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The remote component raised an error. Not a connectivity problem.
    #[error("remote application error: {0}")]
    Application(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => Self::Refused(e.to_string()),
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => Self::Closed(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl TransportError {
    /// Classify this error for connectivity reporting.
    ///
    /// Returns `None` for application errors and invalid requests.
    pub fn connectivity_kind(&self) -> Option<ConnectivityKind> {
        match self {
            Self::Refused(_) => Some(ConnectivityKind::Refused),
            Self::Closed(_) => Some(ConnectivityKind::Closed),
            Self::Timeout(_) => Some(ConnectivityKind::Timeout),
            Self::Rejected(_) => Some(ConnectivityKind::Rejected),
            Self::Io(_) | Self::Protocol(_) => Some(ConnectivityKind::Io),
            Self::Application(_) | Self::InvalidRequest(_) => None,
        }
    }
}

/// Kind of connectivity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityKind {
    /// Remote endpoint refused or was unreachable.
    Refused,
    /// Connection closed or reset, possibly mid-call.
    Closed,
    /// Connect or dispatch exceeded its timeout.
    Timeout,
    /// Handshake (authentication) refused by the remote server.
    Rejected,
    /// Other I/O or framing failure.
    Io,
}

impl fmt::Display for ConnectivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Refused => "refused",
            Self::Closed => "closed",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Io => "io",
        };
        write!(f, "{}", s)
    }
}

/// A single failed connect or dispatch attempt against one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub destination: String,
    pub kind: ConnectivityKind,
    pub detail: String,
}

impl AttemptFailure {
    pub fn new(destination: impl Into<String>, kind: ConnectivityKind, detail: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            kind,
            detail: detail.into(),
        }
    }

    pub(crate) fn from_transport(destination: &str, err: &TransportError) -> Self {
        Self::new(
            destination,
            err.connectivity_kind().unwrap_or(ConnectivityKind::Io),
            err.to_string(),
        )
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.destination, self.kind, self.detail)
    }
}

/// Aggregate connectivity failure for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityFailure {
    pub target: InvocationTarget,
    pub attempts: Vec<AttemptFailure>,
}

impl ConnectivityFailure {
    /// True when any attempt ended in a timeout.
    pub fn is_timeout(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.kind == ConnectivityKind::Timeout)
    }
}

impl fmt::Display for ConnectivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no connected receiver for {}", self.target)?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, attempt)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConnectivityFailure {}

/// Application-level error raised by the remote component.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{destination}: {message}")]
pub struct RemoteError {
    pub destination: String,
    pub message: String,
}

/// Result of a failed [`invoke`](crate::router::InvocationRouter::invoke).
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("no receiver available for {target}")]
    NoReceiverAvailable { target: InvocationTarget },

    #[error("connectivity failure: {0}")]
    Connectivity(#[from] ConnectivityFailure),

    #[error("remote error from {0}")]
    Remote(#[from] RemoteError),

    /// The request was refused locally before anything was sent.
    #[error("invalid request for {target}: {reason}")]
    InvalidRequest { target: InvocationTarget, reason: String },
}

impl InvokeError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Connectivity(c) => c.is_timeout(),
            _ => false,
        }
    }

    pub fn is_no_receiver(&self) -> bool {
        matches!(self, Self::NoReceiverAvailable { .. })
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(r) => Some(r),
            _ => None,
        }
    }
}

/// Receiver registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("destination '{destination}' already has a receiver claiming '{selector}'")]
    DuplicateTarget { destination: String, selector: String },

    #[error("receiver for destination '{0}' declares no targets")]
    EmptyReceiver(String),
}
