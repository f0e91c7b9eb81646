// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection descriptors for outbound destinations.

use std::fmt;
use std::time::Duration;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-invocation timeout.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials presented during the connection handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Immutable configuration for one named outbound destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Logical destination name.
    pub name: String,

    /// Remote host (name or address).
    pub host: String,

    /// Remote port.
    pub port: u16,

    /// Optional handshake credentials.
    pub credentials: Option<Credentials>,

    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,

    /// Upper bound for a single dispatch.
    pub invoke_timeout: Duration,

    /// Heartbeat interval for dead-connection detection (None = disabled).
    pub heartbeat_interval: Option<Duration>,
}

impl ConnectionDescriptor {
    /// Create a descriptor with default timeouts and no credentials.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            heartbeat_interval: None,
        }
    }

    /// Builder: set credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    /// Builder: set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set invoke timeout
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Builder: enable heartbeats
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// `host:port` form used for socket resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
