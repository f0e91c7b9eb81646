// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-destination statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Statistics for a destination.
#[derive(Debug)]
pub struct DestinationStats {
    /// Invocations answered by the remote side (including application errors).
    pub invocations: AtomicU64,

    /// Payload bytes sent.
    pub bytes_sent: AtomicU64,

    /// Payload bytes received.
    pub bytes_received: AtomicU64,

    /// Application errors returned by remote components.
    pub remote_errors: AtomicU64,

    /// Dispatches that failed on connectivity (reset, timeout).
    pub dispatch_failures: AtomicU64,

    /// Underlying connect attempts started.
    pub connect_attempts: AtomicU64,

    /// Connect attempts that failed.
    pub connect_failures: AtomicU64,

    /// Times an established connection was lost.
    pub disconnects: AtomicU64,

    /// Creation time.
    pub created: Instant,
}

impl Default for DestinationStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationStats {
    pub fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub fn record_invocation(&self, sent: usize, received: usize) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        self.bytes_received.fetch_add(received as u64, Ordering::Relaxed);
    }

    pub fn record_remote_error(&self, sent: usize) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

/// Snapshot of destination statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub invocations: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub remote_errors: u64,
    pub dispatch_failures: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub disconnects: u64,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Calculate invocations per second.
    pub fn invocations_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.invocations as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}
