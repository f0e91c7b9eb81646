// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reconnection supervisor.
//!
//! Background task that periodically scans every destination and starts a
//! connect attempt for those that are `Disconnected` or `Failed` and whose
//! backoff has elapsed. Attempts go through the same single-flight path as
//! the router, so the supervisor never races a caller for the same
//! destination.

use crate::destination::Destination;
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Default delay after the first failure.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default backoff cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default scan period.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Reconnect policy: capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Run the supervisor at all.
    pub enabled: bool,

    /// Delay after the first consecutive failure.
    pub initial_delay: Duration,

    /// Backoff cap.
    pub max_delay: Duration,

    /// How often destinations are scanned.
    pub scan_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl ReconnectPolicy {
    /// Policy with the supervisor switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Minimum wait after the last attempt given `failures` consecutive failures.
    ///
    /// Zero failures means no wait (a connection that was lost is retried on
    /// the next scan); otherwise `initial * 2^(failures-1)`, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let shift = (failures - 1).min(31);
        self.initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Handle to a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SupervisorHandle {
    /// Stop the supervisor. It exits at its next wake-up.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Trigger a scan now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }
}

/// Reconnection supervisor.
pub struct ReconnectSupervisor;

impl ReconnectSupervisor {
    /// Spawn the supervisor on the current tokio runtime.
    ///
    /// `wake` is shared with destinations so a lost connection triggers an
    /// immediate scan.
    pub fn spawn<T: Transport>(
        destinations: Arc<DashMap<String, Arc<Destination<T>>>>,
        policy: ReconnectPolicy,
        wake: Arc<Notify>,
    ) -> SupervisorHandle {
        let running = Arc::new(AtomicBool::new(true));
        let handle = SupervisorHandle {
            running: Arc::clone(&running),
            wake: Arc::clone(&wake),
        };

        tracing::info!(
            "Reconnect supervisor started (scan {:?}, backoff {:?}..{:?})",
            policy.scan_interval,
            policy.initial_delay,
            policy.max_delay
        );

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                Self::scan(&*destinations, &policy);

                tokio::select! {
                    _ = tokio::time::sleep(policy.scan_interval) => {}
                    _ = wake.notified() => {}
                }
            }
            tracing::info!("Reconnect supervisor stopped");
        });

        handle
    }

    /// Start a connect attempt for every due destination. Returns how many.
    pub fn scan<T: Transport>(
        destinations: &DashMap<String, Arc<Destination<T>>>,
        policy: &ReconnectPolicy,
    ) -> usize {
        let now = Instant::now();
        // Collect first so no map shard lock is held while spawning.
        let due: Vec<Arc<Destination<T>>> = destinations
            .iter()
            .filter(|entry| entry.value().reconnect_due(now, policy))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for destination in &due {
            tracing::debug!(
                "Reconnecting destination '{}' (failures: {})",
                destination.name(),
                destination.failures()
            );
            // Outcome is recorded by the destination itself.
            let _ = destination.begin_connect();
        }
        due.len()
    }
}
