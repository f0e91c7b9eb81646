// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receivers and the receiver registry.
//!
//! A [`Receiver`] binds a set of target selectors to one destination. The
//! [`ReceiverRegistry`] keeps them in registration order; lookups read an
//! `ArcSwap` snapshot and never block behind writers or connect attempts.

use crate::destination::{Destination, DispatchError};
use crate::error::RegistryError;
use crate::target::{InvocationTarget, TargetSelector};
use crate::transport::Transport;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Routing handle bound to one destination.
pub struct Receiver<T: Transport> {
    destination: Arc<Destination<T>>,
    selectors: Vec<TargetSelector>,
}

impl<T: Transport> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("destination", &self.destination.name())
            .field("selectors", &self.selectors)
            .finish()
    }
}

impl<T: Transport> Receiver<T> {
    pub fn new(destination: Arc<Destination<T>>, selectors: Vec<TargetSelector>) -> Self {
        Self {
            destination,
            selectors,
        }
    }

    pub fn destination(&self) -> &Arc<Destination<T>> {
        &self.destination
    }

    pub fn destination_name(&self) -> &str {
        self.destination.name()
    }

    pub fn selectors(&self) -> &[TargetSelector] {
        &self.selectors
    }

    /// Can this receiver handle the target (ignoring connectivity)?
    pub fn handles(&self, target: &InvocationTarget) -> bool {
        self.selectors.iter().any(|s| s.matches(target))
    }

    /// True iff the destination is connected.
    pub fn is_usable(&self) -> bool {
        self.destination.is_usable()
    }

    pub async fn dispatch(&self, target: &InvocationTarget, payload: &[u8]) -> Result<Vec<u8>, DispatchError> {
        self.destination.dispatch(target, payload).await
    }
}

/// Ordered set of receivers for one client context.
pub struct ReceiverRegistry<T: Transport> {
    receivers: ArcSwap<Vec<Arc<Receiver<T>>>>,
    write_lock: Mutex<()>,
}

impl<T: Transport> Default for ReceiverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> ReceiverRegistry<T> {
    pub fn new() -> Self {
        Self {
            receivers: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Append a receiver.
    ///
    /// # Errors
    ///
    /// Fails if the receiver declares no selectors, or if a receiver on the
    /// same destination already claims one of its selectors.
    pub fn register(&self, receiver: Receiver<T>) -> Result<Arc<Receiver<T>>, RegistryError> {
        if receiver.selectors.is_empty() {
            return Err(RegistryError::EmptyReceiver(receiver.destination_name().to_string()));
        }

        let _guard = self.write_lock.lock();
        let current = self.receivers.load();

        for existing in current.iter() {
            if existing.destination_name() != receiver.destination_name() {
                continue;
            }
            if let Some(dup) = receiver
                .selectors
                .iter()
                .find(|s| existing.selectors.contains(s))
            {
                return Err(RegistryError::DuplicateTarget {
                    destination: receiver.destination_name().to_string(),
                    selector: dup.to_string(),
                });
            }
        }

        let receiver = Arc::new(receiver);
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&receiver));
        self.receivers.store(Arc::new(next));

        tracing::debug!(
            "Registered receiver for '{}' ({} selectors)",
            receiver.destination_name(),
            receiver.selectors.len()
        );
        Ok(receiver)
    }

    /// Remove every receiver bound to `destination`. Returns how many were removed.
    pub fn unregister(&self, destination: &str) -> usize {
        let _guard = self.write_lock.lock();
        let current = self.receivers.load();

        let next: Vec<_> = current
            .iter()
            .filter(|r| r.destination_name() != destination)
            .cloned()
            .collect();
        let removed = current.len() - next.len();

        if removed > 0 {
            self.receivers.store(Arc::new(next));
            tracing::debug!("Unregistered {} receiver(s) for '{}'", removed, destination);
        }
        removed
    }

    /// Receivers able to handle `target`, in registration order, connected or not.
    pub fn find_candidates(&self, target: &InvocationTarget) -> Vec<Arc<Receiver<T>>> {
        self.receivers
            .load()
            .iter()
            .filter(|r| r.handles(target))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.receivers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.load().is_empty()
    }

    /// Snapshot of all receivers.
    pub fn receivers(&self) -> Arc<Vec<Arc<Receiver<T>>>> {
        self.receivers.load_full()
    }

    /// Distinct destination names, in first-registration order.
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for receiver in self.receivers.load().iter() {
            if !names.iter().any(|n| n == receiver.destination_name()) {
                names.push(receiver.destination_name().to_string());
            }
        }
        names
    }
}
