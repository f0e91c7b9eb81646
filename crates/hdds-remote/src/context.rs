// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client context.
//!
//! Owns everything one client needs to invoke remote components: the
//! transport, the destination table, the receiver registry, the router and
//! the reconnect supervisor. Independent contexts share nothing.

use crate::config::{ClientConfig, ConfigError};
use crate::descriptor::ConnectionDescriptor;
use crate::destination::{Destination, DestinationSnapshot};
use crate::error::{InvokeError, RegistryError};
use crate::receiver::{Receiver, ReceiverRegistry};
use crate::router::InvocationRouter;
use crate::supervisor::{ReconnectPolicy, ReconnectSupervisor, SupervisorHandle};
use crate::target::{InvocationTarget, TargetSelector};
use crate::transport::Transport;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Context setup errors.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("destination '{0}' already exists")]
    DuplicateDestination(String),

    #[error("unknown destination '{0}'")]
    UnknownDestination(String),
}

/// Client context.
pub struct ClientContext<T: Transport> {
    name: String,
    transport: Arc<T>,
    destinations: Arc<DashMap<String, Arc<Destination<T>>>>,
    registry: Arc<ReceiverRegistry<T>>,
    router: InvocationRouter<T>,
    wake: Arc<Notify>,
    supervisor: Option<SupervisorHandle>,
    shut_down: AtomicBool,
}

impl<T: Transport> ClientContext<T> {
    /// Create an empty context.
    ///
    /// Must be called inside a tokio runtime when `policy.enabled` is set.
    pub fn new(name: impl Into<String>, transport: T, policy: ReconnectPolicy) -> Self {
        let name = name.into();
        let destinations = Arc::new(DashMap::new());
        let registry = Arc::new(ReceiverRegistry::new());
        let wake = Arc::new(Notify::new());

        let supervisor = if policy.enabled {
            Some(ReconnectSupervisor::spawn(
                Arc::clone(&destinations),
                policy,
                Arc::clone(&wake),
            ))
        } else {
            tracing::info!("Reconnect supervisor disabled for '{}'", name);
            None
        };

        Self {
            name,
            transport: Arc::new(transport),
            destinations,
            router: InvocationRouter::new(Arc::clone(&registry)),
            registry,
            wake,
            supervisor,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Build a context from a validated configuration.
    pub fn from_config(config: &ClientConfig, transport: T) -> Result<Self, ContextError> {
        config.validate()?;

        let context = Self::new(&config.name, transport, config.reconnect.policy());
        for dest in &config.destinations {
            context.add_destination(dest.descriptor())?;
        }
        for receiver in &config.receivers {
            context.add_receiver(&receiver.destination, receiver.targets.clone())?;
        }

        tracing::info!(
            "Client '{}' loaded: {} destinations, {} receivers",
            context.name,
            context.destinations.len(),
            context.registry.len()
        );
        Ok(context)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn registry(&self) -> &Arc<ReceiverRegistry<T>> {
        &self.registry
    }

    pub fn router(&self) -> &InvocationRouter<T> {
        &self.router
    }

    pub fn supervisor(&self) -> Option<&SupervisorHandle> {
        self.supervisor.as_ref()
    }

    /// Add a destination in the `Disconnected` state.
    pub fn add_destination(&self, descriptor: ConnectionDescriptor) -> Result<Arc<Destination<T>>, ContextError> {
        use dashmap::mapref::entry::Entry;

        match self.destinations.entry(descriptor.name.clone()) {
            Entry::Occupied(_) => Err(ContextError::DuplicateDestination(descriptor.name)),
            Entry::Vacant(slot) => {
                tracing::debug!("Adding destination '{}' ({})", descriptor.name, descriptor.authority());
                let destination = Arc::new(Destination::with_loss_signal(
                    descriptor,
                    Arc::clone(&self.transport),
                    Some(Arc::clone(&self.wake)),
                ));
                slot.insert(Arc::clone(&destination));
                Ok(destination)
            }
        }
    }

    /// Register a receiver for an existing destination.
    pub fn add_receiver(
        &self,
        destination: &str,
        selectors: Vec<TargetSelector>,
    ) -> Result<Arc<Receiver<T>>, ContextError> {
        let destination = self
            .destination(destination)
            .ok_or_else(|| ContextError::UnknownDestination(destination.to_string()))?;
        Ok(self.registry.register(Receiver::new(destination, selectors))?)
    }

    /// Remove a destination and every receiver bound to it.
    ///
    /// Returns the number of receivers removed.
    pub fn unload_destination(&self, name: &str) -> Result<usize, ContextError> {
        let (_, destination) = self
            .destinations
            .remove(name)
            .ok_or_else(|| ContextError::UnknownDestination(name.to_string()))?;
        let removed = self.registry.unregister(name);
        destination.retire();
        tracing::info!("Unloaded destination '{}' ({} receivers)", name, removed);
        Ok(removed)
    }

    pub fn destination(&self, name: &str) -> Option<Arc<Destination<T>>> {
        self.destinations.get(name).map(|d| Arc::clone(d.value()))
    }

    /// Snapshot of every destination, sorted by name.
    pub fn destinations(&self) -> Vec<DestinationSnapshot> {
        let mut snapshots: Vec<_> = self.destinations.iter().map(|d| d.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Connect every destination once; returns how many are connected afterwards.
    pub async fn connect_all(&self) -> usize {
        let all: Vec<_> = self.destinations.iter().map(|d| Arc::clone(d.value())).collect();
        let mut connected = 0;
        for destination in &all {
            if destination.connect().await.is_ok() {
                connected += 1;
            }
        }
        connected
    }

    /// Invoke a remote component.
    pub async fn invoke(&self, target: &InvocationTarget, payload: &[u8]) -> Result<Vec<u8>, InvokeError> {
        self.router.invoke(target, payload).await
    }

    /// Stop the supervisor and close every connection. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(supervisor) = &self.supervisor {
            supervisor.stop();
        }
        for destination in self.destinations.iter() {
            destination.value().retire();
        }
        tracing::info!("Client '{}' shut down", self.name);
    }
}

impl<T: Transport> Drop for ClientContext<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
