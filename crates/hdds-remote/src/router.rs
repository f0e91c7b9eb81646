// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Invocation router.
//!
//! Resolves a target to its candidate receivers and dispatches to the first
//! one that is (or becomes) connected. Each destination gets at most one lazy
//! connect per call, however many of its receivers match. Once a payload has been handed to a destination, the
//! call never moves on to another candidate.

use crate::destination::DispatchError;
use crate::error::{AttemptFailure, ConnectivityFailure, InvokeError};
use crate::receiver::ReceiverRegistry;
use crate::target::InvocationTarget;
use crate::transport::Transport;
use std::collections::HashSet;
use std::sync::Arc;

/// Routes invocations through a receiver registry.
pub struct InvocationRouter<T: Transport> {
    registry: Arc<ReceiverRegistry<T>>,
}

impl<T: Transport> Clone for InvocationRouter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Transport> InvocationRouter<T> {
    pub fn new(registry: Arc<ReceiverRegistry<T>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ReceiverRegistry<T>> {
        &self.registry
    }

    /// Invoke `target` with `payload`.
    ///
    /// # Errors
    ///
    /// - [`InvokeError::NoReceiverAvailable`] if no receiver claims the target.
    /// - [`InvokeError::Connectivity`] if no candidate could be reached, or the
    ///   chosen one failed mid-call.
    /// - [`InvokeError::Remote`] if the remote component raised an error.
    /// - [`InvokeError::InvalidRequest`] if the payload could not be sent at all.
    pub async fn invoke(&self, target: &InvocationTarget, payload: &[u8]) -> Result<Vec<u8>, InvokeError> {
        let candidates = self.registry.find_candidates(target);
        if candidates.is_empty() {
            tracing::debug!("No receiver for {}", target);
            return Err(InvokeError::NoReceiverAvailable {
                target: target.clone(),
            });
        }

        let mut attempts: Vec<AttemptFailure> = Vec::new();
        // Overlapping receivers may share a destination; try each one once.
        let mut tried: HashSet<&str> = HashSet::new();

        for receiver in &candidates {
            let destination = receiver.destination();
            if !tried.insert(destination.name()) {
                continue;
            }

            if !destination.is_usable() {
                if let Err(failure) = destination.connect().await {
                    tracing::debug!("Skipping '{}' for {}: {}", destination.name(), target, failure.detail);
                    attempts.push(failure);
                    continue;
                }
            }

            tracing::debug!("Invoking {} via '{}'", target, destination.name());
            return match receiver.dispatch(target, payload).await {
                Ok(reply) => Ok(reply),
                Err(DispatchError::Remote(err)) => {
                    tracing::debug!("Remote error from '{}': {}", err.destination, err.message);
                    Err(InvokeError::Remote(err))
                }
                Err(DispatchError::InvalidRequest(reason)) => Err(InvokeError::InvalidRequest {
                    target: target.clone(),
                    reason,
                }),
                // Lost between connect and dispatch: nothing was sent, try the next one.
                Err(DispatchError::NotConnected(failure)) => {
                    attempts.push(failure);
                    continue;
                }
                Err(DispatchError::Connectivity(failure)) => {
                    attempts.push(failure);
                    let err = ConnectivityFailure {
                        target: target.clone(),
                        attempts,
                    };
                    tracing::warn!("Invocation of {} failed: {}", target, err);
                    Err(InvokeError::Connectivity(err))
                }
            };
        }

        let err = ConnectivityFailure {
            target: target.clone(),
            attempts,
        };
        tracing::warn!("Invocation of {} failed: {}", target, err);
        Err(InvokeError::Connectivity(err))
    }
}
