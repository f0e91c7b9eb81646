// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Remote Invocation Client
//!
//! Outbound connection management and receiver routing for invoking
//! components hosted on remote servers.
//!
//! # Features
//!
//! - **Lazy Connect**: Destinations connect on first use, never at startup
//! - **Fail Fast**: Unreachable destinations fail the call instead of blocking it
//! - **Automatic Reconnect**: Background supervisor with capped exponential backoff
//! - **Lock-Free Routing**: Receiver lookups never wait on connect attempts
//!
//! # Quick Start
//!
//! ```bash
//! # Generate a sample configuration
//! hdds-remote gen-config --output remote.toml
//!
//! # Invoke a remote component
//! hdds-remote --config remote.toml invoke server-two-module/EchoOnServerTwo!RemoteEcho "Hellooooo!"
//! ```
//!
//! # Library Usage
//!
//! ```no_run
//! use hdds_remote::{ClientConfig, ClientContext, InvocationTarget, TcpTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_file("remote.toml")?;
//! let context = ClientContext::from_config(&config, TcpTransport::new(&config.name))?;
//!
//! let target: InvocationTarget = "server-two-module/EchoOnServerTwo!RemoteEcho".parse()?;
//! let _reply = context.invoke(&target, b"Hellooooo!").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod descriptor;
pub mod destination;
pub mod error;
pub mod receiver;
pub mod router;
pub mod stats;
pub mod supervisor;
pub mod target;
pub mod transport;

pub use config::{ClientConfig, ConfigError, DestinationConfig, ReceiverConfig, ReconnectConfig};
pub use context::{ClientContext, ContextError};
pub use descriptor::{ConnectionDescriptor, Credentials};
pub use destination::{ConnectionState, Destination, DestinationSnapshot};
pub use error::{
    AttemptFailure, ConnectivityFailure, ConnectivityKind, InvokeError, RegistryError, RemoteError,
    TransportError,
};
pub use receiver::{Receiver, ReceiverRegistry};
pub use router::InvocationRouter;
pub use stats::{DestinationStats, StatsSnapshot};
pub use supervisor::{ReconnectPolicy, ReconnectSupervisor, SupervisorHandle};
pub use target::{InvocationTarget, ParseTargetError, TargetSelector};
pub use transport::{MemTransport, TcpTransport, Transport};
