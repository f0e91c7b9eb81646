// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! name = "server-one"
//!
//! [[destinations]]
//! name = "server-two"
//! host = "127.0.0.1"
//! port = 8080
//! username = "quickuser1"
//!
//! [[receivers]]
//! destination = "server-two"
//! targets = [{ module = "server-two-module", component = "EchoOnServerTwo" }]
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! ```

use crate::descriptor::ConnectionDescriptor;
use crate::supervisor::ReconnectPolicy;
use crate::target::TargetSelector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client name (sent in the handshake).
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Outbound destinations.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// Receivers, in routing priority order.
    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,

    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_client_name() -> String {
    "hdds-remote".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_invoke_timeout_ms() -> u64 {
    30_000
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_scan_interval_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            destinations: Vec::new(),
            receivers: Vec::new(),
            reconnect: ReconnectConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Single destination claiming one module.
    pub fn single(destination: DestinationConfig, module: impl Into<String>) -> Self {
        let receiver = ReceiverConfig::new(&destination.name).target(TargetSelector::module(module));
        let mut config = Self::default();
        config.add_destination(destination);
        config.add_receiver(receiver);
        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destinations.is_empty() {
            return Err(ConfigError::Invalid("No destinations configured".into()));
        }

        let mut names = HashSet::new();
        for (i, dest) in self.destinations.iter().enumerate() {
            if dest.name.is_empty() {
                return Err(ConfigError::Invalid(format!("Destination {}: empty name", i)));
            }
            if !names.insert(dest.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Destination '{}' defined more than once",
                    dest.name
                )));
            }
            if dest.host.is_empty() {
                return Err(ConfigError::Invalid(format!("Destination '{}': empty host", dest.name)));
            }
            if dest.port == 0 {
                return Err(ConfigError::Invalid(format!("Destination '{}': port is 0", dest.name)));
            }
            if dest.connect_timeout_ms == 0 || dest.invoke_timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "Destination '{}': timeouts must be non-zero",
                    dest.name
                )));
            }
            if dest.heartbeat_interval_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "Destination '{}': heartbeat interval must be non-zero",
                    dest.name
                )));
            }
        }

        for (i, receiver) in self.receivers.iter().enumerate() {
            if !names.contains(receiver.destination.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Receiver {}: unknown destination '{}'",
                    i, receiver.destination
                )));
            }
            if receiver.targets.is_empty() {
                return Err(ConfigError::Invalid(format!("Receiver {}: no targets", i)));
            }
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "Reconnect initial delay ({} ms) exceeds max delay ({} ms)",
                self.reconnect.initial_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        if self.reconnect.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid("Reconnect scan interval must be non-zero".into()));
        }

        Ok(())
    }

    /// Add a destination.
    pub fn add_destination(&mut self, destination: DestinationConfig) {
        self.destinations.push(destination);
    }

    /// Add a receiver.
    pub fn add_receiver(&mut self, receiver: ReceiverConfig) {
        self.receivers.push(receiver);
    }
}

/// Outbound destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Logical name, unique per client.
    pub name: String,

    pub host: String,

    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,

    /// Heartbeat interval (None = disabled).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,
}

impl DestinationConfig {
    /// Create a destination config with default timeouts.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            invoke_timeout_ms: default_invoke_timeout_ms(),
            heartbeat_interval_ms: None,
        }
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    /// Build the connection descriptor.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        let mut descriptor = ConnectionDescriptor::new(&self.name, &self.host, self.port)
            .with_connect_timeout(self.connect_timeout())
            .with_invoke_timeout(self.invoke_timeout());
        if let Some(username) = &self.username {
            descriptor = descriptor.with_credentials(username, self.password.clone());
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            descriptor = descriptor.with_heartbeat(Duration::from_millis(ms));
        }
        descriptor
    }
}

/// Receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Destination name.
    pub destination: String,

    /// Targets claimed by this receiver.
    #[serde(default)]
    pub targets: Vec<TargetSelector>,
}

impl ReceiverConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            targets: Vec::new(),
        }
    }

    /// Claim a target selector.
    pub fn target(mut self, selector: TargetSelector) -> Self {
        self.targets.push(selector);
        self
    }
}

/// Reconnect policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Run the background supervisor.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            scan_interval_ms: default_scan_interval_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.enabled,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            scan_interval: Duration::from_millis(self.scan_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> ClientConfig {
        ClientConfig::single(DestinationConfig::new("server-two", "127.0.0.1", 8080), "server-two-module")
    }

    #[test]
    fn test_single_destination_config() {
        let config = valid();
        assert_eq!(config.destinations.len(), 1);
        assert_eq!(config.receivers[0].destination, "server-two");
        assert_eq!(config.receivers[0].targets[0].component, "*");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ClientConfig::default();
        assert!(config.validate().is_err()); // No destinations

        let mut config = valid();
        config.add_destination(DestinationConfig::new("server-two", "other", 1));
        assert!(config.validate().is_err()); // Duplicate name

        let mut config = valid();
        config.destinations[0].port = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.destinations[0].invoke_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.add_receiver(ReceiverConfig::new("nowhere").target(TargetSelector::module("m")));
        assert!(config.validate().is_err()); // Unknown destination

        let mut config = valid();
        config.add_receiver(ReceiverConfig::new("server-two"));
        assert!(config.validate().is_err()); // No targets

        let mut config = valid();
        config.reconnect.initial_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_descriptor_from_config() {
        let mut dest = DestinationConfig::new("b", "10.0.0.2", 4447).credentials("quickuser1", Some("quick123+".into()));
        dest.heartbeat_interval_ms = Some(2_000);
        dest.connect_timeout_ms = 1_500;

        let descriptor = dest.descriptor();
        assert_eq!(descriptor.authority(), "10.0.0.2:4447");
        assert_eq!(descriptor.connect_timeout, Duration::from_millis(1_500));
        assert_eq!(descriptor.invoke_timeout, Duration::from_secs(30));
        assert_eq!(descriptor.heartbeat_interval, Some(Duration::from_secs(2)));
        let credentials = descriptor.credentials.expect("credentials");
        assert_eq!(credentials.username, "quickuser1");
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let policy = ReconnectConfig::default().policy();
        assert_eq!(policy, ReconnectPolicy::default());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
name = "server-one"

[[destinations]]
name = "server-two"
host = "127.0.0.1"
port = 8080

[[receivers]]
destination = "server-two"
targets = [{{ module = "server-two-module", component = "EchoOnServerTwo" }}]

[reconnect]
enabled = false
"#
        )
        .expect("write");

        let config = ClientConfig::from_file(file.path()).expect("load");
        assert_eq!(config.name, "server-one");
        assert_eq!(config.destinations[0].invoke_timeout_ms, 30_000);
        assert_eq!(config.receivers[0].targets[0].interface, "*");
        assert!(!config.reconnect.enabled);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("port = 8080"));
        assert!(toml_str.contains("[[receivers]]"));

        let parsed: ClientConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.destinations[0].name, "server-two");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClientConfig::from_file("/nonexistent/hdds-remote.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
