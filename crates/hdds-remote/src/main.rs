// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Remote Invocation CLI
//!
//! Command-line client for invoking components on remote servers.
//!
//! # Usage
//!
//! ```bash
//! # Keep connections to every destination alive
//! hdds-remote --config remote.toml
//!
//! # One-shot invocation
//! hdds-remote --config remote.toml invoke server-two-module/EchoOnServerTwo!RemoteEcho "Hellooooo!"
//!
//! # Connect once to every destination and report
//! hdds-remote --config remote.toml status
//! ```

use clap::{Parser, Subcommand};
use hdds_remote::{
    ClientConfig, ClientContext, ConfigError, DestinationConfig, DestinationSnapshot, InvocationTarget,
    ReceiverConfig, TargetSelector, TcpTransport,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// HDDS Remote Invocation Client
#[derive(Parser, Debug)]
#[command(name = "hdds-remote")]
#[command(about = "HDDS Remote Invocation Client - Outbound connections and receiver routing")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "remote.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Connect to every destination once and print its state
    Status,

    /// Invoke a remote component once
    Invoke {
        /// Target as module/component!interface
        target: String,

        /// Payload (UTF-8)
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Handle subcommands
    if let Some(cmd) = &args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Status => cmd_status(load_config(&args)?).await,
            Commands::Invoke { target, payload } => cmd_invoke(load_config(&args)?, target, payload).await,
        };
    }

    let config = load_config(&args)?;
    let context = ClientContext::from_config(&config, TcpTransport::new(&config.name))?;

    println!("HDDS Remote Client v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    for dest in &config.destinations {
        println!("Destination: {} -> {}:{}", dest.name, dest.host, dest.port);
    }
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let connected = context.connect_all().await;
    tracing::info!("{}/{} destinations connected", connected, config.destinations.len());

    let stats_interval = args.stats_interval;
    if stats_interval > 0 {
        let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => print_stats(&context.destinations()),
                result = tokio::signal::ctrl_c() => {
                    result?;
                    break;
                }
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    println!("\nShutting down...");
    context.shutdown();

    println!("\nFinal Statistics:");
    print_stats(&context.destinations());

    Ok(())
}

fn load_config(args: &Args) -> Result<ClientConfig, ConfigError> {
    let path = args
        .config
        .as_ref()
        .ok_or_else(|| ConfigError::Invalid("Missing --config".into()))?;
    let mut config = ClientConfig::from_file(path)?;
    config.log_level = args.log_level.clone();
    Ok(config)
}

fn cmd_gen_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig {
        name: "server-one".into(),
        ..Default::default()
    };

    let mut two = DestinationConfig::new("server-two", "127.0.0.1", 8080)
        .credentials("quickuser1", Some("quick123+".into()));
    two.heartbeat_interval_ms = Some(5_000);
    config.add_destination(two);
    config.add_destination(DestinationConfig::new("server-three", "10.0.0.3", 8080));

    config.add_receiver(
        ReceiverConfig::new("server-two")
            .target(TargetSelector::module("server-two-module").component("EchoOnServerTwo")),
    );
    config.add_receiver(ReceiverConfig::new("server-three").target(TargetSelector::module("shared-*")));

    let toml_str = toml::to_string_pretty(&config)?;

    // Add comments
    let content = format!(
        r#"# HDDS Remote Client Configuration
# Generated by hdds-remote gen-config

{}
"#,
        toml_str
    );

    std::fs::write(output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let result = ClientConfig::from_file(config_path).and_then(|config| {
        config.validate()?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Client: {}", config.name);
            println!("Destinations: {}", config.destinations.len());
            for dest in &config.destinations {
                println!(
                    "  {} -> {}:{} (connect {} ms, invoke {} ms)",
                    dest.name, dest.host, dest.port, dest.connect_timeout_ms, dest.invoke_timeout_ms
                );
            }
            println!("Receivers: {}", config.receivers.len());
            for (i, receiver) in config.receivers.iter().enumerate() {
                let targets: Vec<String> = receiver.targets.iter().map(|t| t.to_string()).collect();
                println!("  [{}] {} <- {}", i, receiver.destination, targets.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_status(mut config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.reconnect.enabled = false;
    let context = ClientContext::from_config(&config, TcpTransport::new(&config.name))?;

    context.connect_all().await;

    println!("hdds-remote status");
    println!("-------------------");
    for snapshot in context.destinations() {
        println!(
            "  {:<20} {:<22} {:<12} failures: {}",
            snapshot.name, snapshot.authority, snapshot.state, snapshot.failures
        );
    }
    Ok(())
}

async fn cmd_invoke(mut config: ClientConfig, target: &str, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    config.reconnect.enabled = false;
    let context = ClientContext::from_config(&config, TcpTransport::new(&config.name))?;

    let target: InvocationTarget = target.parse()?;
    let reply = context.invoke(&target, payload.as_bytes()).await?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

fn print_stats(snapshots: &[DestinationSnapshot]) {
    println!("--- Destination Statistics ---");
    for snapshot in snapshots {
        let stats = &snapshot.stats;
        println!(
            "  {} [{}]: {} calls ({:.1} calls/s), {} sent, {} received, {} remote errors, {} disconnects",
            snapshot.name,
            snapshot.state,
            stats.invocations,
            stats.invocations_per_second(),
            format_bytes(stats.bytes_sent),
            format_bytes(stats.bytes_received),
            stats.remote_errors,
            stats.disconnects
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
