//! CLI argument definitions for wasmward-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Wasmward threat-detection daemon.
///
/// Executes sandboxed WebAssembly detection rules against a live stream
/// of host telemetry events (process creations, suspicious command
/// patterns, outbound network connections).
#[derive(Parser, Debug)]
#[command(name = "wasmward-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to wasmward.toml configuration file.
    #[arg(short, long, default_value = "/etc/wasmward/wasmward.toml")]
    pub config: PathBuf,

    /// Override the rules path (a .wasm file or a rules directory).
    ///
    /// Takes precedence over the config file.
    #[arg(long)]
    pub rules: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the webhook URL for alert delivery.
    #[arg(long)]
    pub webhook: Option<String>,

    /// Override the Prometheus metrics port.
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Validate configuration and rules path, then exit without starting.
    #[arg(long)]
    pub validate: bool,
}
