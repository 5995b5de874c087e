//! wsgate-server: single-threaded WebSocket gateway.
//!
//! Accepts WebSocket clients on a loopback port, echoes their text messages,
//! and takes `broadcast`, `status` and `shutdown` commands over a local Unix
//! control socket.

mod config;
mod gateway;
mod lifecycle;
mod policy;
mod registry;

use clap::Parser;
use config::{ConfigOverrides, GatewayConfig};
use gateway::Gateway;
use std::path::PathBuf;
use tracing::{error, info};
use wsgate_core::GatewayResult;

/// wsgate-server: WebSocket gateway
#[derive(Parser, Debug)]
#[command(name = "wsgate-server", version, about = "WebSocket gateway")]
struct Cli {
    /// Listen port on 127.0.0.1 (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.wsgate/config.toml")]
    config: String,

    /// Control socket path
    #[arg(long)]
    control_socket: Option<String>,

    /// Process record path
    #[arg(long)]
    record: Option<String>,

    /// Seconds a client may take to complete its handshake
    #[arg(long)]
    handshake_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wsgate-server");

    // Errors are reported after `run` returns so the gateway's files are
    // already cleaned up before the process exits.
    if let Err(e) = run(cli) {
        error!(error = %e, "wsgate-server failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> GatewayResult<()> {
    let overrides = ConfigOverrides {
        port: cli.port,
        control_socket: cli.control_socket,
        record_path: cli.record,
        handshake_timeout: cli.handshake_timeout,
    };
    let config = GatewayConfig::load(Some(&PathBuf::from(&cli.config)), &overrides)?;

    let gateway = Gateway::bind(config)?;
    lifecycle::install_signal_handlers(&gateway.shutdown_flag())?;
    gateway.run()
}
