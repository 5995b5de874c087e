//! wsgate: manage and talk to the WebSocket gateway.
//!
//! Starts and stops `wsgate-server`, reports its status, broadcasts through
//! its control socket, and can act as a WebSocket client for quick checks.

mod client;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use config::Paths;

/// wsgate: WebSocket gateway manager
#[derive(Parser)]
#[command(name = "wsgate", version, about = "Manage the local WebSocket gateway")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Control socket path (overrides config)
    #[arg(long, global = true)]
    control_socket: Option<String>,

    /// Process record path (overrides config)
    #[arg(long, global = true)]
    record: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show whether the gateway is running
    Status,

    /// Start the gateway in the background
    Start {
        /// Listen port (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the wsgate-server binary
        #[arg(long)]
        server_bin: Option<PathBuf>,
    },

    /// Stop the running gateway
    Stop,

    /// Send a message to every connected client
    Broadcast {
        /// Message text
        message: String,

        /// Wrap the message as JSON with this type
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },

    /// Count connected clients
    Clients,

    /// Print broadcast messages as they arrive
    Tail {
        /// Gateway port (defaults to the running gateway's)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message as a client and print the reply
    Send {
        /// Message text
        message: String,

        /// Gateway port (defaults to the running gateway's)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show status and browser integration notes
    Info,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wsgate=debug,wsgate_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("wsgate=warn,wsgate_core=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load config file.
    let config_path = cli
        .config
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let cfg = match config::Config::load(&config_path.to_string_lossy()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("wsgate: {e:#}");
            std::process::exit(1);
        }
    };
    let paths = Paths::resolve(&cfg, cli.control_socket.as_deref(), cli.record.as_deref());

    let result = match cli.command {
        Command::Status => commands::status::run(&paths),
        Command::Start { port, server_bin } => commands::start::run(
            &paths,
            commands::start::StartOptions {
                port: port.unwrap_or(cfg.gateway.port),
                config_path: &config_path,
                server_bin,
            },
        ),
        Command::Stop => commands::stop::run(&paths),
        Command::Broadcast { message, kind } => {
            commands::broadcast::run(&paths, &message, kind.as_deref())
        }
        Command::Clients => commands::clients::run(&paths),
        Command::Tail { port } => commands::tail::run(&paths, port),
        Command::Send { message, port } => commands::send::run(&paths, &message, port),
        Command::Info => commands::info::run(&paths, cfg.gateway.port),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("wsgate: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn broadcast_type_flag() {
        let cli = Cli::try_parse_from(["wsgate", "broadcast", "hi", "--type", "notify"]).unwrap();
        match cli.command {
            Command::Broadcast { message, kind } => {
                assert_eq!(message, "hi");
                assert_eq!(kind.as_deref(), Some("notify"));
            }
            _ => panic!("expected broadcast"),
        }
    }

    #[test]
    fn global_paths_after_subcommand() {
        let cli =
            Cli::try_parse_from(["wsgate", "clients", "--control-socket", "/tmp/x.sock"]).unwrap();
        assert_eq!(cli.control_socket.as_deref(), Some("/tmp/x.sock"));
        assert!(matches!(cli.command, Command::Clients));
    }

    #[test]
    fn start_port_is_optional() {
        let cli = Cli::try_parse_from(["wsgate", "start"]).unwrap();
        assert!(matches!(cli.command, Command::Start { port: None, .. }));
    }
}
