//! Gateway configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wsgate_core::control::DEFAULT_CONTROL_SOCKET;
use wsgate_core::record::{DEFAULT_PORT, DEFAULT_RECORD_PATH};
use wsgate_core::{GatewayError, GatewayResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub messages: MessagesSection,
}

/// `[gateway]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_control_socket")]
    pub control_socket: String,
    #[serde(default = "default_record_path")]
    pub record_path: String,
    /// Seconds a connection may stay mid-handshake.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_handshake_bytes")]
    pub max_handshake_bytes: usize,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Largest frame (header included) a client may send.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Unwritten bytes a client may fall behind before it is dropped.
    #[serde(default = "default_max_outbound_bytes")]
    pub max_outbound_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            port: default_port(),
            control_socket: default_control_socket(),
            record_path: default_record_path(),
            handshake_timeout: default_handshake_timeout(),
            tick_interval_ms: default_tick_interval_ms(),
            max_handshake_bytes: default_max_handshake_bytes(),
            read_buffer_size: default_read_buffer_size(),
            max_message_bytes: default_max_message_bytes(),
            max_outbound_bytes: default_max_outbound_bytes(),
        }
    }
}

/// `[messages]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesSection {
    /// Prepended to every echoed client message.
    #[serde(default = "default_echo_prefix")]
    pub echo_prefix: String,
}

impl Default for MessagesSection {
    fn default() -> Self {
        Self {
            echo_prefix: default_echo_prefix(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_control_socket() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}
fn default_record_path() -> String {
    DEFAULT_RECORD_PATH.to_string()
}
fn default_handshake_timeout() -> u64 {
    30
}
fn default_tick_interval_ms() -> u64 {
    10
}
fn default_max_handshake_bytes() -> usize {
    16 * 1024
}
fn default_read_buffer_size() -> usize {
    64 * 1024
}
fn default_max_message_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_max_outbound_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_echo_prefix() -> String {
    "Echo: ".to_string()
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub control_socket: Option<String>,
    pub record_path: Option<String>,
    pub handshake_timeout: Option<u64>,
}

/// Resolved gateway configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Loopback port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    pub control_socket: PathBuf,
    pub record_path: PathBuf,
    pub handshake_timeout: Duration,
    pub tick_interval: Duration,
    pub max_handshake_bytes: usize,
    pub read_buffer_size: usize,
    pub max_message_bytes: usize,
    pub max_outbound_bytes: usize,
    pub echo_prefix: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::resolve(ConfigFile::default(), &ConfigOverrides::default())
    }
}

impl GatewayConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> GatewayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| GatewayError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let config = Self::resolve(file_config, overrides);
        if config.read_buffer_size == 0 {
            return Err(GatewayError::Config("read_buffer_size must be positive".into()));
        }
        Ok(config)
    }

    fn resolve(file: ConfigFile, overrides: &ConfigOverrides) -> Self {
        let control_socket = overrides
            .control_socket
            .clone()
            .unwrap_or(file.gateway.control_socket);
        let record_path = overrides
            .record_path
            .clone()
            .unwrap_or(file.gateway.record_path);
        let handshake_timeout = overrides
            .handshake_timeout
            .unwrap_or(file.gateway.handshake_timeout);

        Self {
            port: overrides.port.unwrap_or(file.gateway.port),
            control_socket: expand_tilde_str(&control_socket),
            record_path: expand_tilde_str(&record_path),
            handshake_timeout: Duration::from_secs(handshake_timeout),
            tick_interval: Duration::from_millis(file.gateway.tick_interval_ms),
            max_handshake_bytes: file.gateway.max_handshake_bytes,
            read_buffer_size: file.gateway.read_buffer_size,
            max_message_bytes: file.gateway.max_message_bytes,
            max_outbound_bytes: file.gateway.max_outbound_bytes,
            echo_prefix: file.messages.echo_prefix,
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
