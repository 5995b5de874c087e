//! Client configuration at `~/.wsgate/config.toml`.
//!
//! Only the `[gateway]` section matters here: it tells the CLI where the
//! gateway's control socket and process record live and which port to use
//! when starting one. CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use wsgate_core::control::DEFAULT_CONTROL_SOCKET;
use wsgate_core::record::{DEFAULT_PORT, DEFAULT_RECORD_PATH};

/// Top-level config file structure.
///
/// Other sections (e.g. `[messages]`) belong to the server and are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Where to find the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Port used by `wsgate start` when `--port` is absent.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_control_socket")]
    pub control_socket: String,

    #[serde(default = "default_record_path")]
    pub record_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            control_socket: default_control_socket(),
            record_path: default_record_path(),
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

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Resolved locations of a gateway's control socket and process record.
#[derive(Debug, Clone)]
pub struct Paths {
    pub control_socket: PathBuf,
    pub record_path: PathBuf,
}

impl Paths {
    /// Config values, with explicit flags taking precedence.
    pub fn resolve(cfg: &Config, control_socket: Option<&str>, record: Option<&str>) -> Self {
        Self {
            control_socket: expand_tilde(control_socket.unwrap_or(&cfg.gateway.control_socket)),
            record_path: expand_tilde(record.unwrap_or(&cfg.gateway.record_path)),
        }
    }
}

/// Default config path: `~/.wsgate/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".wsgate")
        .join("config.toml")
}

fn expand_tilde(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(s).to_path_buf()
}
