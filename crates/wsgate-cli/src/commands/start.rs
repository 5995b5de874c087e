//! `wsgate start`: launch `wsgate-server` in the background.
//!
//! The server is spawned detached (own process group, stdin closed, output
//! to `/tmp/wsgate-<port>.log`). After a short grace period the process
//! record tells us whether it came up.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs::File;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};
use wsgate_core::record;

use super::status;
use crate::config::Paths;

/// How long the server gets to write its process record.
const STARTUP_GRACE: Duration = Duration::from_millis(500);

const SERVER_BIN: &str = "wsgate-server";

pub struct StartOptions<'a> {
    pub port: u16,
    pub config_path: &'a Path,
    /// Explicit server binary; otherwise next to `wsgate`, then `$PATH`.
    pub server_bin: Option<PathBuf>,
}

pub fn run(paths: &Paths, opts: StartOptions<'_>) -> Result<()> {
    if let Some(rec) = record::probe(&paths.record_path) {
        println!("Already running\n{}", status::describe(&rec));
        return Ok(());
    }

    let log = log_path(opts.port);
    let log_file = File::create(&log)
        .with_context(|| format!("cannot create log file {}", log.display()))?;
    let log_err = log_file.try_clone().context("cannot duplicate log handle")?;

    let bin = opts.server_bin.clone().unwrap_or_else(locate_server);
    let args = server_args(paths, opts.port, opts.config_path);
    debug!(bin = %bin.display(), ?args, "spawning gateway");

    let child = Command::new(&bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(log_file)
        .stderr(log_err)
        .process_group(0)
        .spawn()
        .with_context(|| format!("failed to launch {}", bin.display()))?;
    info!(pid = child.id(), port = opts.port, "gateway launched");

    std::thread::sleep(STARTUP_GRACE);

    match record::probe(&paths.record_path) {
        Some(rec) => {
            println!("WebSocket gateway started!\n{}", status::describe(&rec));
            println!("  Log: {}", log.display());
            println!();
            println!("Connect from a browser:");
            println!("  const ws = new WebSocket('ws://localhost:{}');", rec.port);
            println!("  ws.onmessage = (e) => console.log(e.data);");
            Ok(())
        }
        None => bail!("failed to start the gateway; check {}", log.display()),
    }
}

/// Where a gateway started on `port` writes its output.
pub fn log_path(port: u16) -> PathBuf {
    PathBuf::from(format!("/tmp/wsgate-{port}.log"))
}

/// Arguments that make the server use the same files as this CLI.
fn server_args(paths: &Paths, port: u16, config_path: &Path) -> Vec<OsString> {
    vec![
        "--port".into(),
        port.to_string().into(),
        "--config".into(),
        config_path.into(),
        "--control-socket".into(),
        paths.control_socket.clone().into(),
        "--record".into(),
        paths.record_path.clone().into(),
    ]
}

/// `wsgate-server` installed next to the running `wsgate`, else rely on `$PATH`.
fn locate_server() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(SERVER_BIN)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(SERVER_BIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Paths {
        Paths {
            control_socket: PathBuf::from("/tmp/a.sock"),
            record_path: PathBuf::from("/tmp/a.pid"),
        }
    }

    #[test]
    fn log_path_includes_port() {
        assert_eq!(log_path(8765), PathBuf::from("/tmp/wsgate-8765.log"));
    }

    #[test]
    fn server_args_forward_paths() {
        let args = server_args(&paths(), 9000, Path::new("/etc/wsgate.toml"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--port",
                "9000",
                "--config",
                "/etc/wsgate.toml",
                "--control-socket",
                "/tmp/a.sock",
                "--record",
                "/tmp/a.pid",
            ]
        );
    }

    #[test]
    fn already_running_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            control_socket: dir.path().join("c.sock"),
            record_path: dir.path().join("g.pid"),
        };
        // This test process stands in for a live gateway.
        wsgate_core::ProcessRecord::current(1234)
            .write(&paths.record_path)
            .unwrap();

        let opts = StartOptions {
            port: 1234,
            config_path: Path::new("/nonexistent.toml"),
            server_bin: Some(PathBuf::from("/nonexistent/wsgate-server")),
        };
        run(&paths, opts).unwrap();
    }

    #[test]
    fn missing_server_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths {
            control_socket: dir.path().join("c.sock"),
            record_path: dir.path().join("g.pid"),
        };
        let opts = StartOptions {
            port: 0,
            config_path: Path::new("/nonexistent.toml"),
            server_bin: Some(dir.path().join("no-such-binary")),
        };
        let err = run(&paths, opts).unwrap_err();
        assert!(format!("{err:#}").contains("failed to launch"));
    }
}
