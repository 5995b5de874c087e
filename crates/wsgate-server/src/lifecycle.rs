//! Startup and teardown of the gateway's on-disk presence.
//!
//! Startup order: probe the process record, bind the TCP listener, bind the
//! control socket (0600), write the process record. Teardown removes the
//! control socket and the record; it runs once, either explicitly or when
//! the [`Lifecycle`] guard is dropped.

use crate::config::GatewayConfig;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wsgate_core::record::{self, ProcessRecord};
use wsgate_core::{GatewayError, GatewayResult};

/// Sockets and on-disk state of a started gateway.
pub struct Bound {
    pub listener: TcpListener,
    pub control: UnixListener,
    pub port: u16,
    pub lifecycle: Lifecycle,
}

/// Owns the control socket file and the process record.
#[derive(Debug)]
pub struct Lifecycle {
    control_socket: PathBuf,
    record_path: PathBuf,
    torn_down: bool,
}

impl Lifecycle {
    /// Remove the control socket and process record. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = std::fs::remove_file(&self.control_socket) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.control_socket.display(), error = %e, "could not remove control socket");
            }
        }

        // Leave a record that names some other process alone.
        match ProcessRecord::read(&self.record_path) {
            Some(rec) if rec.pid != std::process::id() => {
                debug!(pid = rec.pid, "process record belongs to another process, keeping it");
            }
            _ => record::remove(&self.record_path),
        }

        info!("gateway files cleaned up");
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Bring up the gateway's sockets and write its process record.
pub fn startup(config: &GatewayConfig) -> GatewayResult<Bound> {
    if let Some(existing) = record::probe(&config.record_path) {
        return Err(GatewayError::AlreadyRunning {
            pid: existing.pid,
            port: existing.port,
        });
    }

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let listener = TcpListener::bind(addr).map_err(|source| GatewayError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let port = listener.local_addr()?.port();

    let control = bind_control_socket(&config.control_socket)?;

    let mut lifecycle = Lifecycle {
        control_socket: config.control_socket.clone(),
        record_path: config.record_path.clone(),
        torn_down: false,
    };

    if let Err(e) = ProcessRecord::current(port).write(&config.record_path) {
        lifecycle.teardown();
        return Err(e);
    }

    info!(
        port,
        control_socket = %config.control_socket.display(),
        "gateway listening on 127.0.0.1"
    );

    Ok(Bound {
        listener,
        control,
        port,
        lifecycle,
    })
}

/// Bind the control socket with owner-only permissions.
///
/// A leftover socket file is removed first; callers only get here after
/// the process record showed no live gateway.
fn bind_control_socket(path: &Path) -> GatewayResult<UnixListener> {
    if path.exists() {
        debug!(path = %path.display(), "removing leftover control socket");
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path).map_err(|source| GatewayError::Bind {
        addr: path.display().to_string(),
        source,
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Route SIGTERM and SIGINT into `flag`; the event loop polls it every tick.
pub fn install_signal_handlers(flag: &Arc<AtomicBool>) -> GatewayResult<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(flag))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &Path) -> GatewayConfig {
        GatewayConfig {
            port: 0,
            control_socket: dir.join("control.sock"),
            record_path: dir.join("gateway.pid"),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn startup_writes_record_and_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let bound = startup(&config).unwrap();
        assert_ne!(bound.port, 0);
        assert_eq!(
            ProcessRecord::read(&config.record_path),
            Some(ProcessRecord::current(bound.port))
        );

        let mode = std::fs::metadata(&config.control_socket)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        drop(bound);
        assert!(!config.control_socket.exists());
        assert!(!config.record_path.exists());
    }

    #[test]
    fn live_record_blocks_second_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let _first = startup(&config).unwrap();

        let mut second = temp_config(dir.path());
        second.control_socket = dir.path().join("other.sock");
        match startup(&second) {
            Err(GatewayError::AlreadyRunning { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|b| b.port)),
        }
        assert!(!second.control_socket.exists());
    }

    #[test]
    fn stale_record_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        ProcessRecord {
            pid: i32::MAX as u32,
            port: 1,
        }
        .write(&config.record_path)
        .unwrap();
        std::fs::write(&config.control_socket, b"").unwrap();

        let bound = startup(&config).unwrap();
        assert_eq!(
            ProcessRecord::read(&config.record_path).map(|r| r.pid),
            Some(std::process::id())
        );
        drop(bound);
    }

    #[test]
    fn port_in_use_is_a_bind_error() {
        let dir = tempfile::tempdir().unwrap();
        let holder = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut config = temp_config(dir.path());
        config.port = holder.local_addr().unwrap().port();

        assert!(matches!(startup(&config), Err(GatewayError::Bind { .. })));
        assert!(!config.record_path.exists());
        assert!(!config.control_socket.exists());
    }

    #[test]
    fn teardown_is_idempotent_and_spares_foreign_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());
        let mut bound = startup(&config).unwrap();

        ProcessRecord { pid: 1, port: 80 }
            .write(&config.record_path)
            .unwrap();
        bound.lifecycle.teardown();
        bound.lifecycle.teardown();
        assert!(config.record_path.exists());
        assert!(!config.control_socket.exists());
    }
}
