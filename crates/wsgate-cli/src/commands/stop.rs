//! `wsgate stop`: ask the gateway to shut down, escalating to signals.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};
use wsgate_core::record::{self, pid_alive, signal_process};
use wsgate_core::ControlMessage;

use crate::config::Paths;

/// Grace period after the `shutdown` command.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// Grace period after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(200);

pub fn run(paths: &Paths) -> Result<()> {
    let Some(rec) = record::probe(&paths.record_path) else {
        println!("WebSocket gateway is not running");
        return Ok(());
    };

    if paths.control_socket.exists() {
        match super::control(paths, &ControlMessage::Shutdown) {
            Ok(reply) => debug!(reply = %reply, "shutdown acknowledged"),
            Err(e) => debug!(error = %e, "shutdown command failed"),
        }
        std::thread::sleep(SHUTDOWN_GRACE);
    }

    if pid_alive(rec.pid) {
        info!(pid = rec.pid, "gateway still running, sending SIGTERM");
        if let Err(e) = signal_process(rec.pid, libc::SIGTERM) {
            warn!(pid = rec.pid, error = %e, "SIGTERM failed");
        }
        std::thread::sleep(TERM_GRACE);

        if pid_alive(rec.pid) {
            info!(pid = rec.pid, "sending SIGKILL");
            if let Err(e) = signal_process(rec.pid, libc::SIGKILL) {
                warn!(pid = rec.pid, error = %e, "SIGKILL failed");
            }
        }
    }

    record::remove(&paths.record_path);
    println!("WebSocket gateway stopped (was PID: {})", rec.pid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;
    use wsgate_core::ProcessRecord;

    fn temp_paths(dir: &std::path::Path) -> Paths {
        Paths {
            control_socket: dir.join("control.sock"),
            record_path: dir.join("gateway.pid"),
        }
    }

    #[test]
    fn not_running_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        run(&temp_paths(dir.path())).unwrap();
    }

    #[test]
    fn unresponsive_process_is_signalled() {
        let dir = tempfile::tempdir().unwrap();
        let paths = temp_paths(dir.path());
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        ProcessRecord {
            pid: child.id(),
            port: 8765,
        }
        .write(&paths.record_path)
        .unwrap();

        run(&paths).unwrap();

        let status = child.wait().unwrap();
        assert!(status.signal().is_some());
        assert!(!paths.record_path.exists());
    }
}
