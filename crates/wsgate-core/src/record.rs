//! Gateway process record: the on-disk fact "a gateway with this pid is
//! listening on this port".
//!
//! File contents are `"<pid>\n<port>"`. The record doubles as a
//! single-instance lock; a record naming a dead process is stale and is
//! removed by whoever finds it.

use crate::error::{GatewayError, GatewayResult};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Port assumed when a record has no port line.
pub const DEFAULT_PORT: u16 = 8765;

pub const DEFAULT_RECORD_PATH: &str = "/tmp/wsgate.pid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub port: u16,
}

impl ProcessRecord {
    /// Record for the calling process.
    pub fn current(port: u16) -> Self {
        Self {
            pid: std::process::id(),
            port,
        }
    }

    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let pid: u32 = lines.next()?.trim().parse().ok()?;
        if pid == 0 {
            return None;
        }
        let port = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Some(Self { pid, port })
    }

    pub fn to_contents(&self) -> String {
        format!("{}\n{}", self.pid, self.port)
    }

    /// Read a record. Missing or unparseable files yield `None`.
    pub fn read(path: &Path) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        Self::parse(&contents)
    }

    pub fn write(&self, path: &Path) -> GatewayResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_contents()).map_err(|e| {
            GatewayError::Record(format!("cannot write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), pid = self.pid, port = self.port, "wrote process record");
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }
}

/// Whether a process with this pid exists (`kill(pid, 0)`).
///
/// `EPERM` means the process exists but belongs to someone else.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs existence and permission checks.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send `signal` to `pid`.
pub fn signal_process(pid: u32, signal: libc::c_int) -> GatewayResult<()> {
    let target = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| GatewayError::Record(format!("invalid pid {pid}")))?;
    // SAFETY: plain kill(2) on a validated positive pid.
    if unsafe { libc::kill(target, signal) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Look up the live gateway recorded at `path`.
///
/// A record that cannot be parsed or whose process is gone is deleted and
/// reported as absent.
pub fn probe(path: &Path) -> Option<ProcessRecord> {
    if !path.exists() {
        return None;
    }
    match ProcessRecord::read(path) {
        Some(record) if record.is_alive() => Some(record),
        stale => {
            debug!(path = %path.display(), record = ?stale, "removing stale process record");
            let _ = fs::remove_file(path);
            None
        }
    }
}

/// Delete the record file, ignoring a missing file.
pub fn remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed process record"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "could not remove process record"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Above any real pid_max, so kill() reports ESRCH.
    const DEAD_PID: u32 = i32::MAX as u32;

    #[test]
    fn parse_record_contents() {
        assert_eq!(
            ProcessRecord::parse("1234\n9000"),
            Some(ProcessRecord { pid: 1234, port: 9000 })
        );
        assert_eq!(
            ProcessRecord::parse("1234\n"),
            Some(ProcessRecord { pid: 1234, port: DEFAULT_PORT })
        );
        assert_eq!(ProcessRecord::parse(""), None);
        assert_eq!(ProcessRecord::parse("abc\n8765"), None);
        assert_eq!(ProcessRecord::parse("0\n8765"), None);
    }

    #[test]
    fn contents_format() {
        let record = ProcessRecord { pid: 42, port: 8765 };
        assert_eq!(record.to_contents(), "42\n8765");
    }

    #[test]
    fn write_read_remove_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.pid");

        let record = ProcessRecord::current(9100);
        record.write(&path).unwrap();
        assert_eq!(ProcessRecord::read(&path), Some(record));
        assert_eq!(probe(&path), Some(record));

        remove(&path);
        assert!(!path.exists());
        assert_eq!(probe(&path), None);
        // Removing twice is harmless.
        remove(&path);
    }

    #[test]
    fn stale_record_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.pid");
        ProcessRecord { pid: DEAD_PID, port: 8765 }.write(&path).unwrap();

        assert_eq!(probe(&path), None);
        assert!(!path.exists());
    }

    #[test]
    fn garbage_record_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.pid");
        fs::write(&path, "not a pid").unwrap();

        assert_eq!(probe(&path), None);
        assert!(!path.exists());
    }

    #[test]
    fn liveness_checks() {
        assert!(pid_alive(std::process::id()));
        assert!(!pid_alive(0));
        assert!(!pid_alive(DEAD_PID));
        assert!(!pid_alive(u32::MAX));
    }

    #[test]
    fn signal_rejects_invalid_pid() {
        assert!(signal_process(0, 0).is_err());
        assert!(signal_process(DEAD_PID, 0).is_err());
        signal_process(std::process::id(), 0).unwrap();
    }
}
