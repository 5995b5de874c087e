//! `wsgate status`: is a gateway running, and where.

use anyhow::Result;
use wsgate_core::record::{self, ProcessRecord};

use crate::config::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    match record::probe(&paths.record_path) {
        Some(rec) => println!("{}", describe(&rec)),
        None => println!("Not running"),
    }
    Ok(())
}

/// Multi-line summary of a running gateway.
pub fn describe(rec: &ProcessRecord) -> String {
    format!(
        "WebSocket gateway running\n  PID: {}\n  Port: {}\n  URL: ws://localhost:{}",
        rec.pid, rec.port, rec.port
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_lists_pid_port_and_url() {
        let text = describe(&ProcessRecord { pid: 42, port: 9001 });
        assert!(text.contains("PID: 42"));
        assert!(text.contains("Port: 9001"));
        assert!(text.ends_with("URL: ws://localhost:9001"));
    }
}
