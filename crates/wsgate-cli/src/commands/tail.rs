//! `wsgate tail`: follow everything the gateway broadcasts.

use anyhow::Result;
use std::io::Write;
use tracing::info;

use crate::client::WsClient;
use crate::config::Paths;

/// Connect as an ordinary client and print each text frame on its own line
/// until the gateway closes the connection.
pub fn run(paths: &Paths, port: Option<u16>) -> Result<()> {
    let port = match port {
        Some(port) => port,
        None => super::require_running(paths)?.port,
    };

    let mut client = WsClient::connect("127.0.0.1", port, None)?;
    eprintln!("Connected to ws://localhost:{port} (Ctrl-C to stop)");

    let stdout = std::io::stdout();
    while let Some(frame) = client.next_frame()? {
        let mut out = stdout.lock();
        writeln!(out, "{}", String::from_utf8_lossy(&frame.payload))?;
        out.flush()?;
    }

    info!(port, "gateway closed the connection");
    eprintln!("Connection closed");
    Ok(())
}
