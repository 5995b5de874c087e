//! Line-oriented control protocol spoken over the gateway's Unix socket.
//!
//! One request line per connection, one response line back, then the
//! connection is closed:
//!
//! ```text
//! broadcast:<text>  ->  Sent to <n> clients
//! status            ->  Clients: <n>
//! shutdown          ->  Shutting down
//! <anything else>   ->  Unknown command
//! ```

use crate::error::{GatewayError, GatewayResult};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const BROADCAST_PREFIX: &str = "broadcast:";

pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/wsgate-control.sock";

pub const SHUTDOWN_REPLY: &str = "Shutting down";
pub const UNKNOWN_REPLY: &str = "Unknown command";

/// A parsed control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Broadcast(String),
    Status,
    Shutdown,
    Unknown(String),
}

impl ControlMessage {
    /// Parse one request line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Some(payload) = line.strip_prefix(BROADCAST_PREFIX) {
            return ControlMessage::Broadcast(payload.to_string());
        }
        match line {
            "status" => ControlMessage::Status,
            "shutdown" => ControlMessage::Shutdown,
            other => ControlMessage::Unknown(other.to_string()),
        }
    }

    /// Wire form of the request, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            ControlMessage::Broadcast(payload) => format!("{BROADCAST_PREFIX}{payload}"),
            ControlMessage::Status => "status".to_string(),
            ControlMessage::Shutdown => "shutdown".to_string(),
            ControlMessage::Unknown(raw) => raw.clone(),
        }
    }
}

pub fn broadcast_reply(recipients: usize) -> String {
    format!("Sent to {recipients} clients")
}

pub fn status_reply(clients: usize) -> String {
    format!("Clients: {clients}")
}

/// Parse the client count out of a `status` reply.
pub fn parse_status_reply(reply: &str) -> Option<usize> {
    reply.trim().strip_prefix("Clients: ")?.parse().ok()
}

/// Send one request to the control socket at `socket_path` and return the
/// trimmed response line.
pub fn send_command(
    socket_path: &Path,
    message: &ControlMessage,
    timeout: Duration,
) -> GatewayResult<String> {
    if !socket_path.exists() {
        return Err(GatewayError::Control(format!(
            "control socket not found at {}; is the gateway running?",
            socket_path.display()
        )));
    }

    let mut stream = UnixStream::connect(socket_path).map_err(|e| {
        GatewayError::Control(format!(
            "cannot connect to control socket {}: {e}",
            socket_path.display()
        ))
    })?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let line = message.to_line();
    debug!(command = %line, "sending control command");
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut response = String::new();
    BufReader::new(stream).read_line(&mut response)?;
    let response = response.trim();
    if response.is_empty() {
        return Ok("No response".to_string());
    }
    Ok(response.to_string())
}
