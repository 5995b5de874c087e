//! `wsgate broadcast`: push a message to every connected client.
//!
//! With `--type`, the message is wrapped in a JSON envelope
//! `{"type", "data", "timestamp"}` so browser clients can dispatch on it.

use anyhow::{bail, Result};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use wsgate_core::ControlMessage;

use crate::config::Paths;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a str,
    /// Unix seconds.
    timestamp: u64,
}

pub fn run(paths: &Paths, message: &str, kind: Option<&str>) -> Result<()> {
    let payload = build_payload(message, kind, unix_now())?;
    super::require_running(paths)?;
    let reply = super::control(paths, &ControlMessage::Broadcast(payload))?;
    println!("{reply}");
    Ok(())
}

/// The broadcast payload; it must fit on one control line.
fn build_payload(message: &str, kind: Option<&str>, timestamp: u64) -> Result<String> {
    match kind {
        Some(kind) => Ok(serde_json::to_string(&Envelope {
            kind,
            data: message,
            timestamp,
        })?),
        None if message.contains(['\n', '\r']) => {
            bail!("message must be a single line (use --type to send it JSON-encoded)")
        }
        None => Ok(message.to_string()),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
