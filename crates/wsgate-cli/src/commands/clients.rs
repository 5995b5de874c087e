//! `wsgate clients`: number of connected WebSocket clients.

use anyhow::Result;
use wsgate_core::ControlMessage;

use crate::config::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    super::require_running(paths)?;
    let reply = super::control(paths, &ControlMessage::Status)?;
    println!("{reply}");
    Ok(())
}
