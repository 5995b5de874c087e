//! CLI subcommand implementations.

pub mod broadcast;
pub mod clients;
pub mod info;
pub mod send;
pub mod start;
pub mod status;
pub mod stop;
pub mod tail;

use anyhow::{anyhow, Result};
use std::time::Duration;
use wsgate_core::record::{self, ProcessRecord};
use wsgate_core::ControlMessage;

use crate::config::Paths;

/// Time allowed for one control socket round trip.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

/// The live gateway, or an error telling the user how to start one.
fn require_running(paths: &Paths) -> Result<ProcessRecord> {
    record::probe(&paths.record_path)
        .ok_or_else(|| anyhow!("gateway is not running (start it with `wsgate start`)"))
}

/// Send one control command and return the gateway's reply line.
fn control(paths: &Paths, message: &ControlMessage) -> Result<String> {
    Ok(wsgate_core::send_command(
        &paths.control_socket,
        message,
        CONTROL_TIMEOUT,
    )?)
}
