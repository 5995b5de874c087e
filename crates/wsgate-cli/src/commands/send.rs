//! `wsgate send`: send one message as a client and print the reply.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::client::WsClient;
use crate::config::Paths;

/// How long to wait for the gateway's reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run(paths: &Paths, message: &str, port: Option<u16>) -> Result<()> {
    let port = match port {
        Some(port) => port,
        None => super::require_running(paths)?.port,
    };

    let mut client = WsClient::connect("127.0.0.1", port, Some(REPLY_TIMEOUT))?;
    client.send_text(message)?;
    let reply = client.next_frame()?;
    client.close();

    match reply {
        Some(frame) => {
            println!("{}", String::from_utf8_lossy(&frame.payload));
            Ok(())
        }
        None => bail!("gateway closed the connection without replying"),
    }
}
