//! `wsgate info`: gateway status plus a browser integration snippet.

use anyhow::Result;
use wsgate_core::control::parse_status_reply;
use wsgate_core::{record, ControlMessage};

use crate::config::Paths;

pub fn run(paths: &Paths, default_port: u16) -> Result<()> {
    let (state, port) = match record::probe(&paths.record_path) {
        Some(rec) => {
            let clients = super::control(paths, &ControlMessage::Status)
                .ok()
                .and_then(|reply| parse_status_reply(&reply));
            let state = match clients {
                Some(n) => format!("Running on port {} ({n} clients)", rec.port),
                None => format!("Running on port {}", rec.port),
            };
            (state, rec.port)
        }
        None => ("Not running".to_string(), default_port),
    };
    println!("{}", render(&state, port));
    Ok(())
}

fn render(state: &str, port: u16) -> String {
    format!(
        "\
WebSocket gateway
  Status: {state}

Browser client:
  const ws = new WebSocket('ws://localhost:{port}');
  ws.onopen = () => ws.send('hello');
  ws.onmessage = (event) => {{
      // Typed broadcasts arrive as {{\"type\", \"data\", \"timestamp\"}}
      console.log(event.data);
  }};

Commands:
  wsgate start       start the gateway
  wsgate stop        stop the gateway
  wsgate broadcast   send to all clients
  wsgate clients     count connected clients
  wsgate tail        print broadcasts as they arrive"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_uses_port_and_state() {
        let text = render("Running on port 9001", 9001);
        assert!(text.contains("Status: Running on port 9001"));
        assert!(text.contains("ws://localhost:9001"));
        assert!(text.contains("{\"type\", \"data\", \"timestamp\"}"));
    }
}
