//! Minimal blocking WebSocket client used by `wsgate tail` and `wsgate send`.
//!
//! Speaks exactly what the gateway speaks: one upgrade request, masked text
//! frames out, unmasked frames in.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;
use wsgate_core::codec::{self, Frame, OPCODE_CLOSE};
use wsgate_core::handshake::{client_request, generate_key, verify_response, HEADER_TERMINATOR};

/// Longest upgrade response we are willing to buffer.
const MAX_RESPONSE_BYTES: usize = 16 * 1024;

/// An established WebSocket connection to the gateway.
pub struct WsClient {
    stream: TcpStream,
    /// Received bytes not yet consumed as frames.
    buf: Vec<u8>,
}

impl WsClient {
    /// Connect to `ws://host:port/` and complete the opening handshake.
    ///
    /// `read_timeout` bounds every subsequent read; `None` blocks forever.
    pub fn connect(host: &str, port: u16, read_timeout: Option<Duration>) -> Result<Self> {
        let mut stream = TcpStream::connect((host, port))
            .with_context(|| format!("cannot connect to ws://{host}:{port}"))?;
        stream.set_read_timeout(read_timeout)?;

        let key = generate_key();
        stream
            .write_all(client_request(host, port, &key).as_bytes())
            .context("failed to send upgrade request")?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = find(&buf, HEADER_TERMINATOR) {
                break pos + HEADER_TERMINATOR.len();
            }
            if buf.len() > MAX_RESPONSE_BYTES {
                bail!("upgrade response too large");
            }
            let n = stream.read(&mut chunk).context("failed to read upgrade response")?;
            if n == 0 {
                bail!("gateway closed the connection during the handshake");
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        verify_response(&buf[..header_end], &key).context("handshake rejected")?;
        buf.drain(..header_end);
        debug!(host, port, "websocket connected");

        Ok(Self { stream, buf })
    }

    /// Send one masked text frame.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        let frame = codec::encode_masked(text.as_bytes(), rand::random());
        self.stream
            .write_all(&frame)
            .context("failed to send message")?;
        Ok(())
    }

    /// Block for the next frame. `None` once the gateway closes, either with
    /// a close frame or by dropping the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = codec::decode_unmasked(&self.buf) {
                self.buf.drain(..frame.consumed);
                if frame.opcode == OPCODE_CLOSE {
                    debug!("gateway sent close frame");
                    return Ok(None);
                }
                return Ok(Some(frame));
            }

            let n = self
                .stream
                .read(&mut chunk)
                .context("failed to read from gateway")?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send a masked close frame and drop the connection.
    pub fn close(mut self) {
        let mask: [u8; 4] = rand::random();
        let mut frame = vec![codec::CLOSE_FRAME_HEADER, 0x80];
        frame.extend_from_slice(&mask);
        let _ = self.stream.write_all(&frame);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
