//! HTTP/1.1 Upgrade handshake.
//!
//! Server side: [`negotiate`] turns a buffered upgrade request into a
//! `101 Switching Protocols` response. Client side: [`client_request`] and
//! [`verify_response`] for the management tool's WebSocket mode.

use crate::error::{GatewayError, GatewayResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Blank line ending the HTTP header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Whether `buf` contains a complete HTTP header block.
pub fn has_complete_headers(buf: &[u8]) -> bool {
    buf.windows(HEADER_TERMINATOR.len())
        .any(|w| w == HEADER_TERMINATOR)
}

/// `base64(sha1(key + GUID))`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Find a header value by case-insensitive name, skipping the start line.
fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n")
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (field, value) = line.split_once(':')?;
            field
                .trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
}

/// Build the `101 Switching Protocols` response for an upgrade request.
///
/// Returns `None` when the request carries no usable `Sec-WebSocket-Key`;
/// the caller must then close the connection.
pub fn negotiate(request: &[u8]) -> Option<Vec<u8>> {
    let head = String::from_utf8_lossy(request);
    let key = header_value(&head, "Sec-WebSocket-Key").filter(|k| !k.is_empty())?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(key)
    );
    Some(response.into_bytes())
}

/// Random 16-byte nonce, base64 encoded, for a client upgrade request.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    STANDARD.encode(nonce)
}

/// Build a client upgrade request for `ws://host:port/`.
pub fn client_request(host: &str, port: u16, key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// Check a server's upgrade response against the key we sent.
pub fn verify_response(response: &[u8], key: &str) -> GatewayResult<()> {
    let head = String::from_utf8_lossy(response);
    let status = head.lines().next().unwrap_or_default();
    if !status.starts_with("HTTP/1.1 101") {
        return Err(GatewayError::Handshake(format!(
            "unexpected status line: {status}"
        )));
    }

    let accept = header_value(&head, "Sec-WebSocket-Accept")
        .ok_or_else(|| GatewayError::Handshake("missing Sec-WebSocket-Accept".into()))?;
    if accept != accept_key(key) {
        return Err(GatewayError::Handshake("Sec-WebSocket-Accept mismatch".into()));
    }
    Ok(())
}
