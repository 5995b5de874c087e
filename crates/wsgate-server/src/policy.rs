//! Per-message reply policy.
//!
//! Every decoded text frame from an established client gets exactly one
//! reply frame back on the same socket; a [`MessageHandler`] decides its
//! payload.

use crate::registry::ConnId;

/// Produces the reply payload for one client message.
pub trait MessageHandler: Send {
    fn reply(&mut self, conn_id: ConnId, payload: &[u8]) -> Vec<u8>;
}

/// Echoes the message back behind a fixed prefix.
#[derive(Debug, Clone)]
pub struct Echo {
    prefix: String,
}

impl Echo {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new("Echo: ")
    }
}

impl MessageHandler for Echo {
    fn reply(&mut self, _conn_id: ConnId, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + payload.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_prefixes_payload() {
        let mut echo = Echo::default();
        assert_eq!(echo.reply(1, b"hello"), b"Echo: hello");
        assert_eq!(echo.reply(2, b""), b"Echo: ");
    }

    #[test]
    fn echo_custom_prefix() {
        let mut echo = Echo::new("> ");
        assert_eq!(echo.reply(7, b"hi"), b"> hi");
    }

    #[test]
    fn echo_passes_bytes_through() {
        let mut echo = Echo::new("");
        assert_eq!(echo.reply(1, &[0xff, 0x00]), vec![0xff, 0x00]);
    }
}
