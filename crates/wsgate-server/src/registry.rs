//! Client registry.
//!
//! One owned table of connections keyed by connection id. Each entry is
//! either mid-handshake (`Pending`, with its request buffer) or
//! `Established`; removal from the table is the `Closed` state.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tracing::debug;
use wsgate_core::handshake::HEADER_TERMINATOR;

/// Connection identifier, unique for the lifetime of the process.
pub type ConnId = u64;

/// Per-connection protocol state.
#[derive(Debug)]
pub enum ConnState {
    /// Waiting for a complete HTTP upgrade request.
    Pending {
        /// Request bytes received so far.
        buffer: Vec<u8>,
        /// When the socket was accepted (handshake timeout origin).
        accepted_at: Instant,
    },
    /// Handshake done; only WebSocket frames from here on.
    Established {
        /// Received bytes not yet consumed as complete frames.
        inbound: Vec<u8>,
    },
}

/// A registered client connection.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    pub id: ConnId,
    pub stream: S,
    pub state: ConnState,
    /// Encoded bytes accepted for this client but not yet written.
    outbound: Vec<u8>,
}

impl<S> Connection<S> {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ConnState::Pending { .. })
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, ConnState::Established { .. })
    }

    /// The handshake buffer, while pending.
    pub fn handshake_buffer_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.state {
            ConnState::Pending { buffer, .. } => Some(buffer),
            ConnState::Established { .. } => None,
        }
    }

    /// Unconsumed frame bytes, once established.
    pub fn inbound_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.state {
            ConnState::Established { inbound } => Some(inbound),
            ConnState::Pending { .. } => None,
        }
    }

    /// Bytes queued but not yet written to the socket.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Whether a pending connection has outlived `timeout` at `now`.
    pub fn handshake_expired(&self, now: Instant, timeout: Duration) -> bool {
        match self.state {
            ConnState::Pending { accepted_at, .. } => now.duration_since(accepted_at) > timeout,
            ConnState::Established { .. } => false,
        }
    }

    /// Move `Pending` → `Established`.
    ///
    /// Bytes that arrived after the request's blank line are the start of
    /// the first frame and become the inbound buffer. Returns `false` if the
    /// connection was already established.
    pub fn promote(&mut self) -> bool {
        let inbound = match &mut self.state {
            ConnState::Pending { buffer, .. } => {
                match buffer
                    .windows(HEADER_TERMINATOR.len())
                    .position(|w| w == HEADER_TERMINATOR)
                {
                    Some(pos) => buffer.split_off(pos + HEADER_TERMINATOR.len()),
                    None => Vec::new(),
                }
            }
            ConnState::Established { .. } => return false,
        };
        self.state = ConnState::Established { inbound };
        true
    }
}

impl<S: Write> Connection<S> {
    /// Queue `bytes` and write as much of the queue as the socket takes.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outbound.extend_from_slice(bytes);
        self.flush_outbound()
    }

    /// Write queued bytes until the queue is empty or the socket would
    /// block. Whatever was not written stays queued, so frames are never
    /// cut short on the wire.
    pub fn flush_outbound(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.outbound.len() {
                break Ok(());
            }
            match self.stream.write(&self.outbound[written..]) {
                Ok(0) => break Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.outbound.drain(..written);
        result
    }
}

/// All live connections.
#[derive(Debug)]
pub struct Registry<S = TcpStream> {
    conns: BTreeMap<ConnId, Connection<S>>,
    next_id: ConnId,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            conns: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a freshly accepted socket as pending.
    pub fn insert_pending(&mut self, stream: S, now: Instant) -> ConnId {
        let id = self.next_id;
        self.next_id += 1;
        self.conns.insert(
            id,
            Connection {
                id,
                stream,
                state: ConnState::Pending {
                    buffer: Vec::new(),
                    accepted_at: now,
                },
                outbound: Vec::new(),
            },
        );
        debug!(conn_id = id, "connection registered as pending");
        id
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<S>> {
        self.conns.get_mut(&id)
    }

    pub fn remove(&mut self, id: ConnId) -> Option<Connection<S>> {
        self.conns.remove(&id)
    }

    /// Ids of pending connections, in accept order.
    pub fn pending_ids(&self) -> Vec<ConnId> {
        self.conns
            .values()
            .filter(|c| c.is_pending())
            .map(|c| c.id)
            .collect()
    }

    /// Ids of established connections, in accept order.
    pub fn established_ids(&self) -> Vec<ConnId> {
        self.conns
            .values()
            .filter(|c| c.is_established())
            .map(|c| c.id)
            .collect()
    }

    pub fn established_mut(&mut self) -> impl Iterator<Item = &mut Connection<S>> {
        self.conns.values_mut().filter(|c| c.is_established())
    }

    pub fn established_count(&self) -> usize {
        self.conns.values().filter(|c| c.is_established()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.conns.values().filter(|c| c.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Remove every connection, in accept order.
    pub fn drain(&mut self) -> impl Iterator<Item = Connection<S>> {
        std::mem::take(&mut self.conns).into_values()
    }
}
