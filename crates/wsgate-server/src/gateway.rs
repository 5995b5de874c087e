//! The gateway event loop.
//!
//! Single-threaded and tick-based. Every tick, in order:
//!
//! 1. accept new WebSocket clients (registered as pending)
//! 2. service the control connection, answering its command once the line
//!    is complete
//! 3. read from every pending client and advance its handshake
//! 4. flush and read every established client and reply to its messages
//!
//! then sleep for the tick interval. All sockets are non-blocking, so a
//! resource with nothing to do costs one failed syscall per tick.

use crate::config::GatewayConfig;
use crate::lifecycle::{self, Lifecycle};
use crate::policy::{Echo, MessageHandler};
use crate::registry::{ConnId, Connection, Registry};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use wsgate_core::codec::{self, close_frame, is_close_frame, OPCODE_CLOSE};
use wsgate_core::control::{self, ControlMessage};
use wsgate_core::handshake::{has_complete_headers, negotiate};
use wsgate_core::GatewayResult;

/// How long a control client gets to deliver its request line.
const CONTROL_IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest accepted control request line (bytes).
const MAX_CONTROL_LINE: usize = 1024 * 1024;

/// Whether the loop keeps running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Shutdown,
}

/// What to do with a client after servicing its socket.
enum Action {
    Keep,
    Handshake(Vec<u8>),
    Close(&'static str),
}

/// A control connection still sending its request line.
struct ControlClient {
    stream: UnixStream,
    buf: Vec<u8>,
    deadline: Instant,
}

enum ControlRead {
    Waiting,
    Line(String),
    Drop(&'static str),
}

impl ControlClient {
    /// Read whatever is available without blocking.
    fn poll(&mut self, now: Instant, scratch: &mut [u8]) -> ControlRead {
        loop {
            match self.stream.read(scratch) {
                // End of stream completes a line without a newline.
                Ok(0) => return ControlRead::Line(self.take_line()),
                Ok(n) => {
                    self.buf.extend_from_slice(&scratch[..n]);
                    if self.buf.contains(&b'\n') {
                        return ControlRead::Line(self.take_line());
                    }
                    if self.buf.len() > MAX_CONTROL_LINE {
                        return ControlRead::Drop("control line too long");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return if now >= self.deadline {
                        ControlRead::Drop("control client timed out")
                    } else {
                        ControlRead::Waiting
                    };
                }
                Err(e) => {
                    debug!(error = %e, "control read failed");
                    return ControlRead::Drop("control read error");
                }
            }
        }
    }

    fn take_line(&mut self) -> String {
        let end = self
            .buf
            .iter()
            .position(|&b| b == b'\n')
            .unwrap_or(self.buf.len());
        String::from_utf8_lossy(&self.buf[..end]).into_owned()
    }
}

/// Limits applied to every established client.
#[derive(Clone, Copy)]
struct Limits {
    max_message: usize,
    max_outbound: usize,
}

/// The WebSocket gateway: listeners, client registry and message policy.
pub struct Gateway {
    config: GatewayConfig,
    listener: TcpListener,
    control: UnixListener,
    control_client: Option<ControlClient>,
    port: u16,
    registry: Registry,
    handler: Box<dyn MessageHandler>,
    shutdown: Arc<AtomicBool>,
    lifecycle: Lifecycle,
    read_buf: Vec<u8>,
}

impl Gateway {
    /// Bind the listeners and write the process record, echoing client
    /// messages with the configured prefix.
    ///
    /// Fails if a live gateway is already recorded or the port is taken.
    pub fn bind(config: GatewayConfig) -> GatewayResult<Self> {
        let echo = Echo::new(config.echo_prefix.clone());
        Self::bind_with(config, echo)
    }

    /// Like [`Gateway::bind`], with `handler` deciding every reply.
    pub fn bind_with(
        config: GatewayConfig,
        handler: impl MessageHandler + 'static,
    ) -> GatewayResult<Self> {
        let bound = lifecycle::startup(&config)?;
        let read_buf = vec![0u8; config.read_buffer_size];

        Ok(Self {
            config,
            listener: bound.listener,
            control: bound.control,
            control_client: None,
            port: bound.port,
            registry: Registry::new(),
            handler: Box::new(handler),
            shutdown: Arc::new(AtomicBool::new(false)),
            lifecycle: bound.lifecycle,
            read_buf,
        })
    }

    /// The port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Setting this flag stops the loop at the start of the next tick.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until a `shutdown` command or the shutdown flag, then close every
    /// client and remove the gateway's files.
    pub fn run(mut self) -> GatewayResult<()> {
        info!(port = self.port, "gateway event loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("termination signal received");
                break;
            }
            if self.tick(Instant::now()) == Tick::Shutdown {
                break;
            }
            std::thread::sleep(self.config.tick_interval);
        }

        self.close_all();
        self.lifecycle.teardown();
        info!("gateway stopped");
        Ok(())
    }

    /// One pass over every socket.
    pub fn tick(&mut self, now: Instant) -> Tick {
        self.accept_clients(now);
        let outcome = self.poll_control(now);
        self.poll_pending(now);
        self.poll_established();
        outcome
    }

    fn accept_clients(&mut self, now: Instant) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(peer = %peer, error = %e, "cannot make client socket non-blocking");
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    let id = self.registry.insert_pending(stream, now);
                    info!(conn_id = id, fd, peer = %peer, "new connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Serve one control connection at a time. A new one is accepted only
    /// once the previous one has been answered or dropped.
    fn poll_control(&mut self, now: Instant) -> Tick {
        if self.control_client.is_none() {
            match self.control.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(error = %e, "cannot make control socket non-blocking");
                        return Tick::Continue;
                    }
                    self.control_client = Some(ControlClient {
                        stream,
                        buf: Vec::new(),
                        deadline: now + CONTROL_IO_TIMEOUT,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Tick::Continue,
                Err(e) => {
                    warn!(error = %e, "control accept failed");
                    return Tick::Continue;
                }
            }
        }

        let Some(client) = self.control_client.as_mut() else {
            return Tick::Continue;
        };
        match client.poll(now, &mut self.read_buf) {
            ControlRead::Waiting => Tick::Continue,
            ControlRead::Drop(reason) => {
                debug!(reason, "dropping control connection");
                self.control_client = None;
                Tick::Continue
            }
            ControlRead::Line(line) => {
                let Some(mut client) = self.control_client.take() else {
                    return Tick::Continue;
                };
                let (reply, outcome) = self.handle_control(&line);
                if let Err(e) = writeln!(client.stream, "{reply}") {
                    debug!(error = %e, "control reply not delivered");
                }
                outcome
            }
        }
    }

    fn handle_control(&mut self, line: &str) -> (String, Tick) {
        match ControlMessage::parse(line) {
            ControlMessage::Broadcast(payload) => {
                let sent = self.broadcast(payload.as_bytes());
                (control::broadcast_reply(sent), Tick::Continue)
            }
            ControlMessage::Status => {
                debug!(pending = self.registry.pending_count(), "status requested");
                (
                    control::status_reply(self.registry.established_count()),
                    Tick::Continue,
                )
            }
            ControlMessage::Shutdown => {
                info!("shutdown requested over control socket");
                (control::SHUTDOWN_REPLY.to_string(), Tick::Shutdown)
            }
            ControlMessage::Unknown(raw) => {
                debug!(command = %raw, "unknown control command");
                (control::UNKNOWN_REPLY.to_string(), Tick::Continue)
            }
        }
    }

    /// Queue one frame for every established client. Clients whose socket
    /// failed or whose queue overflowed are closed. Returns the number of
    /// clients attempted.
    fn broadcast(&mut self, payload: &[u8]) -> usize {
        let frame = codec::encode(payload);
        let max_outbound = self.config.max_outbound_bytes;
        let mut attempted = 0;
        let mut failed = Vec::new();

        for conn in self.registry.established_mut() {
            attempted += 1;
            if let Err(e) = conn.send(&frame) {
                debug!(conn_id = conn.id, error = %e, "broadcast write failed");
                failed.push((conn.id, "client write error"));
            } else if conn.outbound_len() > max_outbound {
                failed.push((conn.id, "client too slow"));
            }
        }
        for (id, reason) in failed {
            self.close(id, reason);
        }

        info!(recipients = attempted, bytes = payload.len(), "broadcast sent");
        attempted
    }

    fn poll_pending(&mut self, now: Instant) {
        let timeout = self.config.handshake_timeout;
        let max_bytes = self.config.max_handshake_bytes;

        for id in self.registry.pending_ids() {
            let Some(conn) = self.registry.get_mut(id) else {
                continue;
            };

            let action = match conn.stream.read(&mut self.read_buf) {
                Ok(0) => Action::Close("pending client disconnected"),
                Ok(n) => match conn.handshake_buffer_mut() {
                    Some(buffer) => {
                        buffer.extend_from_slice(&self.read_buf[..n]);
                        if buffer.len() > max_bytes {
                            Action::Close("handshake request too large")
                        } else if !has_complete_headers(buffer) {
                            Action::Keep
                        } else {
                            match negotiate(buffer) {
                                Some(response) => Action::Handshake(response),
                                None => Action::Close("handshake failed"),
                            }
                        }
                    }
                    None => Action::Keep,
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if conn.handshake_expired(now, timeout) {
                        Action::Close("handshake timed out")
                    } else {
                        Action::Keep
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => Action::Keep,
                Err(e) => {
                    debug!(conn_id = id, error = %e, "pending read failed");
                    Action::Close("pending client read error")
                }
            };

            self.apply(id, action);
        }
    }

    fn poll_established(&mut self) {
        let limits = Limits {
            max_message: self.config.max_message_bytes,
            max_outbound: self.config.max_outbound_bytes,
        };

        for id in self.registry.established_ids() {
            let Some(conn) = self.registry.get_mut(id) else {
                continue;
            };

            if let Err(e) = conn.flush_outbound() {
                debug!(conn_id = id, error = %e, "client write failed");
                self.close(id, "client write error");
                continue;
            }

            let read = match conn.stream.read(&mut self.read_buf) {
                Ok(0) => Action::Close("client disconnected"),
                Ok(n) => {
                    if let Some(inbound) = conn.inbound_mut() {
                        inbound.extend_from_slice(&self.read_buf[..n]);
                    }
                    Action::Keep
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    Action::Keep
                }
                Err(e) => {
                    debug!(conn_id = id, error = %e, "client read failed");
                    Action::Close("client read error")
                }
            };

            let action = match read {
                Action::Keep => service_frames(conn, self.handler.as_mut(), limits),
                other => other,
            };
            self.apply(id, action);
        }
    }

    fn apply(&mut self, id: ConnId, action: Action) {
        match action {
            Action::Keep => {}
            Action::Handshake(response) => self.complete_handshake(id, &response),
            Action::Close(reason) => self.close(id, reason),
        }
    }

    fn complete_handshake(&mut self, id: ConnId, response: &[u8]) {
        let Some(conn) = self.registry.get_mut(id) else {
            return;
        };
        if let Err(e) = conn.send(response) {
            debug!(conn_id = id, error = %e, "handshake response write failed");
            self.close(id, "handshake write failed");
            return;
        }
        conn.promote();
        info!(conn_id = id, "client handshake complete");
    }

    fn close(&mut self, id: ConnId, reason: &'static str) {
        if let Some(conn) = self.registry.remove(id) {
            let _ = conn.stream.shutdown(Shutdown::Both);
            info!(conn_id = id, reason, "connection closed");
        }
    }

    /// Orderly close of every connection: established clients get whatever
    /// is still queued for them, then a close frame.
    fn close_all(&mut self) {
        self.control_client = None;
        if self.registry.is_empty() {
            return;
        }
        let count = self.registry.len();
        for mut conn in self.registry.drain() {
            if conn.is_established() {
                let _ = conn.send(&close_frame());
            }
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        info!(count, "closed all connections");
    }
}

/// Handle every complete frame buffered for `conn`, leaving any partial
/// frame in place for the next read.
fn service_frames(
    conn: &mut Connection,
    handler: &mut dyn MessageHandler,
    limits: Limits,
) -> Action {
    let id = conn.id;
    loop {
        let Some(inbound) = conn.inbound_mut() else {
            return Action::Keep;
        };
        if is_close_frame(inbound) {
            return Action::Close("client closed connection");
        }
        let Some(frame) = codec::decode_masked(inbound) else {
            if inbound.len() > limits.max_message {
                return Action::Close("client message too large");
            }
            return Action::Keep;
        };
        inbound.drain(..frame.consumed);

        if frame.opcode == OPCODE_CLOSE {
            return Action::Close("client closed connection");
        }
        debug!(conn_id = id, bytes = frame.payload.len(), "message received");
        let reply = handler.reply(id, &frame.payload);
        if let Err(e) = conn.send(&codec::encode(&reply)) {
            debug!(conn_id = id, error = %e, "reply write failed");
            return Action::Close("client write error");
        }
        if conn.outbound_len() > limits.max_outbound {
            return Action::Close("client too slow");
        }
    }
}
