//! Echo transaction shared by every runner.
//!
//! Open a socket, resolve the echo server (IP transports only), connect
//! (TCP only), send the configured payload, receive once, close. Each step
//! short-circuits to a tagged failure; nothing is retried inside one
//! transaction.

use cellular_core::{
    ErrorCode, NetworkInterface, Socket, TransactionOutcome, TransactionResult, TransportKind,
};
use events::{Event, EventBus};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::EchoConfig;
use crate::resources::SocketGuard;

/// Synchronous echo transaction against one socket.
pub struct EchoTransaction<'a> {
    net: &'a dyn NetworkInterface,
    hostname: &'a str,
    port: u16,
    payload: &'a [u8],
    timeout: Duration,
    event_bus: Option<EventBus>,
}

impl<'a> EchoTransaction<'a> {
    pub fn new(net: &'a dyn NetworkInterface, config: &'a EchoConfig) -> Self {
        Self {
            net,
            hostname: &config.hostname,
            port: config.port,
            payload: config.payload(),
            timeout: config.timeout(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run the transaction. The socket is closed exactly once on every path.
    pub fn run<S: Socket + ?Sized>(&self, socket: &mut S) -> TransactionResult {
        let transport = socket.transport();
        let mut guard = SocketGuard::new(socket);

        let mut result = self.exchange(&mut *guard, transport);

        if let Err(code) = guard.close() {
            warn!(
                transport = %transport,
                code = code.code(),
                "{}Socket.close() fails",
                transport.label()
            );
            if result.is_ok() {
                result.fail(TransactionOutcome::CloseFailed, Some(code));
            }
        }

        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::TransactionFinished { transport, result });
        }

        result
    }

    fn exchange<S: Socket + ?Sized>(
        &self,
        socket: &mut S,
        transport: TransportKind,
    ) -> TransactionResult {
        let mut result = TransactionResult::new();

        if let Err(code) = socket.open(self.net) {
            log_failure(transport, "open", code);
            result.fail(TransactionOutcome::OpenFailed, Some(code));
            return result;
        }

        socket.set_timeout(self.timeout);

        let peer = match resolve_peer(self.net, transport, self.hostname, self.port) {
            Ok(peer) => peer,
            Err(code) => {
                error!(
                    host = %self.hostname,
                    code = code.code(),
                    "Couldn't resolve remote host"
                );
                result.fail(TransactionOutcome::ResolveFailed, Some(code));
                return result;
            }
        };

        if let Err(code) = connect_peer(socket, transport, peer) {
            log_failure(transport, "connect", code);
            result.fail(TransactionOutcome::ConnectFailed, Some(code));
            return result;
        }

        match send_payload(socket, transport, peer, self.payload) {
            Ok(sent) => {
                info!(
                    transport = %transport,
                    bytes = sent,
                    host = %self.hostname,
                    "Sent echo payload"
                );
                result.bytes_sent = sent;
            }
            Err(code) => {
                log_failure(transport, "send", code);
                result.fail(TransactionOutcome::SendFailed, Some(code));
                return result;
            }
        }

        let mut buf = vec![0u8; self.payload.len()];
        match receive_echo(socket, transport, &mut buf) {
            Ok(received) if received > 0 => {
                info!(transport = %transport, bytes = received, "Received from echo server");
                result.bytes_received = received;
            }
            Ok(_) => {
                error!(transport = %transport, "Echo server returned no data");
                result.fail(TransactionOutcome::RecvFailed, None);
            }
            Err(code) => {
                log_failure(transport, "recv", code);
                result.fail(TransactionOutcome::RecvFailed, Some(code));
            }
        }

        result
    }
}

fn log_failure(transport: TransportKind, operation: &str, code: ErrorCode) {
    error!(
        transport = %transport,
        operation,
        code = code.code(),
        "{}Socket.{}() fails, code: {}",
        transport.label(),
        operation,
        code.code()
    );
}

/// Resolve the echo server; `None` for transports routed without an address.
pub(crate) fn resolve_peer(
    net: &dyn NetworkInterface,
    transport: TransportKind,
    hostname: &str,
    port: u16,
) -> Result<Option<SocketAddr>, ErrorCode> {
    if !transport.needs_peer_address() {
        return Ok(None);
    }
    let ip = net.gethostbyname(hostname)?;
    Ok(Some(SocketAddr::new(ip, port)))
}

pub(crate) fn connect_peer<S: Socket + ?Sized>(
    socket: &mut S,
    transport: TransportKind,
    peer: Option<SocketAddr>,
) -> Result<(), ErrorCode> {
    match (transport.is_connection_oriented(), peer) {
        (true, Some(addr)) => {
            socket.connect(addr)?;
            info!(transport = %transport, peer = %addr, "Connected with echo server");
            Ok(())
        }
        (true, None) => Err(ErrorCode::NoAddress),
        (false, _) => Ok(()),
    }
}

pub(crate) fn send_payload<S: Socket + ?Sized>(
    socket: &mut S,
    transport: TransportKind,
    peer: Option<SocketAddr>,
    payload: &[u8],
) -> Result<usize, ErrorCode> {
    match (transport, peer) {
        (TransportKind::Udp, Some(addr)) => socket.send_to(addr, payload),
        _ => socket.send(payload),
    }
}

pub(crate) fn receive_echo<S: Socket + ?Sized>(
    socket: &mut S,
    transport: TransportKind,
    buf: &mut [u8],
) -> Result<usize, ErrorCode> {
    match transport {
        TransportKind::Udp => socket.recv_from(buf).map(|(n, _)| n),
        _ => socket.recv(buf),
    }
}
