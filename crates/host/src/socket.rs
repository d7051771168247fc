//! UDP and TCP sockets over `std::net`.
//!
//! Registering a readiness callback starts a watch task on the current
//! tokio runtime. The task waits for the socket to become readable,
//! invokes the callback, and keeps re-checking until the pending data has
//! been consumed by the owner.
//!
//! A TCP connect in non-blocking mode runs as a runtime task and returns
//! `InProgress`; the readiness callback fires once it settles and the next
//! send or receive picks up the stream.

use cellular_core::{ErrorCode, NetworkInterface, ReadinessCallback, Socket, TransportKind};
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::Interest;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{HostError, Result};

type SharedReadiness = Arc<dyn Fn() + Send + Sync>;

/// Pause between notifications while readable data is still unread.
const REARM_INTERVAL: Duration = Duration::from_millis(10);

enum Endpoint {
    Udp(UdpSocket),
    Tcp(TcpState),
}

enum TcpState {
    /// Opened, not yet connected.
    Idle,
    Connecting(oneshot::Receiver<io::Result<TcpStream>>),
    Connected(TcpStream),
}

pub struct HostSocket {
    transport: TransportKind,
    endpoint: Option<Endpoint>,
    timeout: Option<Duration>,
    blocking: bool,
    readiness: Option<SharedReadiness>,
    watcher: Option<JoinHandle<()>>,
}

impl HostSocket {
    pub fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            endpoint: None,
            timeout: None,
            blocking: true,
            readiness: None,
            watcher: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.endpoint.is_some()
    }

    fn open_endpoint(&mut self) -> Result<()> {
        if self.endpoint.is_some() {
            return Err(HostError::AlreadyOpen);
        }
        let endpoint = match self.transport {
            TransportKind::Udp => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
                debug!(local = %socket.local_addr()?, "UDP socket bound");
                Endpoint::Udp(socket)
            }
            TransportKind::Tcp => Endpoint::Tcp(TcpState::Idle),
            TransportKind::NonIp => return Err(HostError::Unsupported(self.transport)),
        };
        self.endpoint = Some(endpoint);
        self.apply_options()?;
        self.start_watch();
        Ok(())
    }

    fn connect_endpoint(&mut self, addr: SocketAddr) -> Result<()> {
        let timeout = self.timeout.filter(|t| !t.is_zero());
        let runtime = if self.blocking {
            None
        } else {
            Handle::try_current().ok()
        };
        let notify = self.readiness.clone();

        match self.endpoint.as_mut().ok_or(HostError::NotOpen)? {
            Endpoint::Udp(socket) => socket.connect(addr)?,
            Endpoint::Tcp(state) => match runtime {
                Some(runtime) => {
                    *state = TcpState::Connecting(spawn_connect(&runtime, addr, timeout, notify));
                    debug!(peer = %addr, "TCP connect in progress");
                    return Err(HostError::InProgress);
                }
                None => {
                    let stream = match timeout {
                        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
                        None => TcpStream::connect(addr)?,
                    };
                    *state = TcpState::Connected(stream);
                }
            },
        }
        self.apply_options()?;
        self.start_watch();
        Ok(())
    }

    /// Install the stream of a background connect once it has settled.
    fn finish_connect(&mut self) -> Result<()> {
        let settled = match self.endpoint.as_mut() {
            Some(Endpoint::Tcp(TcpState::Connecting(rx))) => rx.try_recv(),
            _ => return Ok(()),
        };
        match settled {
            Err(TryRecvError::Empty) => Err(io::Error::from(io::ErrorKind::WouldBlock).into()),
            Err(TryRecvError::Closed) => {
                self.endpoint = Some(Endpoint::Tcp(TcpState::Idle));
                Err(HostError::NoPeer)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "TCP connect failed");
                self.endpoint = Some(Endpoint::Tcp(TcpState::Idle));
                Err(e.into())
            }
            Ok(Ok(stream)) => {
                debug!(peer = ?stream.peer_addr().ok(), "TCP connect completed");
                self.endpoint = Some(Endpoint::Tcp(TcpState::Connected(stream)));
                self.apply_options()?;
                self.start_watch();
                Ok(())
            }
        }
    }

    /// With a timeout set, a blocking call that runs out of time reports
    /// `WouldBlock` on Unix.
    fn times_out(&self) -> bool {
        self.blocking && self.timeout.is_some_and(|t| !t.is_zero())
    }

    fn apply_options(&self) -> Result<()> {
        let timeout = self.timeout.filter(|t| !t.is_zero());
        match &self.endpoint {
            Some(Endpoint::Udp(socket)) => {
                socket.set_read_timeout(timeout)?;
                socket.set_write_timeout(timeout)?;
                socket.set_nonblocking(!self.blocking)?;
            }
            Some(Endpoint::Tcp(TcpState::Connected(stream))) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                stream.set_nonblocking(!self.blocking)?;
            }
            Some(Endpoint::Tcp(_)) | None => {}
        }
        Ok(())
    }

    fn send_bytes(&mut self, addr: Option<SocketAddr>, buf: &[u8]) -> Result<usize> {
        self.finish_connect()?;
        let times_out = self.times_out();
        let sent = match self.endpoint.as_mut().ok_or(HostError::NotOpen)? {
            Endpoint::Udp(socket) => match addr {
                Some(addr) => socket.send_to(buf, addr),
                None => socket.send(buf),
            },
            Endpoint::Tcp(TcpState::Connected(stream)) => stream.write(buf),
            Endpoint::Tcp(_) => return Err(HostError::NoPeer),
        };
        sent.map_err(|e| io_failure(e, times_out))
    }

    fn recv_bytes(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)> {
        self.finish_connect()?;
        let times_out = self.times_out();
        let received = match self.endpoint.as_mut().ok_or(HostError::NotOpen)? {
            Endpoint::Udp(socket) => socket.recv_from(buf).map(|(n, from)| (n, Some(from))),
            Endpoint::Tcp(TcpState::Connected(stream)) => stream.read(buf).map(|n| (n, None)),
            Endpoint::Tcp(_) => return Err(HostError::NoPeer),
        };
        received.map_err(|e| io_failure(e, times_out))
    }

    /// Start the readiness watch once there is a callback, an endpoint
    /// that can receive, and a runtime to run on.
    fn start_watch(&mut self) {
        let Some(notify) = self.readiness.clone() else {
            return;
        };
        if self.watcher.is_some() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime, readiness callbacks disabled");
            return;
        };

        let watched = match &self.endpoint {
            Some(Endpoint::Udp(socket)) => socket.try_clone().map(Watched::Udp),
            Some(Endpoint::Tcp(TcpState::Connected(stream))) => stream.try_clone().map(Watched::Tcp),
            Some(Endpoint::Tcp(_)) | None => return,
        };

        match watched {
            Ok(watched) => {
                self.watcher = Some(runtime.spawn(watched.run(notify)));
                trace!(transport = %self.transport, "Readiness watch started");
            }
            Err(e) => warn!(error = %e, "Couldn't clone socket for readiness watch"),
        }
    }

    fn stop_watch(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

fn spawn_connect(
    runtime: &Handle,
    addr: SocketAddr,
    timeout: Option<Duration>,
    notify: Option<SharedReadiness>,
) -> oneshot::Receiver<io::Result<TcpStream>> {
    let (tx, rx) = oneshot::channel();
    runtime.spawn(async move {
        let connect = tokio::net::TcpStream::connect(addr);
        let result = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
            None => connect.await,
        };
        let result = result.and_then(|stream| stream.into_std());
        // Nobody to tell once the socket has been closed.
        if tx.send(result).is_ok() {
            if let Some(notify) = notify {
                notify();
            }
        }
    });
    rx
}

fn io_failure(error: io::Error, times_out: bool) -> HostError {
    if times_out && error.kind() == io::ErrorKind::WouldBlock {
        return HostError::Io(io::ErrorKind::TimedOut.into());
    }
    error.into()
}

enum Watched {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Watched {
    async fn run(self, notify: SharedReadiness) {
        let result = match self {
            Self::Udp(peek) => watch_udp(peek, notify).await,
            Self::Tcp(peek) => watch_tcp(peek, notify).await,
        };
        if let Err(e) = result {
            debug!(error = %e, "Readiness watch ended");
        }
    }
}

async fn watch_udp(peek: UdpSocket, notify: SharedReadiness) -> io::Result<()> {
    peek.set_nonblocking(true)?;
    let socket = tokio::net::UdpSocket::from_std(peek.try_clone()?)?;
    let mut probe = [0u8; 1];
    loop {
        socket.readable().await?;
        match socket.try_io(Interest::READABLE, || peek.peek_from(&mut probe)) {
            Ok(_) => {
                notify();
                tokio::time::sleep(REARM_INTERVAL).await;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                notify();
                return Err(e);
            }
        }
    }
}

async fn watch_tcp(peek: TcpStream, notify: SharedReadiness) -> io::Result<()> {
    peek.set_nonblocking(true)?;
    let stream = tokio::net::TcpStream::from_std(peek.try_clone()?)?;
    let mut probe = [0u8; 1];
    loop {
        stream.readable().await?;
        match stream.try_io(Interest::READABLE, || peek.peek(&mut probe)) {
            // Peer closed; the owner's read sees the zero.
            Ok(0) => {
                notify();
                return Ok(());
            }
            Ok(_) => {
                notify();
                tokio::time::sleep(REARM_INTERVAL).await;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                notify();
                return Err(e);
            }
        }
    }
}

fn log_error(transport: TransportKind, operation: &str, error: HostError) -> ErrorCode {
    let code = error.code();
    if code.is_pending() {
        trace!(transport = %transport, operation, code = code.code(), "Pending");
    } else {
        debug!(transport = %transport, operation, error = %error, code = code.code(), "Socket operation failed");
    }
    code
}

impl Socket for HostSocket {
    fn transport(&self) -> TransportKind {
        self.transport
    }

    fn open(&mut self, _net: &dyn NetworkInterface) -> std::result::Result<(), ErrorCode> {
        self.open_endpoint()
            .map_err(|e| log_error(self.transport, "open", e))
    }

    fn connect(&mut self, addr: SocketAddr) -> std::result::Result<(), ErrorCode> {
        self.connect_endpoint(addr)
            .map_err(|e| log_error(self.transport, "connect", e))
    }

    fn send(&mut self, buf: &[u8]) -> std::result::Result<usize, ErrorCode> {
        self.send_bytes(None, buf)
            .map_err(|e| log_error(self.transport, "send", e))
    }

    fn send_to(&mut self, addr: SocketAddr, buf: &[u8]) -> std::result::Result<usize, ErrorCode> {
        self.send_bytes(Some(addr), buf)
            .map_err(|e| log_error(self.transport, "sendto", e))
    }

    fn recv(&mut self, buf: &mut [u8]) -> std::result::Result<usize, ErrorCode> {
        self.recv_bytes(buf)
            .map(|(n, _)| n)
            .map_err(|e| log_error(self.transport, "recv", e))
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
    ) -> std::result::Result<(usize, Option<SocketAddr>), ErrorCode> {
        self.recv_bytes(buf)
            .map_err(|e| log_error(self.transport, "recvfrom", e))
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
        if let Err(e) = self.apply_options() {
            warn!(error = %e, "Couldn't apply socket timeout");
        }
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
        if let Err(e) = self.apply_options() {
            warn!(error = %e, "Couldn't apply socket blocking mode");
        }
    }

    fn sigio(&mut self, callback: ReadinessCallback) {
        self.stop_watch();
        self.readiness = Some(Arc::from(callback));
        self.start_watch();
    }

    fn close(&mut self) -> std::result::Result<(), ErrorCode> {
        self.stop_watch();
        self.readiness = None;
        if self.endpoint.take().is_some() {
            debug!(transport = %self.transport, "Socket closed");
        }
        Ok(())
    }
}

impl Drop for HostSocket {
    fn drop(&mut self) {
        self.stop_watch();
    }
}
