use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::domain::{CellularParameters, ErrorCode, LinkStatus, TransportKind};

/// Callback invoked by the driver on link status changes.
///
/// Drivers may call it from their own context (interrupt handler, driver
/// thread), so implementations must only record or forward the event.
pub type StatusCallback = Box<dyn Fn(NetworkEvent) + Send + Sync>;

/// Callback invoked by a socket when it may have become readable or writable.
pub type ReadinessCallback = Box<dyn Fn() + Send + Sync>;

/// Asynchronous notification from the network driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The link status changed.
    StatusChanged(LinkStatus),
    /// The connection went down for the given reason.
    ConnectionDown(ErrorCode),
    /// Driver-specific event with its raw code and payload.
    Other { event: i32, payload: isize },
}

/// Network interface operations consumed from the driver.
///
/// Methods take `&self`: the driver serializes access internally, which
/// lets a progress task poll [`connection_status`](Self::connection_status)
/// while a worker is parked in [`connect`](Self::connect).
pub trait NetworkInterface: Send + Sync {
    /// Name of the backend, for logs.
    fn name(&self) -> &str;

    /// Load SIM PIN, APN and credentials.
    fn set_default_parameters(&self, params: &CellularParameters);

    /// Register the status callback, replacing any previous one.
    fn attach(&self, callback: StatusCallback);

    /// In non-blocking mode `connect` returns `InProgress` and reports the
    /// outcome through the attached callback.
    fn set_blocking(&self, blocking: bool) -> Result<(), ErrorCode>;

    fn connect(&self) -> Result<(), ErrorCode>;

    fn disconnect(&self) -> Result<(), ErrorCode>;

    fn connection_status(&self) -> LinkStatus;

    fn gethostbyname(&self, name: &str) -> Result<IpAddr, ErrorCode>;
}

/// Transport endpoint operations consumed from the driver.
pub trait Socket: Send {
    fn transport(&self) -> TransportKind;

    fn open(&mut self, net: &dyn NetworkInterface) -> Result<(), ErrorCode>;

    /// Connection-oriented transports only.
    fn connect(&mut self, addr: SocketAddr) -> Result<(), ErrorCode>;

    fn send(&mut self, buf: &[u8]) -> Result<usize, ErrorCode>;

    fn send_to(&mut self, addr: SocketAddr, buf: &[u8]) -> Result<usize, ErrorCode>;

    /// `Ok(0)` means the peer sent nothing; `Err(WouldBlock)` means not ready.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ErrorCode>;

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>), ErrorCode>;

    fn set_timeout(&mut self, timeout: Duration);

    fn set_blocking(&mut self, blocking: bool);

    /// Register the readiness callback used in non-blocking mode.
    fn sigio(&mut self, callback: ReadinessCallback);

    fn close(&mut self) -> Result<(), ErrorCode>;
}
