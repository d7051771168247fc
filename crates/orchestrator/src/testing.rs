//! Scripted network and socket doubles for unit tests.

use cellular_core::{
    CellularParameters, ErrorCode, LinkStatus, NetworkEvent, NetworkInterface, ReadinessCallback,
    Socket, StatusCallback, TransportKind,
};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type SharedStatusCallback = Arc<dyn Fn(NetworkEvent) + Send + Sync>;
type SharedReadinessCallback = Arc<dyn Fn() + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct NetState {
    connect_results: VecDeque<Result<(), ErrorCode>>,
    event_on_connect: Option<NetworkEvent>,
    status: LinkStatus,
    resolve: Result<IpAddr, ErrorCode>,
    disconnect_result: Result<(), ErrorCode>,
    callback: Option<SharedStatusCallback>,
    connect_calls: u32,
    disconnect_calls: u32,
    resolve_calls: u32,
    blocking: Option<bool>,
    params: Option<CellularParameters>,
}

/// Network interface whose connect results are scripted in advance.
///
/// Once the script is exhausted `connect` succeeds.
pub struct MockNetwork {
    state: Mutex<NetState>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetState {
                connect_results: VecDeque::new(),
                event_on_connect: None,
                status: LinkStatus::Disconnected,
                resolve: Ok(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                disconnect_result: Ok(()),
                callback: None,
                connect_calls: 0,
                disconnect_calls: 0,
                resolve_calls: 0,
                blocking: None,
                params: None,
            }),
        }
    }

    pub fn with_connect_results(self, results: Vec<Result<(), ErrorCode>>) -> Self {
        lock(&self.state).connect_results = results.into();
        self
    }

    pub fn with_status(self, status: LinkStatus) -> Self {
        lock(&self.state).status = status;
        self
    }

    pub fn with_resolve(self, resolve: Result<IpAddr, ErrorCode>) -> Self {
        lock(&self.state).resolve = resolve;
        self
    }

    pub fn with_disconnect_result(self, result: Result<(), ErrorCode>) -> Self {
        lock(&self.state).disconnect_result = result;
        self
    }

    /// Deliver `event` through the attached callback from inside `connect`.
    pub fn with_event_on_connect(self, event: NetworkEvent) -> Self {
        lock(&self.state).event_on_connect = Some(event);
        self
    }

    /// Deliver an event the way a driver context would.
    pub fn fire(&self, event: NetworkEvent) {
        let callback = lock(&self.state).callback.clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    pub fn connect_calls(&self) -> u32 {
        lock(&self.state).connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    pub fn resolve_calls(&self) -> u32 {
        lock(&self.state).resolve_calls
    }

    pub fn blocking(&self) -> Option<bool> {
        lock(&self.state).blocking
    }

    pub fn has_callback(&self) -> bool {
        lock(&self.state).callback.is_some()
    }

    pub fn params(&self) -> Option<CellularParameters> {
        lock(&self.state).params.clone()
    }
}

impl NetworkInterface for MockNetwork {
    fn name(&self) -> &str {
        "mock"
    }

    fn set_default_parameters(&self, params: &CellularParameters) {
        lock(&self.state).params = Some(params.clone());
    }

    fn attach(&self, callback: StatusCallback) {
        lock(&self.state).callback = Some(Arc::from(callback));
    }

    fn set_blocking(&self, blocking: bool) -> Result<(), ErrorCode> {
        lock(&self.state).blocking = Some(blocking);
        Ok(())
    }

    fn connect(&self) -> Result<(), ErrorCode> {
        let (result, event) = {
            let mut state = lock(&self.state);
            state.connect_calls += 1;
            let result = state.connect_results.pop_front().unwrap_or(Ok(()));
            state.status = match result {
                Ok(()) => LinkStatus::GlobalUp,
                Err(code) if code.is_pending() => LinkStatus::Connecting,
                Err(_) => LinkStatus::Disconnected,
            };
            (result, state.event_on_connect)
        };
        if let Some(event) = event {
            self.fire(event);
        }
        result
    }

    fn disconnect(&self) -> Result<(), ErrorCode> {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.status = LinkStatus::Disconnected;
        state.disconnect_result
    }

    fn connection_status(&self) -> LinkStatus {
        lock(&self.state).status
    }

    fn gethostbyname(&self, _name: &str) -> Result<IpAddr, ErrorCode> {
        let mut state = lock(&self.state);
        state.resolve_calls += 1;
        state.resolve
    }
}

struct SocketState {
    transport: TransportKind,
    open_result: Result<(), ErrorCode>,
    connect_result: Result<(), ErrorCode>,
    close_result: Result<(), ErrorCode>,
    send_results: VecDeque<Result<usize, ErrorCode>>,
    recv_results: VecDeque<Result<usize, ErrorCode>>,
    readiness: Option<SharedReadinessCallback>,
    opens: u32,
    closes: u32,
    recv_calls: u32,
    connects: Vec<SocketAddr>,
    sent_to: Vec<SocketAddr>,
    sent: Vec<u8>,
    timeout: Option<Duration>,
    blocking: Option<bool>,
}

/// Socket that echoes whatever was sent unless receive results are scripted.
///
/// A scripted `Ok(n)` returns the first `n` sent bytes.
pub struct MockSocket {
    state: Arc<Mutex<SocketState>>,
}

/// Inspection side of a [`MockSocket`] that stays with the test.
#[derive(Clone)]
pub struct MockSocketHandle {
    state: Arc<Mutex<SocketState>>,
}

impl MockSocket {
    pub fn echo(transport: TransportKind) -> (Self, MockSocketHandle) {
        let state = Arc::new(Mutex::new(SocketState {
            transport,
            open_result: Ok(()),
            connect_result: Ok(()),
            close_result: Ok(()),
            send_results: VecDeque::new(),
            recv_results: VecDeque::new(),
            readiness: None,
            opens: 0,
            closes: 0,
            recv_calls: 0,
            connects: Vec::new(),
            sent_to: Vec::new(),
            sent: Vec::new(),
            timeout: None,
            blocking: None,
        }));
        (
            Self {
                state: state.clone(),
            },
            MockSocketHandle { state },
        )
    }

    pub fn with_open_result(self, result: Result<(), ErrorCode>) -> Self {
        lock(&self.state).open_result = result;
        self
    }

    pub fn with_connect_result(self, result: Result<(), ErrorCode>) -> Self {
        lock(&self.state).connect_result = result;
        self
    }

    pub fn with_close_result(self, result: Result<(), ErrorCode>) -> Self {
        lock(&self.state).close_result = result;
        self
    }

    pub fn with_send_results(self, results: Vec<Result<usize, ErrorCode>>) -> Self {
        lock(&self.state).send_results = results.into();
        self
    }

    pub fn with_recv_results(self, results: Vec<Result<usize, ErrorCode>>) -> Self {
        lock(&self.state).recv_results = results.into();
        self
    }

    fn record_send(&mut self, buf: &[u8]) -> Result<usize, ErrorCode> {
        let mut state = lock(&self.state);
        let result = state.send_results.pop_front().unwrap_or(Ok(buf.len()));
        if let Ok(n) = result {
            let n = n.min(buf.len());
            state.sent.extend_from_slice(&buf[..n]);
        }
        result
    }
}

impl Socket for MockSocket {
    fn transport(&self) -> TransportKind {
        lock(&self.state).transport
    }

    fn open(&mut self, _net: &dyn NetworkInterface) -> Result<(), ErrorCode> {
        let mut state = lock(&self.state);
        state.opens += 1;
        state.open_result
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<(), ErrorCode> {
        let mut state = lock(&self.state);
        state.connects.push(addr);
        state.connect_result
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, ErrorCode> {
        self.record_send(buf)
    }

    fn send_to(&mut self, addr: SocketAddr, buf: &[u8]) -> Result<usize, ErrorCode> {
        lock(&self.state).sent_to.push(addr);
        self.record_send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ErrorCode> {
        let mut state = lock(&self.state);
        state.recv_calls += 1;
        let available = state.sent.len().min(buf.len());
        let result = state
            .recv_results
            .pop_front()
            .unwrap_or(Ok(available))
            .map(|n| n.min(buf.len()));
        if let Ok(n) = result {
            let copied = n.min(available);
            buf[..copied].copy_from_slice(&state.sent[..copied]);
        }
        result
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>), ErrorCode> {
        let peer = lock(&self.state).sent_to.last().copied();
        self.recv(buf).map(|n| (n, peer))
    }

    fn set_timeout(&mut self, timeout: Duration) {
        lock(&self.state).timeout = Some(timeout);
    }

    fn set_blocking(&mut self, blocking: bool) {
        lock(&self.state).blocking = Some(blocking);
    }

    fn sigio(&mut self, callback: ReadinessCallback) {
        lock(&self.state).readiness = Some(Arc::from(callback));
    }

    fn close(&mut self) -> Result<(), ErrorCode> {
        let mut state = lock(&self.state);
        state.closes += 1;
        state.close_result
    }
}

impl MockSocketHandle {
    pub fn opens(&self) -> u32 {
        lock(&self.state).opens
    }

    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    pub fn recv_calls(&self) -> u32 {
        lock(&self.state).recv_calls
    }

    pub fn sent(&self) -> Vec<u8> {
        lock(&self.state).sent.clone()
    }

    pub fn connects(&self) -> Vec<SocketAddr> {
        lock(&self.state).connects.clone()
    }

    pub fn sent_to(&self) -> Vec<SocketAddr> {
        lock(&self.state).sent_to.clone()
    }

    pub fn timeout(&self) -> Option<Duration> {
        lock(&self.state).timeout
    }

    pub fn blocking(&self) -> Option<bool> {
        lock(&self.state).blocking
    }

    pub fn has_readiness_callback(&self) -> bool {
        lock(&self.state).readiness.is_some()
    }

    /// Signal readiness the way the socket driver would.
    pub fn fire_readable(&self) {
        let callback = lock(&self.state).readiness.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}
