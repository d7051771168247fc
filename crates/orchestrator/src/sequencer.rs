//! Message-driven connect, echo, disconnect sequencer.
//!
//! Every step is a message on a single [`Dispatcher`]. Handlers issue
//! non-blocking driver calls, enqueue whatever happens next, and return.
//! Driver callbacks (link status, socket readiness) enqueue messages too,
//! so all state lives on the one task that drains the queue.

use cellular_core::{
    ConnectionState, ErrorCode, NetworkInterface, RunMode, SequencerPhase, Socket, StatusClass,
    TransactionOutcome, TransactionResult,
};
use events::{Event, EventBus};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::EchoConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::observer::{StatusObserver, StatusSink};
use crate::runner::{disconnect_network, finish_run, RunReport};
use crate::state_machine::PhaseMachine;
use crate::transaction::{connect_peer, receive_echo, resolve_peer, send_payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerMessage {
    /// Enter the given phase and run its handler.
    Advance(SequencerPhase),
    /// Classified link status from the network observer.
    LinkStatus(StatusClass),
    /// The socket may be readable or writable.
    SocketReadable,
    /// The current wait passed its deadline.
    PendingExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Send,
    Receive,
}

/// Socket operation waiting for a readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSocketOp {
    pub kind: PendingKind,
    pub deadline: Instant,
}

impl PendingSocketOp {
    fn failure(&self) -> TransactionOutcome {
        match self.kind {
            PendingKind::Send => TransactionOutcome::SendFailed,
            PendingKind::Receive => TransactionOutcome::RecvFailed,
        }
    }

    fn operation(&self) -> &'static str {
        match self.kind {
            PendingKind::Send => "send",
            PendingKind::Receive => "recv",
        }
    }
}

pub struct AsyncOrchestrator {
    net: Arc<dyn NetworkInterface>,
    socket: Box<dyn Socket>,
    config: EchoConfig,
    dispatcher: Dispatcher<SequencerMessage>,
    observer: StatusObserver,
    event_bus: Option<EventBus>,
    phase: SequencerPhase,
    trace: Vec<SequencerPhase>,
    connect_result: Option<std::result::Result<(), ErrorCode>>,
    connection: ConnectionState,
    link_deadline: Option<Instant>,
    socket_claimed: bool,
    peer: Option<SocketAddr>,
    pending: Option<PendingSocketOp>,
    transaction: Option<TransactionResult>,
    disconnect: Option<std::result::Result<(), ErrorCode>>,
    report: Option<RunReport>,
}

impl AsyncOrchestrator {
    pub fn new(net: Arc<dyn NetworkInterface>, socket: Box<dyn Socket>, config: EchoConfig) -> Self {
        let dispatcher = Dispatcher::new();
        let observer = StatusObserver::new(StatusSink::Queue(dispatcher.handle()));
        dispatcher.enqueue(SequencerMessage::Advance(SequencerPhase::Init));

        Self {
            net,
            socket,
            config,
            dispatcher,
            observer,
            event_bus: None,
            phase: SequencerPhase::Init,
            trace: Vec::new(),
            connect_result: None,
            connection: ConnectionState::Disconnected,
            link_deadline: None,
            socket_claimed: false,
            peer: None,
            pending: None,
            transaction: None,
            disconnect: None,
            report: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.observer = self.observer.clone().with_event_bus(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    /// Phases entered so far, in order.
    pub fn trace(&self) -> &[SequencerPhase] {
        &self.trace
    }

    pub fn pending(&self) -> Option<PendingSocketOp> {
        self.pending
    }

    pub fn report(&self) -> Option<RunReport> {
        self.report
    }

    /// Drain the queue until the sequence reaches `Done`.
    pub async fn run(&mut self) -> RunReport {
        while !self.phase.is_terminal() {
            let message = match self.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        biased;
                        message = self.dispatcher.next() => message,
                        _ = tokio::time::sleep_until(deadline) => SequencerMessage::PendingExpired,
                    }
                }
                None => self.dispatcher.next().await,
            };
            self.handle(message);
        }

        match self.report {
            Some(report) => report,
            None => self.build_report(),
        }
    }

    /// Handle one queued message, if any. Returns whether a message was handled.
    pub fn step(&mut self) -> bool {
        match self.dispatcher.try_next() {
            Some(message) => {
                self.handle(message);
                true
            }
            None => false,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.pending.map(|op| op.deadline).or(self.link_deadline)
    }

    fn handle(&mut self, message: SequencerMessage) {
        debug!(phase = %self.phase, ?message, "Handling message");
        match message {
            SequencerMessage::Advance(phase) => {
                if let Err(e) = self.enter(phase) {
                    error!(error = %e, "Dropping phase change");
                    return;
                }
                self.run_phase(phase);
            }
            SequencerMessage::LinkStatus(class) => self.on_link_status(class),
            SequencerMessage::SocketReadable => self.on_readable(),
            SequencerMessage::PendingExpired => self.on_pending_expired(),
        }
    }

    fn enter(&mut self, phase: SequencerPhase) -> Result<()> {
        let initial = self.trace.is_empty() && phase == SequencerPhase::Init;
        if !initial {
            PhaseMachine::validate_transition(&self.phase, &phase)?;
        }
        self.phase = phase;
        self.trace.push(phase);
        info!(phase = %phase, "Entering phase");
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::PhaseEntered { phase });
        }
        Ok(())
    }

    fn advance(&self, phase: SequencerPhase) {
        self.dispatcher.enqueue(SequencerMessage::Advance(phase));
    }

    fn run_phase(&mut self, phase: SequencerPhase) {
        match phase {
            SequencerPhase::Init => self.on_init(),
            SequencerPhase::Connecting => self.on_connecting(),
            SequencerPhase::EvaluateConnect => self.on_evaluate_connect(),
            SequencerPhase::Transacting => self.on_transacting(),
            SequencerPhase::EvaluateTransact => self.on_evaluate_transact(),
            SequencerPhase::Teardown => self.on_teardown(),
            SequencerPhase::Report => self.on_report(),
            SequencerPhase::Done => {}
        }
    }

    fn on_init(&mut self) {
        self.net.set_default_parameters(&self.config.cellular);
        self.net.attach(self.observer.callback());
        if let Err(code) = self.net.set_blocking(false) {
            warn!(code = code.code(), "Couldn't enable non-blocking mode");
        }
        self.advance(SequencerPhase::Connecting);
    }

    fn on_connecting(&mut self) {
        info!(backend = %self.net.name(), "Establishing connection");
        self.observer
            .link_state()
            .set_state(ConnectionState::Connecting);

        let result = self.net.connect();
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectAttempt {
                attempt: 1,
                max_attempts: 1,
                error: result.err().filter(|code| !code.is_pending()),
            });
        }
        self.connect_result = Some(result);
        self.advance(SequencerPhase::EvaluateConnect);
    }

    fn on_evaluate_connect(&mut self) {
        let link = self.observer.link_state().state();
        match self.connect_result {
            Some(Ok(())) | Some(Err(ErrorCode::IsConnected)) => {
                self.connected();
            }
            Some(Err(code)) if code.is_pending() => match link {
                ConnectionState::Connected => self.connected(),
                ConnectionState::Connecting => {
                    let wait = self.config.link_wait();
                    info!(wait_ms = wait.as_millis() as u64, "Waiting for link");
                    self.link_deadline = Some(Instant::now() + wait);
                }
                state => self.connect_failed(state),
            },
            Some(Err(code)) => {
                error!(code = code.code(), "Connect failed");
                self.connect_failed(ConnectionState::from_failure(code));
            }
            None => self.connect_failed(ConnectionState::Disconnected),
        }
    }

    fn connected(&mut self) {
        info!("Connection established");
        self.link_deadline = None;
        self.set_connection(ConnectionState::Connected);
        self.advance(SequencerPhase::Transacting);
    }

    fn connect_failed(&mut self, state: ConnectionState) {
        error!(state = %state, "Fatal connection failure");
        self.link_deadline = None;
        self.set_connection(state);
        self.advance(SequencerPhase::Teardown);
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectFinished { state, attempts: 1 });
        }
    }

    fn on_transacting(&mut self) {
        let transport = self.socket.transport();
        self.socket_claimed = true;
        self.transaction = Some(TransactionResult::new());

        if let Err(code) = self.socket.open(self.net.as_ref()) {
            self.fail_transaction(TransactionOutcome::OpenFailed, Some(code), "open");
            return;
        }

        self.socket.set_timeout(self.config.timeout());
        self.socket.set_blocking(false);
        let readiness = self.dispatcher.handle();
        self.socket.sigio(Box::new(move || {
            let _ = readiness.enqueue(SequencerMessage::SocketReadable);
        }));

        let peer = match resolve_peer(
            self.net.as_ref(),
            transport,
            &self.config.hostname,
            self.config.port,
        ) {
            Ok(peer) => peer,
            Err(code) => {
                error!(host = %self.config.hostname, code = code.code(), "Couldn't resolve remote host");
                self.fail_transaction(TransactionOutcome::ResolveFailed, Some(code), "gethostbyname");
                return;
            }
        };

        match connect_peer(self.socket.as_mut(), transport, peer) {
            Ok(()) => {}
            Err(code) if code.is_pending() => {
                debug!(transport = %transport, "Connect in progress");
            }
            Err(code) => {
                self.fail_transaction(TransactionOutcome::ConnectFailed, Some(code), "connect");
                return;
            }
        }

        self.peer = peer;
        self.try_send();
    }

    fn try_send(&mut self) {
        let transport = self.socket.transport();
        match send_payload(
            self.socket.as_mut(),
            transport,
            self.peer,
            self.config.payload.as_bytes(),
        ) {
            Ok(sent) => {
                info!(transport = %transport, bytes = sent, host = %self.config.hostname, "Sent echo payload");
                if let Some(result) = self.transaction.as_mut() {
                    result.bytes_sent = sent;
                }
                self.arm(PendingKind::Receive);
            }
            Err(ErrorCode::WouldBlock) => {
                debug!(transport = %transport, "Send would block");
                self.arm(PendingKind::Send);
            }
            Err(code) => self.fail_transaction(TransactionOutcome::SendFailed, Some(code), "send"),
        }
    }

    fn try_receive(&mut self) {
        let transport = self.socket.transport();
        let mut buf = vec![0u8; self.config.payload.len()];
        match receive_echo(self.socket.as_mut(), transport, &mut buf) {
            Ok(received) if received > 0 => {
                info!(transport = %transport, bytes = received, "Received from echo server");
                if let Some(result) = self.transaction.as_mut() {
                    result.bytes_received = received;
                }
                self.pending = None;
                self.advance(SequencerPhase::EvaluateTransact);
            }
            Ok(_) => {
                error!(transport = %transport, "Echo server returned no data");
                self.fail_transaction(TransactionOutcome::RecvFailed, None, "recv");
            }
            Err(ErrorCode::WouldBlock) => {
                debug!(transport = %transport, "Receive would block, waiting for readiness");
            }
            Err(code) => self.fail_transaction(TransactionOutcome::RecvFailed, Some(code), "recv"),
        }
    }

    /// Keeps an existing deadline when re-arming the same kind.
    fn arm(&mut self, kind: PendingKind) {
        let deadline = match self.pending {
            Some(op) if op.kind == kind => op.deadline,
            _ => Instant::now() + self.config.pending_deadline(),
        };
        self.pending = Some(PendingSocketOp { kind, deadline });
    }

    fn fail_transaction(
        &mut self,
        outcome: TransactionOutcome,
        code: Option<ErrorCode>,
        operation: &str,
    ) {
        let transport = self.socket.transport();
        match code {
            Some(code) => error!(
                transport = %transport,
                operation,
                code = code.code(),
                "{}Socket.{}() fails, code: {}",
                transport.label(),
                operation,
                code.code()
            ),
            None => error!(transport = %transport, operation, "{}Socket.{}() fails", transport.label(), operation),
        }
        if let Some(result) = self.transaction.as_mut() {
            result.fail(outcome, code);
        }
        self.pending = None;
        self.advance(SequencerPhase::EvaluateTransact);
    }

    fn on_readable(&mut self) {
        if self.phase != SequencerPhase::Transacting {
            debug!(phase = %self.phase, "Ignoring socket readiness");
            return;
        }
        match self.pending.map(|op| op.kind) {
            Some(PendingKind::Send) => self.try_send(),
            Some(PendingKind::Receive) => self.try_receive(),
            None => debug!("Socket readiness with nothing pending"),
        }
    }

    fn on_link_status(&mut self, class: StatusClass) {
        if self.phase == SequencerPhase::EvaluateConnect && self.link_deadline.is_some() {
            match class {
                StatusClass::Connected => self.connected(),
                class if class.is_down() => {
                    let state = class
                        .connection_state()
                        .unwrap_or(ConnectionState::Disconnected);
                    self.connect_failed(state);
                }
                _ => {}
            }
            return;
        }

        if self.phase == SequencerPhase::Transacting && class.is_down() {
            if let Some(op) = self.pending {
                let reason = self
                    .observer
                    .link_state()
                    .down_reason()
                    .unwrap_or(ErrorCode::ConnectionLost);
                warn!(class = %class, "Link went down during transaction");
                self.fail_transaction(op.failure(), Some(reason), op.operation());
            }
            return;
        }

        debug!(phase = %self.phase, class = %class, "Link status noted");
    }

    fn on_pending_expired(&mut self) {
        let now = Instant::now();

        if let Some(deadline) = self.link_deadline {
            if now >= deadline {
                error!("Timed out waiting for link");
                self.observer
                    .link_state()
                    .set_state(ConnectionState::TimedOut);
                self.connect_failed(ConnectionState::TimedOut);
            }
            return;
        }

        if let Some(op) = self.pending {
            if now >= op.deadline {
                self.fail_transaction(op.failure(), Some(ErrorCode::Timeout), op.operation());
            }
        }
    }

    fn on_evaluate_transact(&mut self) {
        if let Some(result) = self.transaction {
            if result.is_ok() {
                info!(
                    sent = result.bytes_sent,
                    received = result.bytes_received,
                    "Echo transaction complete"
                );
            } else {
                error!(outcome = %result.outcome, code = result.error.map(|c| c.code()), "Echo transaction failed");
            }
            if let Some(ref bus) = self.event_bus {
                bus.publish(Event::TransactionFinished {
                    transport: self.socket.transport(),
                    result,
                });
            }
        }
        self.advance(SequencerPhase::Teardown);
    }

    fn on_teardown(&mut self) {
        self.close_socket();
        self.disconnect = Some(disconnect_network(
            self.net.as_ref(),
            self.event_bus.as_ref(),
        ));
        self.advance(SequencerPhase::Report);
    }

    fn close_socket(&mut self) {
        if !self.socket_claimed {
            return;
        }
        self.socket_claimed = false;
        self.pending = None;

        let transport = self.socket.transport();
        if let Err(code) = self.socket.close() {
            warn!(transport = %transport, code = code.code(), "{}Socket.close() fails", transport.label());
            if let Some(result) = self.transaction.as_mut() {
                if result.is_ok() {
                    result.fail(TransactionOutcome::CloseFailed, Some(code));
                }
            }
        }
    }

    fn on_report(&mut self) {
        let report = finish_run(self.build_report(), self.event_bus.as_ref());
        self.report = Some(report);
        if let Err(e) = self.enter(SequencerPhase::Done) {
            error!(error = %e, "Couldn't finish sequence");
        }
    }

    fn build_report(&self) -> RunReport {
        let attempts = u32::from(self.connect_result.is_some());
        RunReport::new(
            RunMode::Async,
            self.connection,
            attempts,
            self.transaction,
            self.disconnect,
        )
    }
}

impl Drop for AsyncOrchestrator {
    fn drop(&mut self) {
        if self.socket_claimed {
            warn!("Sequencer dropped with socket open, closing");
            self.close_socket();
        }
    }
}
