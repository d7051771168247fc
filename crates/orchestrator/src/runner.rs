//! Blocking and step-synchronized runners.
//!
//! Both run the same connect, echo, disconnect cycle as the async
//! sequencer, but drive it with ordinary blocking calls. The blocking
//! runner is a plain synchronous function meant for a blocking worker; the
//! stepped runner connects without blocking and parks on a [`StepSignal`]
//! until the observer reports the link outcome.

use cellular_core::{
    ConnectionState, ErrorCode, NetworkInterface, RunMode, Socket, TransactionResult,
};
use events::{Event, EventBus};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::EchoConfig;
use crate::connector::Connector;
use crate::observer::{StatusObserver, StatusSink, StepSignal};
use crate::resources::ProgressTicker;
use crate::transaction::EchoTransaction;

/// Aggregate result of one connect, transact, disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub connection: ConnectionState,
    pub attempts: u32,
    /// `None` when the run never got as far as the transaction.
    pub transaction: Option<TransactionResult>,
    pub disconnect: Option<Result<(), ErrorCode>>,
    pub success: bool,
}

impl RunReport {
    pub fn new(
        mode: RunMode,
        connection: ConnectionState,
        attempts: u32,
        transaction: Option<TransactionResult>,
        disconnect: Option<Result<(), ErrorCode>>,
    ) -> Self {
        let success = connection.is_connected()
            && transaction.is_some_and(|t| t.is_ok())
            && matches!(disconnect, Some(Ok(())));
        Self {
            mode,
            connection,
            attempts,
            transaction,
            disconnect,
            success,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

pub(crate) fn disconnect_network(
    net: &dyn NetworkInterface,
    event_bus: Option<&EventBus>,
) -> Result<(), ErrorCode> {
    info!(backend = %net.name(), "Disconnecting");
    let result = net.disconnect();
    match result {
        Ok(()) => info!("Disconnected"),
        Err(code) => error!(code = code.code(), "Disconnect failed"),
    }
    if let Some(bus) = event_bus {
        bus.publish(Event::Disconnected {
            error: result.err(),
        });
    }
    result
}

pub(crate) fn finish_run(report: RunReport, event_bus: Option<&EventBus>) -> RunReport {
    if report.success {
        info!(mode = %report.mode, attempts = report.attempts, "Run succeeded");
    } else {
        error!(
            mode = %report.mode,
            connection = %report.connection,
            outcome = ?report.transaction.map(|t| t.outcome),
            "Run failed"
        );
    }
    if let Some(bus) = event_bus {
        bus.publish(Event::RunFinished {
            success: report.success,
        });
    }
    report
}

fn prepare(net: &dyn NetworkInterface, config: &EchoConfig, observer: &StatusObserver, blocking: bool) {
    net.set_default_parameters(&config.cellular);
    net.attach(observer.callback());
    if let Err(code) = net.set_blocking(blocking) {
        warn!(blocking, code = code.code(), "Couldn't set network blocking mode");
    }
}

/// Runs the whole cycle with blocking driver calls.
pub struct BlockingRunner {
    net: Arc<dyn NetworkInterface>,
    socket: Box<dyn Socket>,
    config: EchoConfig,
    event_bus: Option<EventBus>,
}

impl BlockingRunner {
    pub fn new(net: Arc<dyn NetworkInterface>, socket: Box<dyn Socket>, config: EchoConfig) -> Self {
        Self {
            net,
            socket,
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Blocks the calling thread. Run it on a blocking worker.
    pub fn run(mut self) -> RunReport {
        let mut observer = StatusObserver::new(StatusSink::None);
        if let Some(ref bus) = self.event_bus {
            observer = observer.with_event_bus(bus.clone());
        }
        prepare(self.net.as_ref(), &self.config, &observer, true);

        let connect = {
            let _ticker = ProgressTicker::start_current(
                self.net.clone(),
                self.config.progress_interval(),
                self.event_bus.clone(),
            );
            let mut connector = Connector::new(self.net.as_ref(), self.config.max_retries);
            if let Some(ref bus) = self.event_bus {
                connector = connector.with_event_bus(bus.clone());
            }
            connector.connect()
        };

        if !connect.is_connected() {
            if let Some(reason) = observer.link_state().down_reason() {
                warn!(code = reason.code(), reason = %reason, "Last reported link down reason");
            }
            let report = RunReport::new(
                RunMode::Blocking,
                connect.state,
                connect.attempts,
                None,
                None,
            );
            return finish_run(report, self.event_bus.as_ref());
        }

        let mut transaction = EchoTransaction::new(self.net.as_ref(), &self.config);
        if let Some(ref bus) = self.event_bus {
            transaction = transaction.with_event_bus(bus.clone());
        }
        let result = transaction.run(self.socket.as_mut());

        let disconnect = disconnect_network(self.net.as_ref(), self.event_bus.as_ref());

        let report = RunReport::new(
            RunMode::Blocking,
            connect.state,
            connect.attempts,
            Some(result),
            Some(disconnect),
        );
        finish_run(report, self.event_bus.as_ref())
    }
}

/// Connects without blocking, then waits for the observer's verdict.
pub struct SteppedRunner {
    net: Arc<dyn NetworkInterface>,
    socket: Box<dyn Socket>,
    config: EchoConfig,
    event_bus: Option<EventBus>,
}

impl SteppedRunner {
    pub fn new(net: Arc<dyn NetworkInterface>, socket: Box<dyn Socket>, config: EchoConfig) -> Self {
        Self {
            net,
            socket,
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub async fn run(self) -> RunReport {
        let signal = StepSignal::new();
        let mut observer = StatusObserver::new(StatusSink::Signal(signal.clone()));
        if let Some(ref bus) = self.event_bus {
            observer = observer.with_event_bus(bus.clone());
        }
        prepare(self.net.as_ref(), &self.config, &observer, false);

        info!(backend = %self.net.name(), "Establishing connection");
        observer.link_state().set_state(ConnectionState::Connecting);
        let immediate = self.net.connect();
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectAttempt {
                attempt: 1,
                max_attempts: 1,
                error: immediate.err().filter(|code| !code.is_pending()),
            });
        }

        let state = match immediate {
            Ok(()) | Err(ErrorCode::IsConnected) => ConnectionState::Connected,
            Err(code) if code.is_pending() => {
                let link_wait = self.config.link_wait();
                info!(wait_ms = link_wait.as_millis() as u64, "Waiting for link");
                if signal.wait(link_wait).await {
                    observer.link_state().state()
                } else {
                    error!(wait_ms = link_wait.as_millis() as u64, "Timed out waiting for link");
                    ConnectionState::TimedOut
                }
            }
            Err(code) => {
                error!(code = code.code(), "Connect failed");
                ConnectionState::from_failure(code)
            }
        };

        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectFinished { state, attempts: 1 });
        }

        if !state.is_connected() {
            let report = RunReport::new(RunMode::Stepped, state, 1, None, None);
            return finish_run(report, self.event_bus.as_ref());
        }
        info!("Connection established");

        let Self {
            net,
            mut socket,
            config,
            event_bus,
        } = self;
        let worker_bus = event_bus.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let mut transaction = EchoTransaction::new(net.as_ref(), &config);
            if let Some(bus) = worker_bus.clone() {
                transaction = transaction.with_event_bus(bus);
            }
            let result = transaction.run(socket.as_mut());
            let disconnect = disconnect_network(net.as_ref(), worker_bus.as_ref());
            (result, disconnect)
        })
        .await;

        let report = match joined {
            Ok((result, disconnect)) => {
                RunReport::new(RunMode::Stepped, state, 1, Some(result), Some(disconnect))
            }
            Err(e) => {
                error!(error = %e, "Transaction worker failed");
                if let Some(ref bus) = event_bus {
                    bus.publish(Event::Error {
                        message: e.to_string(),
                        context: Some("transaction worker".to_string()),
                    });
                }
                RunReport::new(RunMode::Stepped, state, 1, None, None)
            }
        };
        finish_run(report, event_bus.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockNetwork, MockSocket};
    use cellular_core::{LinkStatus, NetworkEvent, TransactionOutcome, TransportKind};
    use std::time::Duration;

    fn config() -> EchoConfig {
        EchoConfig {
            link_wait_ms: 5_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_report_success_requires_every_step() {
        let ok = TransactionResult {
            bytes_sent: 4,
            bytes_received: 4,
            ..Default::default()
        };
        let connected = ConnectionState::Connected;

        assert!(RunReport::new(RunMode::Blocking, connected, 1, Some(ok), Some(Ok(()))).success);
        assert!(!RunReport::new(RunMode::Blocking, connected, 1, None, Some(Ok(()))).success);
        assert!(
            !RunReport::new(
                RunMode::Blocking,
                connected,
                1,
                Some(ok),
                Some(Err(ErrorCode::DeviceError))
            )
            .success
        );

        let report = RunReport::new(RunMode::Async, ConnectionState::Lost, 4, None, None);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_runner_full_cycle() {
        let net = Arc::new(MockNetwork::new());
        let (socket, handle) = MockSocket::echo(TransportKind::Udp);
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let runner = BlockingRunner::new(net.clone(), Box::new(socket), config()).with_event_bus(bus);
        let report = tokio::task::spawn_blocking(move || runner.run())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.attempts, 1);
        assert_eq!(net.blocking(), Some(true));
        assert!(net.has_callback());
        assert_eq!(net.disconnect_calls(), 1);
        assert_eq!(handle.closes(), 1);

        let mut saw_run_finished = false;
        while let Ok(envelope) = rx.try_recv() {
            if envelope.event == (Event::RunFinished { success: true }) {
                saw_run_finished = true;
            }
        }
        assert!(saw_run_finished);
    }

    #[test]
    fn test_blocking_runner_auth_failure_skips_transaction() {
        let net = Arc::new(MockNetwork::new().with_connect_results(vec![Err(ErrorCode::AuthFailure)]));
        let (socket, handle) = MockSocket::echo(TransportKind::Tcp);

        let report = BlockingRunner::new(net.clone(), Box::new(socket), config()).run();

        assert!(!report.success);
        assert_eq!(report.connection, ConnectionState::AuthFailed);
        assert_eq!(report.transaction, None);
        assert_eq!(handle.opens(), 0);
        assert_eq!(net.disconnect_calls(), 0);
    }

    #[test]
    fn test_blocking_runner_disconnect_failure_fails_run() {
        let net = Arc::new(MockNetwork::new().with_disconnect_result(Err(ErrorCode::NoConnection)));
        let (socket, _handle) = MockSocket::echo(TransportKind::Udp);
        let mut config = config();
        config.cellular.apn = Some("internet".to_string());

        let report = BlockingRunner::new(net.clone(), Box::new(socket), config.clone()).run();

        assert_eq!(net.params(), Some(config.cellular));
        assert!(report.transaction.unwrap().is_ok());
        assert_eq!(report.disconnect, Some(Err(ErrorCode::NoConnection)));
        assert!(!report.success);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_blocking_runner_reports_transaction_failure() {
        let net = Arc::new(MockNetwork::new());
        let (socket, handle) = MockSocket::echo(TransportKind::Udp);
        let socket = socket.with_open_result(Err(ErrorCode::NoSocket));

        let report = BlockingRunner::new(net.clone(), Box::new(socket), config()).run();

        assert!(!report.success);
        let transaction = report.transaction.unwrap();
        assert_eq!(transaction.outcome, TransactionOutcome::OpenFailed);
        assert_eq!(handle.closes(), 1);
        assert_eq!(net.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_stepped_runner_waits_for_link_up() {
        let net = Arc::new(
            MockNetwork::new()
                .with_connect_results(vec![Err(ErrorCode::InProgress)])
                .with_event_on_connect(NetworkEvent::StatusChanged(LinkStatus::GlobalUp)),
        );
        let (socket, handle) = MockSocket::echo(TransportKind::Udp);

        let report = SteppedRunner::new(net.clone(), Box::new(socket), config())
            .run()
            .await;

        assert!(report.success);
        assert_eq!(report.mode, RunMode::Stepped);
        assert_eq!(net.blocking(), Some(false));
        assert_eq!(handle.closes(), 1);
        assert_eq!(net.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_stepped_runner_link_up_from_other_task() {
        let net = Arc::new(MockNetwork::new().with_connect_results(vec![Err(ErrorCode::InProgress)]));
        let (socket, _handle) = MockSocket::echo(TransportKind::Tcp);

        let driver = net.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            driver.fire(NetworkEvent::StatusChanged(LinkStatus::LocalUp));
        });

        let report = SteppedRunner::new(net.clone(), Box::new(socket), config())
            .run()
            .await;
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_stepped_runner_link_down_verdict() {
        let net = Arc::new(
            MockNetwork::new()
                .with_connect_results(vec![Err(ErrorCode::InProgress)])
                .with_event_on_connect(NetworkEvent::ConnectionDown(ErrorCode::AuthFailure)),
        );
        let (socket, handle) = MockSocket::echo(TransportKind::Udp);

        let report = SteppedRunner::new(net.clone(), Box::new(socket), config())
            .run()
            .await;

        assert_eq!(report.connection, ConnectionState::AuthFailed);
        assert_eq!(report.transaction, None);
        assert_eq!(handle.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stepped_runner_times_out_without_verdict() {
        let net = Arc::new(MockNetwork::new().with_connect_results(vec![Err(ErrorCode::InProgress)]));
        let (socket, handle) = MockSocket::echo(TransportKind::Udp);

        let report = SteppedRunner::new(net.clone(), Box::new(socket), config())
            .run()
            .await;

        assert_eq!(report.connection, ConnectionState::TimedOut);
        assert!(!report.success);
        assert_eq!(handle.opens(), 0);
    }

    #[tokio::test]
    async fn test_stepped_runner_immediate_failure() {
        let net = Arc::new(MockNetwork::new().with_connect_results(vec![Err(ErrorCode::NoConnection)]));
        let (socket, _handle) = MockSocket::echo(TransportKind::Udp);

        let report = SteppedRunner::new(net, Box::new(socket), config()).run().await;
        assert_eq!(report.connection, ConnectionState::Disconnected);
        assert_eq!(report.exit_code(), 1);
    }
}
