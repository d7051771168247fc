use cellular_core::{ConnectionState, ErrorCode, LinkStatus, NetworkInterface, RetryBudget};
use events::{Event, EventBus};
use tracing::{error, info, warn};

/// Outcome of one connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReport {
    pub state: ConnectionState,
    /// Connect primitive calls made; zero when the link was already up.
    pub attempts: u32,
    pub last_error: Option<ErrorCode>,
}

impl ConnectReport {
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

/// Blocking connect loop with a bounded retry budget.
///
/// Authentication failures end the cycle at once; every other error is
/// retried until the budget is spent. No delay is added between attempts
/// beyond what the driver's connect blocks for.
pub struct Connector<'a> {
    net: &'a dyn NetworkInterface,
    budget: RetryBudget,
    event_bus: Option<EventBus>,
}

impl<'a> Connector<'a> {
    pub fn new(net: &'a dyn NetworkInterface, max_retries: u32) -> Self {
        Self {
            net,
            budget: RetryBudget::new(max_retries),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn connect(&mut self) -> ConnectReport {
        info!(backend = %self.net.name(), "Establishing connection");
        self.budget.reset();

        if self.net.connection_status() == LinkStatus::GlobalUp {
            info!("Already connected");
            return self.finish(ConnectionState::Connected, None);
        }

        let mut last_error = None;

        while !self.budget.exhausted() {
            self.budget.record_attempt();
            let attempt = self.budget.attempts_made;

            match self.net.connect() {
                Ok(()) | Err(ErrorCode::IsConnected) => {
                    info!(attempt, "Connection established");
                    self.emit_attempt(None);
                    return self.finish(ConnectionState::Connected, None);
                }
                Err(code) if code.is_terminal_for_connect() => {
                    error!(attempt, code = code.code(), "Authentication failure");
                    self.emit_attempt(Some(code));
                    return self.finish(ConnectionState::AuthFailed, Some(code));
                }
                Err(code) => {
                    self.emit_attempt(Some(code));
                    last_error = Some(code);
                    if self.budget.exhausted() {
                        warn!(attempt, code = code.code(), "Couldn't connect");
                    } else {
                        warn!(
                            attempt,
                            code = code.code(),
                            remaining = self.budget.remaining(),
                            "Couldn't connect, will retry"
                        );
                    }
                }
            }
        }

        let state = last_error
            .map(ConnectionState::from_failure)
            .unwrap_or_default();
        error!(
            attempts = self.budget.attempts_made,
            code = last_error.map(|c| c.code()),
            state = %state,
            "Fatal connection failure"
        );
        self.finish(state, last_error)
    }

    fn emit_attempt(&self, error: Option<ErrorCode>) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectAttempt {
                attempt: self.budget.attempts_made,
                max_attempts: self.budget.max_attempts,
                error,
            });
        }
    }

    fn finish(&self, state: ConnectionState, last_error: Option<ErrorCode>) -> ConnectReport {
        let report = ConnectReport {
            state,
            attempts: self.budget.attempts_made,
            last_error,
        };
        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::ConnectFinished {
                state,
                attempts: report.attempts,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNetwork;

    #[test]
    fn test_first_attempt_succeeds() {
        let net = MockNetwork::new();
        let report = Connector::new(&net, 3).connect();

        assert_eq!(report.state, ConnectionState::Connected);
        assert_eq!(report.attempts, 1);
        assert_eq!(net.connect_calls(), 1);
    }

    #[test]
    fn test_retries_until_success() {
        let net = MockNetwork::new().with_connect_results(vec![
            Err(ErrorCode::NoConnection),
            Err(ErrorCode::NoConnection),
            Ok(()),
        ]);
        let report = Connector::new(&net, 3).connect();

        assert_eq!(report.state, ConnectionState::Connected);
        assert_eq!(report.attempts, 3);
        assert_eq!(net.connect_calls(), 3);
        assert_eq!(report.last_error, None);
    }

    #[test]
    fn test_auth_failure_short_circuits() {
        let net = MockNetwork::new().with_connect_results(vec![
            Err(ErrorCode::NoConnection),
            Err(ErrorCode::AuthFailure),
            Ok(()),
        ]);
        let report = Connector::new(&net, 10).connect();

        assert_eq!(report.state, ConnectionState::AuthFailed);
        assert_eq!(report.attempts, 2);
        assert_eq!(net.connect_calls(), 2);
        assert_eq!(report.last_error, Some(ErrorCode::AuthFailure));
    }

    #[test]
    fn test_attempts_bounded_by_budget() {
        for max_retries in 0..5 {
            let failures = vec![Err(ErrorCode::ConnectionTimeout); 10];
            let net = MockNetwork::new().with_connect_results(failures);
            let report = Connector::new(&net, max_retries).connect();

            assert_eq!(report.attempts, max_retries + 1);
            assert_eq!(net.connect_calls(), max_retries + 1);
            assert_eq!(report.state, ConnectionState::TimedOut);
            assert_eq!(report.last_error, Some(ErrorCode::ConnectionTimeout));
        }
    }

    #[test]
    fn test_exhaustion_maps_last_error() {
        let net = MockNetwork::new().with_connect_results(vec![
            Err(ErrorCode::Timeout),
            Err(ErrorCode::ConnectionLost),
        ]);
        let report = Connector::new(&net, 1).connect();

        assert_eq!(report.state, ConnectionState::Lost);
    }

    #[test]
    fn test_already_connected_skips_connect() {
        let net = MockNetwork::new().with_status(LinkStatus::GlobalUp);
        let report = Connector::new(&net, 3).connect();

        assert!(report.is_connected());
        assert_eq!(report.attempts, 0);
        assert_eq!(net.connect_calls(), 0);
    }

    #[test]
    fn test_budget_resets_between_cycles() {
        let net = MockNetwork::new().with_connect_results(vec![
            Err(ErrorCode::NoConnection),
            Err(ErrorCode::NoConnection),
        ]);
        let mut connector = Connector::new(&net, 1);

        let first = connector.connect();
        assert!(!first.is_connected());
        assert_eq!(first.attempts, 2);
        assert!(connector.budget().exhausted());

        let second = connector.connect();
        assert!(second.is_connected());
        assert_eq!(second.attempts, 1);
        assert_eq!(connector.budget().attempts_made, 1);
        assert_eq!(connector.budget().max_attempts, 2);
    }

    #[tokio::test]
    async fn test_emits_one_event_per_attempt() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let net = MockNetwork::new().with_connect_results(vec![Err(ErrorCode::Busy), Ok(())]);

        Connector::new(&net, 3).with_event_bus(bus.clone()).connect();

        let events: Vec<Event> = vec![
            rx.recv().await.unwrap().event,
            rx.recv().await.unwrap().event,
            rx.recv().await.unwrap().event,
        ];
        assert_eq!(
            events,
            vec![
                Event::ConnectAttempt {
                    attempt: 1,
                    max_attempts: 4,
                    error: Some(ErrorCode::Busy)
                },
                Event::ConnectAttempt {
                    attempt: 2,
                    max_attempts: 4,
                    error: None
                },
                Event::ConnectFinished {
                    state: ConnectionState::Connected,
                    attempts: 2
                },
            ]
        );
    }
}
