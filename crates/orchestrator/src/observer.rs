//! Network status observer.
//!
//! Driver status callbacks may run on a driver-owned context, so the
//! observer only classifies, records, and forwards. Forwarding goes either
//! into the sequencer's queue or to a counting [`StepSignal`] that a
//! parked runner waits on.

use cellular_core::{
    ConnectionState, ErrorCode, LinkStatus, NetworkEvent, StatusCallback, StatusClass,
};
use events::{Event, EventBus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dispatcher::DispatchHandle;
use crate::sequencer::SequencerMessage;

/// Map a driver event onto the status classes the runners act on.
pub fn classify(event: &NetworkEvent) -> StatusClass {
    match event {
        NetworkEvent::StatusChanged(LinkStatus::GlobalUp | LinkStatus::LocalUp) => {
            StatusClass::Connected
        }
        NetworkEvent::StatusChanged(LinkStatus::Disconnected) => StatusClass::Disconnected,
        NetworkEvent::StatusChanged(LinkStatus::Connecting) => StatusClass::Other,
        NetworkEvent::ConnectionDown(code) => match code {
            ErrorCode::ConnectionLost | ErrorCode::NoConnection => StatusClass::Lost,
            ErrorCode::ConnectionTimeout | ErrorCode::Timeout => StatusClass::TimedOut,
            ErrorCode::AuthFailure => StatusClass::AuthFailed,
            _ => StatusClass::Disconnected,
        },
        NetworkEvent::Other { .. } => StatusClass::Other,
    }
}

#[derive(Debug, Default)]
struct LinkStateInner {
    state: ConnectionState,
    down_reason: Option<ErrorCode>,
}

/// Connection state shared between the observer and whoever reads it.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    inner: Arc<Mutex<LinkStateInner>>,
}

impl LinkState {
    fn lock(&self) -> MutexGuard<'_, LinkStateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    /// Reason given by the most recent connection-down event.
    pub fn down_reason(&self) -> Option<ErrorCode> {
        self.lock().down_reason
    }

    fn record(&self, event: &NetworkEvent, class: StatusClass) {
        let mut inner = self.lock();
        if let Some(state) = class.connection_state() {
            inner.state = state;
        }
        if let NetworkEvent::ConnectionDown(code) = event {
            inner.down_reason = Some(*code);
        }
    }
}

/// Counting wait primitive released by the observer.
///
/// Releases are never lost: a release that happens before the wait is
/// consumed by the next wait.
#[derive(Debug, Clone)]
pub struct StepSignal {
    permits: Arc<Semaphore>,
}

impl StepSignal {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Wait for one release. Returns `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for StepSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Where classified events go after they are recorded.
#[derive(Clone)]
pub enum StatusSink {
    /// Record only.
    None,
    /// Enqueue a link status message for the sequencer.
    Queue(DispatchHandle<SequencerMessage>),
    /// Release the signal on every class that settles the connection.
    Signal(StepSignal),
}

#[derive(Clone)]
pub struct StatusObserver {
    link: LinkState,
    sink: StatusSink,
    event_bus: Option<EventBus>,
}

impl StatusObserver {
    pub fn new(sink: StatusSink) -> Self {
        Self {
            link: LinkState::default(),
            sink,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn link_state(&self) -> &LinkState {
        &self.link
    }

    pub fn on_event(&self, event: NetworkEvent) -> StatusClass {
        let class = classify(&event);

        match class {
            StatusClass::Connected => info!("Network status: connected"),
            StatusClass::Other => debug!(?event, "Network status event"),
            StatusClass::Lost => warn!(?event, "Carrier/connection lost"),
            StatusClass::TimedOut => warn!(?event, "Connection timed out"),
            StatusClass::AuthFailed => warn!(?event, "Authentication failure"),
            StatusClass::Disconnected => warn!(?event, "Network disconnected"),
        }

        self.link.record(&event, class);

        if class == StatusClass::Other {
            return class;
        }

        if let Some(ref bus) = self.event_bus {
            bus.publish(Event::LinkStatusChanged { class });
        }

        match &self.sink {
            StatusSink::None => {}
            StatusSink::Queue(handle) => {
                if handle.enqueue(SequencerMessage::LinkStatus(class)).is_err() {
                    debug!(class = %class, "Sequencer gone, dropping status event");
                }
            }
            StatusSink::Signal(signal) => signal.release(),
        }

        class
    }

    /// Box the observer as a driver callback.
    pub fn callback(&self) -> StatusCallback {
        let observer = self.clone();
        Box::new(move |event| {
            observer.on_event(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;

    #[test]
    fn test_classify_status_changes() {
        assert_eq!(
            classify(&NetworkEvent::StatusChanged(LinkStatus::GlobalUp)),
            StatusClass::Connected
        );
        assert_eq!(
            classify(&NetworkEvent::StatusChanged(LinkStatus::LocalUp)),
            StatusClass::Connected
        );
        assert_eq!(
            classify(&NetworkEvent::StatusChanged(LinkStatus::Disconnected)),
            StatusClass::Disconnected
        );
        assert_eq!(
            classify(&NetworkEvent::StatusChanged(LinkStatus::Connecting)),
            StatusClass::Other
        );
    }

    #[test]
    fn test_classify_down_reasons() {
        let down = |code| classify(&NetworkEvent::ConnectionDown(code));
        assert_eq!(down(ErrorCode::ConnectionLost), StatusClass::Lost);
        assert_eq!(down(ErrorCode::NoConnection), StatusClass::Lost);
        assert_eq!(down(ErrorCode::ConnectionTimeout), StatusClass::TimedOut);
        assert_eq!(down(ErrorCode::AuthFailure), StatusClass::AuthFailed);
        assert_eq!(down(ErrorCode::DeviceError), StatusClass::Disconnected);
        assert_eq!(
            classify(&NetworkEvent::Other {
                event: 7,
                payload: 0
            }),
            StatusClass::Other
        );
    }

    #[test]
    fn test_records_state_and_down_reason() {
        let observer = StatusObserver::new(StatusSink::None);

        observer.on_event(NetworkEvent::StatusChanged(LinkStatus::GlobalUp));
        assert_eq!(observer.link_state().state(), ConnectionState::Connected);
        assert_eq!(observer.link_state().down_reason(), None);

        observer.on_event(NetworkEvent::ConnectionDown(ErrorCode::ConnectionLost));
        assert_eq!(observer.link_state().state(), ConnectionState::Lost);
        assert_eq!(
            observer.link_state().down_reason(),
            Some(ErrorCode::ConnectionLost)
        );
    }

    #[test]
    fn test_other_events_leave_state_alone() {
        let observer = StatusObserver::new(StatusSink::None);
        observer.link_state().set_state(ConnectionState::Connecting);

        observer.on_event(NetworkEvent::StatusChanged(LinkStatus::Connecting));
        assert_eq!(observer.link_state().state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_queue_sink_enqueues_only() {
        let mut dispatcher = Dispatcher::new();
        let observer = StatusObserver::new(StatusSink::Queue(dispatcher.handle()));

        let callback = observer.callback();
        callback(NetworkEvent::StatusChanged(LinkStatus::Connecting));
        callback(NetworkEvent::StatusChanged(LinkStatus::GlobalUp));

        assert_eq!(
            dispatcher.try_next(),
            Some(SequencerMessage::LinkStatus(StatusClass::Connected))
        );
        assert_eq!(dispatcher.try_next(), None);
    }

    #[tokio::test]
    async fn test_signal_release_before_wait_is_kept() {
        let signal = StepSignal::new();
        let observer = StatusObserver::new(StatusSink::Signal(signal.clone()));

        observer.on_event(NetworkEvent::StatusChanged(LinkStatus::GlobalUp));
        assert_eq!(signal.available(), 1);

        assert!(signal.wait(Duration::from_millis(10)).await);
        assert_eq!(signal.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_wait_times_out() {
        let signal = StepSignal::new();
        assert!(!signal.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_signal_released_from_other_task() {
        let signal = StepSignal::new();
        let observer = StatusObserver::new(StatusSink::Signal(signal.clone()));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            observer.on_event(NetworkEvent::ConnectionDown(ErrorCode::AuthFailure));
        });

        assert!(signal.wait(Duration::from_secs(5)).await);
    }
}
