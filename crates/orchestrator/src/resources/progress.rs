//! Periodic link progress reporting bound to a scope.
//!
//! While a blocking connect is parked in the driver, a ticker polls the
//! link status and publishes a progress event per interval. The ticker is
//! a guard: dropping it stops the task, so it cannot outlive the connect
//! it reports on.

use cellular_core::NetworkInterface;
use events::{Event, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

pub struct ProgressTicker {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
}

impl ProgressTicker {
    /// Spawn the ticker on `runtime`.
    pub fn start(
        runtime: &Handle,
        net: Arc<dyn NetworkInterface>,
        interval: Duration,
        event_bus: Option<EventBus>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            let mut ticks = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        let link = net.connection_status();
                        trace!(link = %link, ticks, "Connect progress");
                        if let Some(ref bus) = event_bus {
                            bus.publish(Event::ConnectProgress { link });
                        }
                    }
                }
            }
            ticks
        });

        debug!(interval_ms = interval.as_millis() as u64, "Progress ticker started");

        Self {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Spawn on the runtime of the calling context, if it has one.
    ///
    /// Blocking workers started with `spawn_blocking` still see their runtime.
    pub fn start_current(
        net: Arc<dyn NetworkInterface>,
        interval: Duration,
        event_bus: Option<EventBus>,
    ) -> Option<Self> {
        match Handle::try_current() {
            Ok(runtime) => Some(Self::start(&runtime, net, interval, event_bus)),
            Err(_) => {
                debug!("No runtime available, progress ticker disabled");
                None
            }
        }
    }

    /// Stop the ticker and wait for it, returning how many ticks it reported.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Progress ticker stopped");
        }
    }
}
