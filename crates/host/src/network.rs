//! Network interface backed by the host's own IP stack.
//!
//! There is no modem to bring up, so "connecting" only flips the link
//! status and tells the attached callback. In non-blocking mode the
//! link-up notification is delivered from a runtime task after `connect`
//! has returned `InProgress`, the same shape a cellular driver reports.

use cellular_core::{
    CellularParameters, ErrorCode, LinkStatus, NetworkEvent, NetworkInterface, StatusCallback,
};
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{HostError, Result};

type SharedCallback = Arc<dyn Fn(NetworkEvent) + Send + Sync>;

#[derive(Default)]
struct LinkInner {
    status: LinkStatus,
    blocking: bool,
    callback: Option<SharedCallback>,
    params: CellularParameters,
}

#[derive(Clone)]
struct Link {
    inner: Arc<Mutex<LinkInner>>,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the status and notify outside the lock.
    fn set_status(&self, status: LinkStatus) {
        let callback = {
            let mut inner = self.lock();
            inner.status = status;
            inner.callback.clone()
        };
        if let Some(callback) = callback {
            callback(NetworkEvent::StatusChanged(status));
        }
    }
}

pub struct HostNetwork {
    link: Link,
    link_delay: Duration,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self {
            link: Link {
                inner: Arc::new(Mutex::new(LinkInner {
                    blocking: true,
                    ..Default::default()
                })),
            },
            link_delay: Duration::ZERO,
        }
    }

    /// Delay before a non-blocking connect reports link-up.
    pub fn with_link_delay(mut self, delay: Duration) -> Self {
        self.link_delay = delay;
        self
    }

    /// Resolve `name`, preferring IPv4.
    pub fn resolve(&self, name: &str) -> Result<IpAddr> {
        let addrs: Vec<IpAddr> = (name, 0)
            .to_socket_addrs()
            .map_err(|_| HostError::Resolve(name.to_string()))?
            .map(|addr| addr.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| HostError::Resolve(name.to_string()))
    }

    pub fn parameters(&self) -> CellularParameters {
        self.link.lock().params.clone()
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInterface for HostNetwork {
    fn name(&self) -> &str {
        "host"
    }

    fn set_default_parameters(&self, params: &CellularParameters) {
        if params.apn.is_some() || params.sim_pin.is_some() {
            debug!("Cellular parameters have no effect on the host stack");
        }
        self.link.lock().params = params.clone();
    }

    fn attach(&self, callback: StatusCallback) {
        self.link.lock().callback = Some(Arc::from(callback));
    }

    fn set_blocking(&self, blocking: bool) -> std::result::Result<(), ErrorCode> {
        self.link.lock().blocking = blocking;
        Ok(())
    }

    fn connect(&self) -> std::result::Result<(), ErrorCode> {
        let (status, blocking) = {
            let inner = self.link.lock();
            (inner.status, inner.blocking)
        };
        if status == LinkStatus::GlobalUp {
            return Err(ErrorCode::IsConnected);
        }

        if !blocking {
            if let Ok(runtime) = Handle::try_current() {
                self.link.lock().status = LinkStatus::Connecting;
                let link = self.link.clone();
                let delay = self.link_delay;
                runtime.spawn(async move {
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    info!("Host link up");
                    link.set_status(LinkStatus::GlobalUp);
                });
                return Err(ErrorCode::InProgress);
            }
            debug!("No runtime for deferred link-up, connecting inline");
        }

        info!("Host link up");
        self.link.set_status(LinkStatus::GlobalUp);
        Ok(())
    }

    fn disconnect(&self) -> std::result::Result<(), ErrorCode> {
        if self.link.lock().status == LinkStatus::Disconnected {
            return Err(ErrorCode::NoConnection);
        }
        self.link.set_status(LinkStatus::Disconnected);
        Ok(())
    }

    fn connection_status(&self) -> LinkStatus {
        self.link.lock().status
    }

    fn gethostbyname(&self, name: &str) -> std::result::Result<IpAddr, ErrorCode> {
        self.resolve(name).map_err(|e| {
            debug!(host = %name, error = %e, "Resolution failed");
            e.code()
        })
    }
}
