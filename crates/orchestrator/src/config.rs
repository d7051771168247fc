use cellular_core::{CellularParameters, RunMode, TransportKind, ECHO_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_ECHO_HOSTNAME: &str = "echo.mbedcloudtesting.com";
pub const DEFAULT_ECHO_PORT: u16 = 7;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LINK_WAIT_MS: u64 = 60_000;

/// Settings shared by every runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EchoConfig {
    /// Echo server hostname, ignored for non-IP transports
    pub hostname: String,
    /// Echo server port
    pub port: u16,
    pub transport: TransportKind,
    pub mode: RunMode,
    /// Bytes sent to the echo server; the receive buffer is sized to match
    pub payload: String,
    /// Socket timeout applied before any I/O
    pub timeout_ms: u64,
    /// Connect retries after the first attempt
    pub max_retries: u32,
    /// How often the progress indicator polls the link
    pub progress_interval_ms: u64,
    /// How long the stepped runner waits for link-up
    pub link_wait_ms: u64,
    /// Deadline on a pending non-blocking socket operation; defaults to `timeout_ms`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_deadline_ms: Option<u64>,
    pub cellular: CellularParameters,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_ECHO_HOSTNAME.to_string(),
            port: DEFAULT_ECHO_PORT,
            transport: TransportKind::default(),
            mode: RunMode::default(),
            payload: String::from_utf8_lossy(ECHO_PAYLOAD).into_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            link_wait_ms: DEFAULT_LINK_WAIT_MS,
            pending_deadline_ms: None,
            cellular: CellularParameters::default(),
        }
    }
}

impl EchoConfig {
    pub fn payload(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn link_wait(&self) -> Duration {
        Duration::from_millis(self.link_wait_ms)
    }

    pub fn pending_deadline(&self) -> Duration {
        Duration::from_millis(self.pending_deadline_ms.unwrap_or(self.timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.transport.needs_peer_address() && self.hostname.trim().is_empty() {
            return Err(OrchestratorError::config(format!(
                "{} transport needs an echo hostname",
                self.transport
            )));
        }
        if self.transport.needs_peer_address() && self.port == 0 {
            return Err(OrchestratorError::config("echo port must be non-zero"));
        }
        if self.payload.is_empty() {
            return Err(OrchestratorError::config("payload must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(OrchestratorError::config("timeout_ms must be non-zero"));
        }
        if self.progress_interval_ms == 0 {
            return Err(OrchestratorError::config(
                "progress_interval_ms must be non-zero",
            ));
        }
        Ok(())
    }
}
