use serde::{Deserialize, Serialize};
use std::fmt;

use super::ErrorCode;

/// Payload sent to the echo server; the server returns it byte-for-byte.
pub const ECHO_PAYLOAD: &[u8] = b"TEST";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionOutcome {
    #[default]
    Ok,
    OpenFailed,
    ResolveFailed,
    ConnectFailed,
    SendFailed,
    RecvFailed,
    /// Exchange succeeded but releasing the socket did not.
    CloseFailed,
}

impl TransactionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::OpenFailed => "open_failed",
            Self::ResolveFailed => "resolve_failed",
            Self::ConnectFailed => "connect_failed",
            Self::SendFailed => "send_failed",
            Self::RecvFailed => "recv_failed",
            Self::CloseFailed => "close_failed",
        }
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one echo transaction attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransactionResult {
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub outcome: TransactionOutcome,
    /// Driver code behind a failed outcome, when there was one.
    pub error: Option<ErrorCode>,
}

impl TransactionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, outcome: TransactionOutcome, error: Option<ErrorCode>) {
        self.outcome = outcome;
        self.error = error;
    }

    pub fn failed(outcome: TransactionOutcome, error: Option<ErrorCode>) -> Self {
        let mut result = Self::new();
        result.fail(outcome, error);
        result
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == TransactionOutcome::Ok
    }
}
