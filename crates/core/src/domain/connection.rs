use serde::{Deserialize, Serialize};
use std::fmt;

use super::ErrorCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    AuthFailed,
    Lost,
    TimedOut,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AuthFailed => "auth_failed",
            Self::Lost => "lost",
            Self::TimedOut => "timed_out",
        }
    }

    /// Terminal state reached when a connect cycle gives up on `code`.
    pub fn from_failure(code: ErrorCode) -> Self {
        match code {
            ErrorCode::AuthFailure => Self::AuthFailed,
            ErrorCode::ConnectionTimeout | ErrorCode::Timeout => Self::TimedOut,
            ErrorCode::ConnectionLost => Self::Lost,
            _ => Self::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link status as reported by the network driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    LocalUp,
    GlobalUp,
    #[default]
    Disconnected,
    Connecting,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalUp => "local_up",
            Self::GlobalUp => "global_up",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, Self::LocalUp | Self::GlobalUp)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an asynchronous network status event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Connected,
    Disconnected,
    AuthFailed,
    Lost,
    TimedOut,
    Other,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::AuthFailed => "auth_failed",
            Self::Lost => "lost",
            Self::TimedOut => "timed_out",
            Self::Other => "other",
        }
    }

    /// Connection state implied by this class, if it implies one.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match self {
            Self::Connected => Some(ConnectionState::Connected),
            Self::Disconnected => Some(ConnectionState::Disconnected),
            Self::AuthFailed => Some(ConnectionState::AuthFailed),
            Self::Lost => Some(ConnectionState::Lost),
            Self::TimedOut => Some(ConnectionState::TimedOut),
            Self::Other => None,
        }
    }

    pub fn is_down(&self) -> bool {
        !matches!(self, Self::Connected | Self::Other)
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded count of connect attempts for one connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl RetryBudget {
    /// A budget allowing the first attempt plus `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: max_retries.saturating_add(1),
        }
    }

    pub fn reset(&mut self) {
        self.attempts_made = 0;
    }

    pub fn record_attempt(&mut self) {
        self.attempts_made += 1;
    }

    pub fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_made)
    }
}

/// Opaque credentials handed to the driver's `set_default_parameters`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellularParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plmn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_failure() {
        assert_eq!(
            ConnectionState::from_failure(ErrorCode::AuthFailure),
            ConnectionState::AuthFailed
        );
        assert_eq!(
            ConnectionState::from_failure(ErrorCode::ConnectionTimeout),
            ConnectionState::TimedOut
        );
        assert_eq!(
            ConnectionState::from_failure(ErrorCode::ConnectionLost),
            ConnectionState::Lost
        );
        assert_eq!(
            ConnectionState::from_failure(ErrorCode::NoConnection),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_retry_budget() {
        let mut budget = RetryBudget::new(2);
        assert_eq!(budget.max_attempts, 3);
        assert!(!budget.exhausted());

        budget.record_attempt();
        budget.record_attempt();
        assert_eq!(budget.remaining(), 1);
        budget.record_attempt();
        assert!(budget.exhausted());

        budget.reset();
        assert_eq!(budget.attempts_made, 0);
    }

    #[test]
    fn test_zero_retries_still_allows_one_attempt() {
        let mut budget = RetryBudget::new(0);
        assert!(!budget.exhausted());
        budget.record_attempt();
        assert!(budget.exhausted());
    }

    #[test]
    fn test_status_class_state() {
        assert_eq!(
            StatusClass::Lost.connection_state(),
            Some(ConnectionState::Lost)
        );
        assert_eq!(StatusClass::Other.connection_state(), None);
        assert!(StatusClass::TimedOut.is_down());
        assert!(!StatusClass::Connected.is_down());
        assert!(!StatusClass::Other.is_down());
    }

    #[test]
    fn test_link_status_up() {
        assert!(LinkStatus::GlobalUp.is_up());
        assert!(LinkStatus::LocalUp.is_up());
        assert!(!LinkStatus::Connecting.is_up());
    }
}
