use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes reported by network and socket drivers.
///
/// Numbering follows the conventional socket API layout, starting at
/// `-3001` for would-block. Codes a driver returns that are not listed
/// here are carried through as [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    WouldBlock,
    Unsupported,
    Parameter,
    NoConnection,
    NoSocket,
    NoAddress,
    NoMemory,
    NoSsid,
    DnsFailure,
    DhcpFailure,
    AuthFailure,
    DeviceError,
    InProgress,
    Already,
    IsConnected,
    ConnectionLost,
    ConnectionTimeout,
    AddressInUse,
    Timeout,
    Busy,
    Other(i32),
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::WouldBlock => -3001,
            Self::Unsupported => -3002,
            Self::Parameter => -3003,
            Self::NoConnection => -3004,
            Self::NoSocket => -3005,
            Self::NoAddress => -3006,
            Self::NoMemory => -3007,
            Self::NoSsid => -3008,
            Self::DnsFailure => -3009,
            Self::DhcpFailure => -3010,
            Self::AuthFailure => -3011,
            Self::DeviceError => -3012,
            Self::InProgress => -3013,
            Self::Already => -3014,
            Self::IsConnected => -3015,
            Self::ConnectionLost => -3016,
            Self::ConnectionTimeout => -3017,
            Self::AddressInUse => -3018,
            Self::Timeout => -3019,
            Self::Busy => -3020,
            Self::Other(code) => *code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -3001 => Self::WouldBlock,
            -3002 => Self::Unsupported,
            -3003 => Self::Parameter,
            -3004 => Self::NoConnection,
            -3005 => Self::NoSocket,
            -3006 => Self::NoAddress,
            -3007 => Self::NoMemory,
            -3008 => Self::NoSsid,
            -3009 => Self::DnsFailure,
            -3010 => Self::DhcpFailure,
            -3011 => Self::AuthFailure,
            -3012 => Self::DeviceError,
            -3013 => Self::InProgress,
            -3014 => Self::Already,
            -3015 => Self::IsConnected,
            -3016 => Self::ConnectionLost,
            -3017 => Self::ConnectionTimeout,
            -3018 => Self::AddressInUse,
            -3019 => Self::Timeout,
            -3020 => Self::Busy,
            other => Self::Other(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WouldBlock => "would_block",
            Self::Unsupported => "unsupported",
            Self::Parameter => "parameter",
            Self::NoConnection => "no_connection",
            Self::NoSocket => "no_socket",
            Self::NoAddress => "no_address",
            Self::NoMemory => "no_memory",
            Self::NoSsid => "no_ssid",
            Self::DnsFailure => "dns_failure",
            Self::DhcpFailure => "dhcp_failure",
            Self::AuthFailure => "auth_failure",
            Self::DeviceError => "device_error",
            Self::InProgress => "in_progress",
            Self::Already => "already",
            Self::IsConnected => "is_connected",
            Self::ConnectionLost => "connection_lost",
            Self::ConnectionTimeout => "connection_timeout",
            Self::AddressInUse => "address_in_use",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::Other(_) => "other",
        }
    }

    /// A non-blocking call has not finished yet. Not a failure.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::WouldBlock | Self::InProgress | Self::Already)
    }

    /// Retrying a connect after this code cannot succeed.
    pub fn is_terminal_for_connect(&self) -> bool {
        matches!(self, Self::AuthFailure)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

impl std::error::Error for ErrorCode {}
