use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
    /// Connectionless path routed by the network's control plane.
    NonIp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::NonIp => "non_ip",
        }
    }

    /// Label used in status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
            Self::NonIp => "CellularNonIP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "udp" => Some(Self::Udp),
            "tcp" => Some(Self::Tcp),
            "non_ip" | "nonip" | "non-ip" => Some(Self::NonIp),
            _ => None,
        }
    }

    pub fn is_connection_oriented(&self) -> bool {
        matches!(self, Self::Tcp)
    }

    pub fn needs_peer_address(&self) -> bool {
        !matches!(self, Self::NonIp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransportKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownTransport(s.to_string()))
    }
}
