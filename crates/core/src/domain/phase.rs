use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Phases of the non-blocking sequencer, in visiting order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum SequencerPhase {
    #[default]
    Init,
    Connecting,
    EvaluateConnect,
    Transacting,
    EvaluateTransact,
    Teardown,
    Report,
    Done,
}

impl SequencerPhase {
    pub const ALL: [SequencerPhase; 8] = [
        Self::Init,
        Self::Connecting,
        Self::EvaluateConnect,
        Self::Transacting,
        Self::EvaluateTransact,
        Self::Teardown,
        Self::Report,
        Self::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::EvaluateConnect => "evaluate_connect",
            Self::Transacting => "transacting",
            Self::EvaluateTransact => "evaluate_transact",
            Self::Teardown => "teardown",
            Self::Report => "report",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for SequencerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which driver for the connect → transact → disconnect sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Retrying blocking connect, then a blocking transaction.
    #[default]
    Blocking,
    /// Non-blocking connect gated on a link-up signal, then a blocking transaction.
    Stepped,
    /// Message-driven sequencer with non-blocking sockets.
    Async,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Stepped => "stepped",
            Self::Async => "async",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blocking" => Some(Self::Blocking),
            "stepped" => Some(Self::Stepped),
            "async" => Some(Self::Async),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownMode(s.to_string()))
    }
}
