//! Event types for the cellular echo event system

use cellular_core::{
    ConnectionState, ErrorCode, LinkStatus, SequencerPhase, StatusClass, TransactionResult,
    TransportKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position in the publishing bus's stream, starting at 0
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(sequence: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Connect events
    /// One connect attempt finished; `error` is `None` on success
    #[serde(rename = "connect.attempt")]
    ConnectAttempt {
        attempt: u32,
        max_attempts: u32,
        error: Option<ErrorCode>,
    },

    /// Periodic link poll while a blocking connect is in flight
    #[serde(rename = "connect.progress")]
    ConnectProgress { link: LinkStatus },

    /// Connect cycle finished
    #[serde(rename = "connect.finished")]
    ConnectFinished {
        state: ConnectionState,
        attempts: u32,
    },

    /// Status observer classified a driver event
    #[serde(rename = "link.status_changed")]
    LinkStatusChanged { class: StatusClass },

    // Sequencer events
    /// Sequencer entered a phase
    #[serde(rename = "phase.entered")]
    PhaseEntered { phase: SequencerPhase },

    // Transaction events
    /// Echo transaction finished
    #[serde(rename = "transaction.finished")]
    TransactionFinished {
        transport: TransportKind,
        result: TransactionResult,
    },

    /// Network disconnect finished; `error` is `None` on success
    #[serde(rename = "network.disconnected")]
    Disconnected { error: Option<ErrorCode> },

    // System events
    /// Whole run finished
    #[serde(rename = "run.finished")]
    RunFinished { success: bool },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}
