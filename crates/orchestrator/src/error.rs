use cellular_core::SequencerPhase;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition {
        from: SequencerPhase,
        to: SequencerPhase,
    },

    #[error("Dispatcher queue is closed")]
    DispatcherClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl OrchestratorError {
    /// Create an invalid configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
