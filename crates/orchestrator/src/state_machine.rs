use cellular_core::SequencerPhase;

use crate::error::{OrchestratorError, Result};

/// Transition table for the non-blocking sequencer.
pub struct PhaseMachine;

impl PhaseMachine {
    pub fn validate_transition(from: &SequencerPhase, to: &SequencerPhase) -> Result<()> {
        if Self::allowed_transitions(from).contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: *from,
                to: *to,
            })
        }
    }

    pub fn allowed_transitions(from: &SequencerPhase) -> &'static [SequencerPhase] {
        match from {
            SequencerPhase::Init => &[SequencerPhase::Connecting],
            SequencerPhase::Connecting => &[SequencerPhase::EvaluateConnect],
            SequencerPhase::EvaluateConnect => {
                &[SequencerPhase::Transacting, SequencerPhase::Teardown]
            }
            SequencerPhase::Transacting => &[SequencerPhase::EvaluateTransact],
            SequencerPhase::EvaluateTransact => &[SequencerPhase::Teardown],
            SequencerPhase::Teardown => &[SequencerPhase::Report],
            SequencerPhase::Report => &[SequencerPhase::Done],
            SequencerPhase::Done => &[],
        }
    }

    pub fn can_transition(from: &SequencerPhase, to: &SequencerPhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// Next phase on the success path.
    pub fn next_phase(current: &SequencerPhase) -> Option<SequencerPhase> {
        Self::allowed_transitions(current).first().copied()
    }
}
