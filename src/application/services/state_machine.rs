use crate::domain::entities::CallStatus;
use crate::domain::errors::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: CallStatus, to: CallStatus },
}

impl From<TransitionError> for DispatchError {
    fn from(err: TransitionError) -> Self {
        DispatchError::InvalidState(err.to_string())
    }
}

/// Validates if a call lifecycle transition is allowed.
///
/// Every dispatcher mutation goes through this table; there is no other place
/// where a call status changes. Terminal states (ended, missed, busy) have no
/// outgoing transitions, which is what turns "end an already-ended call" into
/// an invalid-state error instead of a silent no-op.
pub fn validate_transition(from: CallStatus, to: CallStatus) -> Result<(), TransitionError> {
    use CallStatus::*;

    match (from, to) {
        // Assignment and rejection out of the initial state
        (Incoming, Ringing) => Ok(()),
        (Incoming, Missed) => Ok(()),
        (Incoming, Busy) => Ok(()),
        (Incoming, Ended) => Ok(()),

        // Ring outcomes: answer, timeout, caller hang-up
        (Ringing, Connected) => Ok(()),
        (Ringing, Missed) => Ok(()),
        (Ringing, Busy) => Ok(()),
        (Ringing, Ended) => Ok(()),

        // In-call flow
        (Connected, OnHold) => Ok(()),
        (OnHold, Connected) => Ok(()),
        (Connected, Transferred) => Ok(()),
        (OnHold, Transferred) => Ok(()),
        (Transferred, Connected) => Ok(()),
        (Connected, Ended) => Ok(()),
        (OnHold, Ended) => Ok(()),
        (Transferred, Ended) => Ok(()),

        // All other transitions are invalid
        _ => Err(TransitionError::InvalidTransition { from, to }),
    }
}
