//! Pipeline lock as an explicit state machine.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Assembling,
    Sending,
}

impl PipelineState {
    pub fn is_idle(self) -> bool {
        self == PipelineState::Idle
    }

    pub fn on(self, event: PipelineEvent) -> Result<Self, TransitionError> {
        use PipelineEvent::*;
        use PipelineState::*;

        match (self, event) {
            (Idle, BatchReady) => Ok(Assembling),
            (Assembling, ArchiveBuilt) => Ok(Sending),
            (Assembling, NothingToPush | AssemblyFailed) => Ok(Idle),
            (Sending, TargetsReported) => Ok(Idle),
            (Assembling | Sending, CycleAborted) => Ok(Idle),
            (state, event) => Err(TransitionError { state, event }),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Assembling => "assembling",
            PipelineState::Sending => "sending",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Queued paths were taken for a new cycle.
    BatchReady,
    ArchiveBuilt,
    /// Every path was filtered out; nothing was written.
    NothingToPush,
    AssemblyFailed,
    /// Every target returned a result.
    TargetsReported,
    /// The cycle task ended without finishing.
    CycleAborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid pipeline transition: {event:?} while {state}")]
pub struct TransitionError {
    pub state: PipelineState,
    pub event: PipelineEvent,
}
