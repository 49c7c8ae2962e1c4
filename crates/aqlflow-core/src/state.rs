//! The tri-state execution protocol.

use serde::{Deserialize, Serialize};

/// Outcome tag of every fetch/produce call.
///
/// - `Waiting`: nothing could be supplied now; retry the identical request.
/// - `HasMore`: progress was made and more may follow.
/// - `Done`: no further output will ever be produced (for this subquery run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    Waiting,
    HasMore,
    Done,
}

impl ExecutionState {
    pub fn is_waiting(self) -> bool {
        self == ExecutionState::Waiting
    }

    pub fn is_done(self) -> bool {
        self == ExecutionState::Done
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionState::Waiting => "WAITING",
            ExecutionState::HasMore => "HASMORE",
            ExecutionState::Done => "DONE",
        };
        f.write_str(s)
    }
}
