//! Effects produced by state transitions

use super::state::TurnId;
use crate::wire::ChatRequest;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the producer for a new turn (spawns as background task)
    OpenTransport { turn: TurnId, request: ChatRequest },

    /// Signal the running producer to stop
    AbortTransport { turn: TurnId },

    /// Publish the new state to observers
    PublishSnapshot,
}
