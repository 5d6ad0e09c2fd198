//! The closed set of contract phases and the phase → sender-role table.
//!
//! The table in [`resolve_sender_role`] is the *only* source of sender
//! identity for outgoing mail. A component executing in phase P can never
//! produce a message whose sender differs from the role mapped to P,
//! regardless of what identity a caller attempts to supply.

use crate::errors::EngineError;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every phase a contract can be in. Terminal phases have no sender-role
/// mapping and accept no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Dispatch,
    Planning,
    Acceptance,
    Reassign,
    Execution,
    ProgressCheck,
    Review,
    ReviewDecision,
    FinalApproval,
    Escalation,
    Completed,
    Escalated,
    Rejected,
}

impl Phase {
    /// Whether this phase accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Escalated | Self::Rejected)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dispatch => "dispatch",
            Self::Planning => "planning",
            Self::Acceptance => "acceptance",
            Self::Reassign => "reassign",
            Self::Execution => "execution",
            Self::ProgressCheck => "progress_check",
            Self::Review => "review",
            Self::ReviewDecision => "review_decision",
            Self::FinalApproval => "final_approval",
            Self::Escalation => "escalation",
            Self::Completed => "completed",
            Self::Escalated => "escalated",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Derive the sender role for a phase.
///
/// Terminal phases send no mail; asking for their sender is a programming
/// defect surfaced as `UnknownPhase`, never a silent default.
pub fn resolve_sender_role(phase: Phase) -> Result<Role, EngineError> {
    match phase {
        Phase::Dispatch | Phase::FinalApproval => Ok(Role::Director),
        Phase::Planning
        | Phase::Reassign
        | Phase::ProgressCheck
        | Phase::ReviewDecision
        | Phase::Escalation => Ok(Role::Planner),
        Phase::Acceptance | Phase::Execution => Ok(Role::Executor),
        Phase::Review => Ok(Role::Reviewer),
        Phase::Completed | Phase::Escalated | Phase::Rejected => {
            Err(EngineError::UnknownPhase { phase })
        }
    }
}
