//! Typed error hierarchy for the mandate engine.
//!
//! Two top-level enums cover the two subsystems:
//! - `EngineError` — permission, phase-mapping, and orchestration failures
//! - `ApprovalError` — approval ledger state violations
//!
//! Route denials are deliberately *not* errors: the mailroom returns them as
//! data (`MailOutcome::Denied`) so they can be audited rather than thrown.

use crate::phase::Phase;
use crate::role::{Action, Role};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the orchestration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A role attempted an action outside its whitelist. Fatal to the call
    /// path that triggered it.
    #[error("Role {role} is not permitted to perform action {action}")]
    PermissionDenied { role: Role, action: Action },

    /// The current phase has no sender-role mapping. A defect in the phase
    /// table, never worked around at the call site.
    #[error("Phase {phase} has no sender role mapping")]
    UnknownPhase { phase: Phase },

    /// No checkpoint exists for the given contract.
    #[error("No checkpoint found for contract {contract_id}")]
    CheckpointMissing { contract_id: Uuid },

    /// A resume was requested for a contract that is not suspended at the
    /// approval gate.
    #[error("Contract {contract_id} is not awaiting an approval decision")]
    NotSuspended { contract_id: Uuid },

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the approval ledger.
///
/// These are fatal to the specific approve/reject call but never abort the
/// contract itself.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval request {id} not found")]
    NotFound { id: Uuid },

    #[error("Approval request {id} is already resolved")]
    AlreadyResolved { id: Uuid },

    #[error("Contract {contract_id} already has a pending approval request")]
    PendingExists { contract_id: Uuid },

    #[error("Rejection requires non-empty notes")]
    EmptyRejectionNotes,
}
