//! Internal mail with audit-logged route enforcement.
//!
//! [`Mailroom::send`] derives the sender role solely from the current phase,
//! checks the route against the permission matrix, and returns either a
//! [`MailMessage`] or a [`MailRejection`] — both are valid, auditable
//! outcomes. Authorization never throws here; the only error path is an
//! unmapped phase, which is a configuration defect.

use crate::errors::EngineError;
use crate::phase::{resolve_sender_role, Phase};
use crate::role::{PermissionMatrix, Role, RouteCheck};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classification of internal messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Assignment,
    Instruction,
    Acceptance,
    Rejection,
    StatusReport,
    ReviewReport,
    Escalation,
    Notification,
}

/// A delivered message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: Role,
    pub to: Role,
    pub message_type: MessageType,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// A denied send attempt. Audit-only, never discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailRejection {
    pub attempted_from: Role,
    pub attempted_to: Role,
    pub message_type: MessageType,
    pub reason: String,
    pub denied_at: DateTime<Utc>,
}

/// Outcome of a send attempt.
#[derive(Debug, Clone)]
pub enum MailOutcome {
    Sent(MailMessage),
    Denied(MailRejection),
}

impl MailOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }

    pub fn message(&self) -> Option<&MailMessage> {
        match self {
            Self::Sent(msg) => Some(msg),
            Self::Denied(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&MailRejection> {
        match self {
            Self::Denied(rej) => Some(rej),
            Self::Sent(_) => None,
        }
    }
}

/// Sends internal mail with sender identity derived from the phase.
#[derive(Debug, Clone)]
pub struct Mailroom {
    matrix: PermissionMatrix,
}

impl Mailroom {
    pub fn new(matrix: PermissionMatrix) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    /// Attempt to send a message from the role executing `phase` to `to`.
    ///
    /// `claimed_sender` exists only as an impersonation defense: if a caller
    /// supplies one it is ignored and logged, and the sender is still derived
    /// from the phase table.
    pub fn send(
        &self,
        phase: Phase,
        to: Role,
        message_type: MessageType,
        subject: &str,
        body: &str,
        claimed_sender: Option<Role>,
    ) -> Result<MailOutcome, EngineError> {
        let from = resolve_sender_role(phase)?;

        if let Some(claimed) = claimed_sender {
            warn!(
                phase = %phase,
                derived = %from,
                claimed = %claimed,
                "ignoring caller-supplied sender identity"
            );
        }

        match self.matrix.check_route(from, to) {
            RouteCheck::Allowed => {
                debug!(%from, %to, ?message_type, subject, "mail sent");
                Ok(MailOutcome::Sent(MailMessage {
                    from,
                    to,
                    message_type,
                    subject: subject.to_string(),
                    body: body.to_string(),
                    sent_at: Utc::now(),
                }))
            }
            RouteCheck::Denied(reason) => {
                warn!(%from, %to, ?message_type, reason, "mail denied");
                Ok(MailOutcome::Denied(MailRejection {
                    attempted_from: from,
                    attempted_to: to,
                    message_type,
                    reason,
                    denied_at: Utc::now(),
                }))
            }
        }
    }
}
