//! The ownership step and its retry handler.
//!
//! The assignee must explicitly accept or reject the instruction before any
//! work begins. Rejection requires a reason; an ambiguous answer counts as
//! no response, and no response routes exactly like rejection.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::collab::{parse_marker, remainder};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, OwnershipState, StateUpdate};
use chrono::Utc;
use tracing::{info, warn};

const MARKERS: &[&str] = &["ACCEPT", "REJECT"];

const SYSTEM: &str = "You are the assignee of a work instruction. Decide whether to take \
ownership. First line: ACCEPT or REJECT. If rejecting, state your reason on the following lines.";

const NO_REASON: &str = "assignment declined without a stated reason";

pub(super) async fn accept_or_reject(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Executor, Action::AcceptAssignment)?;

    let answer = ctx
        .model
        .complete(
            Role::Executor,
            SYSTEM,
            &state.instruction,
            ctx.config.token_budget,
        )
        .await;

    let mut update = StateUpdate::default();
    match answer {
        Ok(text) => match parse_marker(&text, MARKERS) {
            Some("ACCEPT") => {
                info!(contract_id = %state.id, "assignment accepted");
                update.ownership = Some(OwnershipState {
                    accepted: Some(true),
                    rejection_reason: None,
                    acceptance_deadline: state.ownership.acceptance_deadline,
                });
                update.record_mail(ctx.mailroom.send(
                    Phase::Acceptance,
                    Role::Planner,
                    MessageType::Acceptance,
                    &format!("Accepted: {}", task_headline(&state.task)),
                    "Taking ownership of the assignment.",
                    None,
                )?);
            }
            Some("REJECT") => {
                let mut reason = remainder(&text);
                if reason.is_empty() {
                    reason = NO_REASON.to_string();
                }
                info!(contract_id = %state.id, reason, "assignment rejected");
                update.ownership = Some(OwnershipState {
                    accepted: Some(false),
                    rejection_reason: Some(reason.clone()),
                    acceptance_deadline: state.ownership.acceptance_deadline,
                });
                update.record_mail(ctx.mailroom.send(
                    Phase::Acceptance,
                    Role::Planner,
                    MessageType::Rejection,
                    &format!("Rejected: {}", task_headline(&state.task)),
                    &reason,
                    None,
                )?);
            }
            _ => {
                // Ambiguous answer: treat as no response, which routes the
                // same as an explicit rejection.
                warn!(contract_id = %state.id, "ambiguous acceptance answer, treating as no response");
            }
        },
        Err(e) => {
            warn!(contract_id = %state.id, error = %e, "acceptance call failed, treating as no response");
        }
    }

    Ok(NodeOutcome::advance(update))
}

/// Handle rejection or non-response: rebuild and resend the instruction
/// while attempts remain, otherwise flag for escalation.
pub(super) fn reassign(state: &ContractState, ctx: &NodeContext) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Planner, Action::AssignWork)?;

    if !state.attempts_remaining() {
        info!(
            contract_id = %state.id,
            attempts = state.attempt_count,
            "reassignment budget exhausted, escalating"
        );
        return Ok(NodeOutcome::advance(StateUpdate {
            escalated: Some(true),
            ..Default::default()
        }));
    }

    let mut instruction = state.instruction.clone();
    if let Some(reason) = &state.ownership.rejection_reason {
        instruction.push_str(&format!(
            "\n\nPrevious assignment was rejected: {}\nThe planner has re-issued it; \
please reconsider or state a blocking constraint.",
            reason
        ));
    }

    let mut update = StateUpdate {
        attempt_increment: 1,
        instruction: Some(instruction.clone()),
        ownership: Some(OwnershipState {
            accepted: None,
            rejection_reason: None,
            acceptance_deadline: Some(
                Utc::now()
                    + chrono::Duration::from_std(ctx.config.acceptance_window)
                        .unwrap_or_else(|_| chrono::Duration::zero()),
            ),
        }),
        ..Default::default()
    };

    update.record_mail(ctx.mailroom.send(
        Phase::Reassign,
        Role::Executor,
        MessageType::Instruction,
        &format!(
            "Re-assignment ({} of {}): {}",
            state.attempt_count + 1,
            state.max_attempts,
            task_headline(&state.task)
        ),
        &instruction,
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}
