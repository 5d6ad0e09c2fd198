//! Escalation: the planner hands an unrecoverable contract back up.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, ProgressResult, StateUpdate};
use tracing::warn;

pub(super) fn run(state: &ContractState, ctx: &NodeContext) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Planner, Action::EscalateContract)?;

    let reason = escalation_reason(state);
    warn!(contract_id = %state.id, reason, "contract escalated");

    let mut update = StateUpdate {
        phase: Some(Phase::Escalated),
        escalated: Some(true),
        final_result: Some(format!("Escalated: {}", reason)),
        ..Default::default()
    };
    update.record_mail(ctx.mailroom.send(
        Phase::Escalation,
        Role::Director,
        MessageType::Escalation,
        &format!("Escalation: {}", task_headline(&state.task)),
        &format!(
            "Reason: {}\nAttempts used: {} of {}\n\nLast review report:\n{}",
            reason, state.attempt_count, state.max_attempts, state.review_report
        ),
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}

fn escalation_reason(state: &ContractState) -> String {
    if state.progress.last_result == Some(ProgressResult::Stuck) {
        "no progress after repeated checks".to_string()
    } else if state.ownership.accepted == Some(false) || state.ownership.accepted.is_none() {
        if state.verdict.is_some() {
            "retry budget exhausted".to_string()
        } else {
            "assignment could not be placed".to_string()
        }
    } else {
        "retry budget exhausted".to_string()
    }
}
