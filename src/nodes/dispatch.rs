//! Entry node: the director records the contract and hands it to the planner.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, StateUpdate};
use tracing::info;

pub(super) fn run(state: &ContractState, ctx: &NodeContext) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Director, Action::DispatchContract)?;

    info!(contract_id = %state.id, task = %task_headline(&state.task), "contract dispatched");

    let mut update = StateUpdate::default();
    let body = format!(
        "Priority: {:?}\nDepartment: {}\n\n{}",
        state.priority, state.department, state.task
    );
    update.record_mail(ctx.mailroom.send(
        Phase::Dispatch,
        Role::Planner,
        MessageType::Assignment,
        &format!("New contract: {}", task_headline(&state.task)),
        &body,
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}
