//! Planning node: decompose the task, build the instruction, and open the
//! ownership step.
//!
//! Planning never hands off to execution directly — the assignee must accept
//! the instruction first, so this node transitions to the acceptance step
//! with a recorded (advisory) response deadline.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, OwnershipState, ProgressState, StateUpdate};
use chrono::Utc;
use tracing::{debug, warn};

const SYSTEM: &str = "You are a planner decomposing a contract into concrete subtasks. \
Reply with one subtask per line, each starting with '- '. No preamble.";

pub(super) async fn run(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Planner, Action::PlanWork)?;

    let subtasks = match ctx
        .model
        .complete(Role::Planner, SYSTEM, &state.task, ctx.config.token_budget)
        .await
    {
        Ok(text) => {
            let parsed = parse_subtasks(&text);
            if parsed.is_empty() {
                vec![state.task.clone()]
            } else {
                parsed
            }
        }
        Err(e) => {
            // Planning degrades deterministically: the whole task becomes
            // the single subtask and execution proceeds.
            warn!(contract_id = %state.id, error = %e, "planner model failed, using single-subtask fallback");
            vec![state.task.clone()]
        }
    };
    debug!(contract_id = %state.id, count = subtasks.len(), "task decomposed");

    let instruction = build_instruction(state, &subtasks);

    let mut update = StateUpdate {
        subtasks: Some(subtasks),
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
        progress: Some(ProgressState {
            check_interval_secs: ctx.config.progress_check_interval.map(|d| d.as_secs()),
            check_count: 0,
            max_checks: ctx.config.max_progress_checks,
            last_check_at: None,
            last_result: None,
        }),
        ..Default::default()
    };

    update.record_mail(ctx.mailroom.send(
        Phase::Planning,
        Role::Executor,
        MessageType::Instruction,
        &format!("Assignment: {}", task_headline(&state.task)),
        &instruction,
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}

fn parse_subtasks(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    line.split_once(". ")
                        .filter(|(n, _)| n.chars().all(|c| c.is_ascii_digit()))
                        .map(|(_, rest)| rest)
                })?;
            let item = item.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

fn build_instruction(state: &ContractState, subtasks: &[String]) -> String {
    let listed = subtasks
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Contract: {}\nPriority: {:?} | Department: {}\n\nSubtasks:\n{}",
        state.task, state.priority, state.department, listed
    )
}
