//! Execution node and the planner's periodic progress check.
//!
//! Each real execution consumes one unit of the attempt budget. Execution is
//! idempotent within an attempt: re-entry after an on-track progress check
//! finds output already present and only reports status, so the check loop
//! cannot re-run the work or spin forever. A stuck check with budget left
//! instead grants the executor a real re-run before the next check; the
//! final stuck check forces escalation. Each fresh attempt clears
//! `progress.last_result`, which re-arms both the real execution and the
//! check.
//!
//! A model failure here is a failed attempt, never a crash: the attempt is
//! consumed, the output stays empty, and the normal review/retry cycle
//! absorbs it.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, ProgressResult, ProgressState, StateUpdate, Verdict};
use chrono::Utc;
use tracing::{info, warn};

const SYSTEM: &str = "You are carrying out an assigned work instruction. Produce the complete \
deliverable as plain text. Do not ask questions.";

pub(super) async fn run(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Executor, Action::ExecuteWork)?;

    // Re-entry after a progress check found work already produced.
    if !state.output.is_empty() && state.progress.last_result.is_some() {
        ctx.mailroom
            .matrix()
            .check_action(Role::Executor, Action::ReportStatus)?;
        let mut update = StateUpdate::default();
        update.record_mail(ctx.mailroom.send(
            Phase::Execution,
            Role::Planner,
            MessageType::StatusReport,
            &format!("Status: {}", task_headline(&state.task)),
            "Deliverable ready for review.",
            None,
        )?);
        return Ok(NodeOutcome::advance(update));
    }

    // The reassignment cycle may already have spent the whole budget before
    // the assignment was finally accepted.
    let attempt_increment = u32::from(state.attempts_remaining());

    let prompt = build_prompt(state);
    let (output, body) = match ctx
        .model
        .complete(Role::Executor, SYSTEM, &prompt, ctx.config.token_budget)
        .await
    {
        Ok(text) => {
            info!(
                contract_id = %state.id,
                attempt = state.attempt_count + attempt_increment,
                "work produced"
            );
            (text.clone(), text)
        }
        Err(e) => {
            warn!(contract_id = %state.id, error = %e, "executor model failed, counting a failed attempt");
            (String::new(), format!("Execution failed: {}", e))
        }
    };

    let mut update = StateUpdate {
        output: Some(output),
        attempt_increment,
        ..Default::default()
    };
    update.record_mail(ctx.mailroom.send(
        Phase::Execution,
        Role::Planner,
        MessageType::StatusReport,
        &format!("Completed: {}", task_headline(&state.task)),
        &body,
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}

/// One progress check by the planner: output present means on track, an
/// empty output means stuck. The check budget forces the escalated flag when
/// it runs out.
pub(super) fn progress_check(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Planner, Action::MonitorProgress)?;

    let checks = state.progress.check_count + 1;
    let result = if state.output.is_empty() {
        ProgressResult::Stuck
    } else {
        ProgressResult::OnTrack
    };
    let forced = result == ProgressResult::Stuck && checks >= state.progress.max_checks;
    if forced {
        warn!(
            contract_id = %state.id,
            checks,
            max_checks = state.progress.max_checks,
            "no output after final progress check, forcing escalation"
        );
    }
    info!(contract_id = %state.id, checks, ?result, "progress check recorded");

    let mut update = StateUpdate {
        escalated: forced.then_some(true),
        progress: Some(ProgressState {
            check_count: checks,
            last_check_at: Some(Utc::now()),
            last_result: Some(result),
            ..state.progress.clone()
        }),
        ..Default::default()
    };
    update.record_mail(ctx.mailroom.send(
        Phase::ProgressCheck,
        Role::Executor,
        MessageType::StatusReport,
        &format!(
            "Progress check {} of {}: {}",
            checks,
            state.progress.max_checks,
            match result {
                ProgressResult::OnTrack => "on track",
                ProgressResult::Stuck => "stuck",
            }
        ),
        "Checking in on the current assignment.",
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}

fn build_prompt(state: &ContractState) -> String {
    let mut prompt = state.instruction.clone();
    if state.verdict == Some(Verdict::Fail) && !state.review_report.is_empty() {
        prompt.push_str(&format!(
            "\n\nThe previous attempt failed review:\n{}\nAddress every point.",
            state.review_report
        ));
    }
    if let Some(notes) = &state.approval.rejection_notes {
        prompt.push_str(&format!(
            "\n\nThe previous attempt was rejected at final approval:\n{}",
            notes
        ));
    }
    prompt
}
