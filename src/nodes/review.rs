//! Independent review and the planner's verdict handling.
//!
//! The reviewer answers with a PASS/FAIL marker line followed by a report.
//! Anything that does not parse as a marker fails closed: unreviewable work
//! is never promoted toward final approval.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::collab::{parse_marker, remainder};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ContractState, ProgressState, StateUpdate, Verdict};
use tracing::{info, warn};

const MARKERS: &[&str] = &["PASS", "FAIL"];

const SYSTEM: &str = "You are an independent reviewer. Evaluate the deliverable against the \
original task. First line: PASS or FAIL. Then a short report explaining the verdict.";

pub(super) async fn run(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Reviewer, Action::ReviewOutput)?;

    let prompt = format!(
        "Task:\n{}\n\nDeliverable:\n{}",
        state.task, state.output
    );
    let answer = ctx
        .model
        .complete(Role::Reviewer, SYSTEM, &prompt, ctx.config.token_budget)
        .await;

    let (verdict, report) = match answer {
        Ok(text) => match parse_marker(&text, MARKERS) {
            Some("PASS") => (Verdict::Pass, remainder(&text)),
            Some("FAIL") => (Verdict::Fail, remainder(&text)),
            _ => {
                warn!(contract_id = %state.id, "unparseable review verdict, failing closed");
                (
                    Verdict::Fail,
                    "review verdict could not be determined".to_string(),
                )
            }
        },
        Err(e) => {
            warn!(contract_id = %state.id, error = %e, "reviewer call failed, failing closed");
            (Verdict::Fail, "reviewer was unavailable".to_string())
        }
    };
    info!(contract_id = %state.id, ?verdict, "review complete");

    let mut update = StateUpdate {
        verdict: Some(verdict),
        review_report: Some(report.clone()),
        ..Default::default()
    };
    update.record_mail(ctx.mailroom.send(
        Phase::Review,
        Role::Planner,
        MessageType::ReviewReport,
        &format!(
            "Review {}: {}",
            if verdict.passed() { "passed" } else { "failed" },
            task_headline(&state.task)
        ),
        &report,
        None,
    )?);

    Ok(NodeOutcome::advance(update))
}

/// The planner acts on the verdict: promote a pass toward final approval,
/// spend an attempt on a fail, or flag for escalation when the budget is gone.
pub(super) fn decision(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Planner, Action::EvaluateReview)?;

    let mut update = StateUpdate::default();
    match state.verdict {
        Some(Verdict::Pass) => {
            update.record_mail(ctx.mailroom.send(
                Phase::ReviewDecision,
                Role::Director,
                MessageType::Notification,
                &format!("Ready for approval: {}", task_headline(&state.task)),
                &format!("Review passed.\n\n{}", state.review_report),
                None,
            )?);
        }
        _ => {
            if state.attempts_remaining() {
                info!(
                    contract_id = %state.id,
                    attempts_used = state.attempt_count,
                    max_attempts = state.max_attempts,
                    "review failed, re-dispatching for another attempt"
                );
                // Re-arm the progress check cycle for the fresh attempt.
                update.progress = Some(ProgressState {
                    check_count: 0,
                    last_check_at: None,
                    last_result: None,
                    ..state.progress.clone()
                });
                update.record_mail(ctx.mailroom.send(
                    Phase::ReviewDecision,
                    Role::Executor,
                    MessageType::Instruction,
                    &format!("Rework required: {}", task_headline(&state.task)),
                    &format!("The review failed:\n{}", state.review_report),
                    None,
                )?);
            } else {
                warn!(
                    contract_id = %state.id,
                    attempts = state.attempt_count,
                    "review failed with no attempt budget left"
                );
            }
        }
    }

    Ok(NodeOutcome::advance(update))
}
