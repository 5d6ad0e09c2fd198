//! The final approval gate.
//!
//! Check-before-act on the ledger record: re-entry from a checkpoint or a
//! resume callback first consults the ledger and acts on the recorded
//! resolution, so the gate is safe to re-run and never double-creates a
//! request. Automatic approvers decide inline; a human approver suspends the
//! contract until the decision callback arrives.
//!
//! Rejection semantics differ by approver kind: a human rejection is a
//! deliberate terminal verdict, an automatic rejection feeds its notes back
//! into another attempt while budget remains.

use super::{task_headline, NodeContext, NodeOutcome};
use crate::approval::{ApprovalRequest, ApprovalStatus, ApproverKind};
use crate::collab::{parse_marker, remainder, ApprovalNotification};
use crate::errors::EngineError;
use crate::mail::MessageType;
use crate::phase::Phase;
use crate::role::{Action, Role};
use crate::state::{ApprovalState, ContractState, ProgressState, StateUpdate};
use tracing::{info, warn};

const MARKERS: &[&str] = &["APPROVE", "REJECT"];

const SYSTEM: &str = "You are the director deciding whether to approve a completed contract. \
First line: APPROVE or REJECT. If rejecting, state your reasons on the following lines.";

const AMBIGUOUS_NOTES: &str = "approval decision could not be determined";

pub(super) async fn run(
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Director, Action::ApproveContract)?;

    if let Some(id) = state.approval.request_id {
        if let Some(request) = ctx.ledger.get(id).await {
            return match request.status {
                // Crash recovery re-entry while still awaiting the decision.
                ApprovalStatus::Pending => Ok(NodeOutcome::suspend(StateUpdate::default())),
                ApprovalStatus::Approved => Ok(NodeOutcome::advance(finalize(state, ctx, &request)?)),
                ApprovalStatus::Rejected => rejected(state, ctx, &request),
            };
        }
        warn!(contract_id = %state.id, request_id = %id, "approval record missing from ledger, opening a fresh request");
    }

    let request = ApprovalRequest::new(
        state.id,
        &format!("Approval: {}", task_headline(&state.task)),
        &format!(
            "Task:\n{}\n\nDeliverable:\n{}\n\nReview report:\n{}",
            state.task, state.output, state.review_report
        ),
        ctx.config.approver,
        &ctx.config.approver_id,
        ctx.config.cc.clone(),
    );
    let request = ctx.ledger.create(request).await?;

    match ctx.config.approver {
        ApproverKind::Human => {
            let notification = ApprovalNotification {
                approver_id: request.approver_id.clone(),
                request_id: request.id,
                contract_id: state.id,
                title: request.title.clone(),
                summary: request.summary.clone(),
                cc: request.cc.clone(),
            };
            if let Err(e) = ctx.notifier.notify(&notification).await {
                // The request stays pending; the approver can still find it
                // in the ledger.
                warn!(contract_id = %state.id, error = %e, "approval notification failed");
            }
            info!(contract_id = %state.id, request_id = %request.id, "suspending for human approval");

            let mut update = StateUpdate {
                approval: Some(ApprovalState {
                    request_id: Some(request.id),
                    status: Some(ApprovalStatus::Pending),
                    rejection_notes: state.approval.rejection_notes.clone(),
                    approver: ApproverKind::Human,
                    approver_id: request.approver_id.clone(),
                    cc: request.cc.clone(),
                }),
                ..Default::default()
            };
            update.record_mail(ctx.mailroom.send(
                Phase::FinalApproval,
                Role::Planner,
                MessageType::Notification,
                &format!("Awaiting approval: {}", task_headline(&state.task)),
                &format!("Approval requested from {}.", request.approver_id),
                None,
            )?);
            Ok(NodeOutcome::suspend(update))
        }
        ApproverKind::Automatic => {
            let answer = ctx
                .model
                .complete(
                    Role::Director,
                    SYSTEM,
                    &request.summary,
                    ctx.config.token_budget,
                )
                .await;
            let decision = match answer {
                Ok(text) => match parse_marker(&text, MARKERS) {
                    Some("APPROVE") => None,
                    Some("REJECT") => {
                        let notes = remainder(&text);
                        Some(if notes.is_empty() {
                            "rejected without stated reasons".to_string()
                        } else {
                            notes
                        })
                    }
                    _ => {
                        warn!(contract_id = %state.id, "unparseable approval answer, rejecting");
                        Some(AMBIGUOUS_NOTES.to_string())
                    }
                },
                Err(e) => {
                    warn!(contract_id = %state.id, error = %e, "approver call failed, rejecting");
                    Some(AMBIGUOUS_NOTES.to_string())
                }
            };

            match decision {
                None => {
                    let request = ctx
                        .ledger
                        .approve(request.id, &ctx.config.approver_id)
                        .await?;
                    Ok(NodeOutcome::advance(finalize(state, ctx, &request)?))
                }
                Some(notes) => {
                    let request = ctx
                        .ledger
                        .reject(request.id, &ctx.config.approver_id, &notes)
                        .await?;
                    rejected(state, ctx, &request)
                }
            }
        }
    }
}

/// Close out an approved contract.
fn finalize(
    state: &ContractState,
    ctx: &NodeContext,
    request: &ApprovalRequest,
) -> Result<StateUpdate, EngineError> {
    ctx.mailroom
        .matrix()
        .check_action(Role::Director, Action::CloseContract)?;
    info!(contract_id = %state.id, request_id = %request.id, "contract approved");

    let mut update = StateUpdate {
        phase: Some(Phase::Completed),
        approved: Some(true),
        final_result: Some(state.output.clone()),
        approval: Some(mirror(state, request)),
        ..Default::default()
    };
    update.record_mail(ctx.mailroom.send(
        Phase::FinalApproval,
        Role::Planner,
        MessageType::Notification,
        &format!("Approved: {}", task_headline(&state.task)),
        "The contract is approved and closed.",
        None,
    )?);
    Ok(update)
}

fn rejected(
    state: &ContractState,
    ctx: &NodeContext,
    request: &ApprovalRequest,
) -> Result<NodeOutcome, EngineError> {
    let notes = request
        .rejection_notes
        .clone()
        .unwrap_or_else(|| "rejected".to_string());

    match request.approver {
        ApproverKind::Human => {
            info!(contract_id = %state.id, request_id = %request.id, "human rejection, closing contract");
            let mut update = StateUpdate {
                phase: Some(Phase::Rejected),
                approval: Some(mirror(state, request)),
                ..Default::default()
            };
            update.record_mail(ctx.mailroom.send(
                Phase::FinalApproval,
                Role::Planner,
                MessageType::Notification,
                &format!("Rejected: {}", task_headline(&state.task)),
                &notes,
                None,
            )?);
            Ok(NodeOutcome::advance(update))
        }
        ApproverKind::Automatic => {
            let mut update = StateUpdate::default();
            if state.attempts_remaining() {
                info!(contract_id = %state.id, "automatic rejection, re-entering the retry cycle");
                // Clear the request so the next gate crossing opens a new
                // one; the notes survive as feedback for the rework. The
                // retry execution consumes the attempt.
                update.approval = Some(ApprovalState {
                    request_id: None,
                    status: None,
                    rejection_notes: Some(notes.clone()),
                    approver: request.approver,
                    approver_id: request.approver_id.clone(),
                    cc: request.cc.clone(),
                });
                update.progress = Some(ProgressState {
                    check_count: 0,
                    last_check_at: None,
                    last_result: None,
                    ..state.progress.clone()
                });
            } else {
                warn!(contract_id = %state.id, "automatic rejection with no attempt budget left");
                update.approval = Some(mirror(state, request));
            }
            update.record_mail(ctx.mailroom.send(
                Phase::FinalApproval,
                Role::Planner,
                MessageType::Notification,
                &format!("Approval rejected: {}", task_headline(&state.task)),
                &notes,
                None,
            )?);
            Ok(NodeOutcome::advance(update))
        }
    }
}

/// The approval sub-state as recorded in the ledger.
fn mirror(state: &ContractState, request: &ApprovalRequest) -> ApprovalState {
    ApprovalState {
        request_id: Some(request.id),
        status: Some(request.status),
        rejection_notes: request
            .rejection_notes
            .clone()
            .or_else(|| state.approval.rejection_notes.clone()),
        approver: request.approver,
        approver_id: request.approver_id.clone(),
        cc: request.cc.clone(),
    }
}
