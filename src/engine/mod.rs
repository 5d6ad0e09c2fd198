//! The orchestrator core: the interpreter loop over the node graph.
//!
//! `Engine` owns nothing durable itself. The model client, notifier,
//! checkpoint store, and approval ledger are constructed by the host process
//! and injected. The checkpoint alone fully describes a suspension point:
//! [`Engine::resume`] reconstructs the approval record from it when this
//! process's ledger never saw the original, so a fresh process sharing only
//! the checkpoint store can answer the callback. [`Engine::recover`]
//! re-drives any checkpointed contract after a crash.
//!
//! The loop is: execute node, merge the partial update, checkpoint, then
//! route. Suspension is a clean exit, not an error, and a concurrency permit
//! is held only while a contract is actually running.

use crate::approval::{ApprovalLedger, ApprovalRequest, ApprovalStatus};
use crate::checkpoint::CheckpointStore;
use crate::collab::{ApprovalAction, ApprovalDecision, ApprovalNotifier, ModelClient};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::mail::Mailroom;
use crate::nodes::{run_node, task_headline, NodeContext, NodeSignal};
use crate::phase::Phase;
use crate::role::PermissionMatrix;
use crate::router::{next_node, NodeId};
use crate::state::{ContractState, Priority, StateUpdate};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

/// A new contract as submitted by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractIntake {
    pub task: String,
    pub priority: Priority,
    pub department: String,
}

impl ContractIntake {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            priority: Priority::default(),
            department: "general".to_string(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_department(mut self, department: &str) -> Self {
        self.department = department.to_string();
        self
    }
}

/// How a run (or resume) call ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ContractState),
    Escalated(ContractState),
    Rejected(ContractState),
    /// Awaiting a human approval decision; resume with
    /// [`Engine::resume`] once it arrives.
    Suspended {
        contract_id: Uuid,
        request_id: Uuid,
    },
}

impl RunOutcome {
    pub fn state(&self) -> Option<&ContractState> {
        match self {
            Self::Completed(s) | Self::Escalated(s) | Self::Rejected(s) => Some(s),
            Self::Suspended { .. } => None,
        }
    }
}

/// The contract workflow engine.
pub struct Engine {
    ctx: NodeContext,
    checkpoints: Arc<dyn CheckpointStore>,
    limiter: Arc<Semaphore>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn ModelClient>,
        notifier: Arc<dyn ApprovalNotifier>,
        checkpoints: Arc<dyn CheckpointStore>,
        ledger: Arc<ApprovalLedger>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_parallel));
        Self {
            ctx: NodeContext {
                model,
                notifier,
                ledger,
                mailroom: Mailroom::new(PermissionMatrix::standard()),
                config,
            },
            checkpoints,
            limiter,
        }
    }

    /// Run a new contract to a terminal phase or a suspension point.
    ///
    /// Waits for a concurrency slot first; waiters are admitted in FIFO
    /// order.
    pub async fn run(&self, intake: ContractIntake) -> Result<RunOutcome, EngineError> {
        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .context("concurrency limiter closed")?;

        let state = ContractState::new(
            &intake.task,
            intake.priority,
            &intake.department,
            self.ctx.config.max_attempts,
        );
        info!(contract_id = %state.id, department = %state.department, "contract intake");
        self.drive(state).await
    }

    /// Run a batch of contracts concurrently, bounded by the configured
    /// parallelism limit.
    pub async fn run_batch(
        &self,
        intakes: Vec<ContractIntake>,
    ) -> Vec<Result<RunOutcome, EngineError>> {
        futures::future::join_all(intakes.into_iter().map(|intake| self.run(intake))).await
    }

    /// Resume a contract suspended at the approval gate with the approver's
    /// decision.
    pub async fn resume(
        &self,
        contract_id: Uuid,
        decision: ApprovalDecision,
    ) -> Result<RunOutcome, EngineError> {
        let state = self
            .checkpoints
            .load(contract_id)
            .await?
            .ok_or(EngineError::CheckpointMissing { contract_id })?;

        if state.phase != Phase::FinalApproval {
            return Err(EngineError::NotSuspended { contract_id });
        }
        let request_id = state
            .approval
            .request_id
            .ok_or(EngineError::NotSuspended { contract_id })?;

        if self.ctx.ledger.get(request_id).await.is_none() {
            warn!(
                contract_id = %contract_id,
                request_id = %request_id,
                "approval record not in this ledger, restoring from checkpoint"
            );
            self.ctx
                .ledger
                .restore(restored_request(&state, request_id))
                .await;
        }

        let resolver = state.approval.approver_id.clone();
        match decision.action {
            ApprovalAction::Approve => {
                self.ctx.ledger.approve(request_id, &resolver).await?;
            }
            ApprovalAction::Reject => {
                let notes = decision.notes.unwrap_or_default();
                self.ctx.ledger.reject(request_id, &resolver, &notes).await?;
            }
        }
        info!(contract_id = %contract_id, request_id = %request_id, "resuming from approval decision");

        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .context("concurrency limiter closed")?;
        self.drive(state).await
    }

    /// Re-drive a checkpointed contract from its persisted phase, e.g. after
    /// a process crash. Nodes check before acting, so re-executing the last
    /// uncommitted one is harmless; a contract checkpointed at the approval
    /// gate with the decision still outstanding suspends again. Terminal
    /// contracts return their outcome without running anything.
    pub async fn recover(&self, contract_id: Uuid) -> Result<RunOutcome, EngineError> {
        let state = self
            .checkpoints
            .load(contract_id)
            .await?
            .ok_or(EngineError::CheckpointMissing { contract_id })?;
        info!(contract_id = %contract_id, phase = %state.phase, "recovering from checkpoint");

        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .context("concurrency limiter closed")?;
        self.drive(state).await
    }

    /// Close a non-terminal contract as rejected without running any more
    /// nodes. Idempotent on already-closed contracts.
    pub async fn cancel(&self, contract_id: Uuid, reason: &str) -> Result<(), EngineError> {
        let mut state = self
            .checkpoints
            .load(contract_id)
            .await?
            .ok_or(EngineError::CheckpointMissing { contract_id })?;

        if state.is_terminal() {
            warn!(contract_id = %contract_id, phase = %state.phase, "cancel on a closed contract");
            return Ok(());
        }
        state.apply(StateUpdate {
            phase: Some(Phase::Rejected),
            final_result: Some(format!("Cancelled: {}", reason)),
            ..Default::default()
        });
        self.checkpoints.save(&state).await?;
        info!(contract_id = %contract_id, reason, "contract cancelled");
        Ok(())
    }

    async fn drive(&self, mut state: ContractState) -> Result<RunOutcome, EngineError> {
        let Some(mut node) = NodeId::for_phase(state.phase) else {
            return terminal_outcome(state);
        };

        loop {
            let outcome = run_node(node, &state, &self.ctx).await?;
            let signal = outcome.signal;
            state.apply(outcome.update);
            self.checkpoints.save(&state).await?;

            if signal == NodeSignal::Suspend {
                let contract_id = state.id;
                let request_id = state.approval.request_id.ok_or_else(|| {
                    EngineError::Other(anyhow!(
                        "contract {} suspended without an approval request",
                        contract_id
                    ))
                })?;
                return Ok(RunOutcome::Suspended {
                    contract_id,
                    request_id,
                });
            }
            if state.is_terminal() {
                return terminal_outcome(state);
            }

            let next = next_node(node, &state);
            let Some(phase) = next.phase() else {
                return Err(EngineError::Other(anyhow!(
                    "contract {} routed to completion in non-terminal phase {}",
                    state.id,
                    state.phase
                )));
            };
            state.apply(StateUpdate {
                phase: Some(phase),
                ..Default::default()
            });
            self.checkpoints.save(&state).await?;
            node = next;
        }
    }
}

/// Rebuild the approval record a suspended checkpoint refers to, for a
/// ledger that never saw the original request.
fn restored_request(state: &ContractState, request_id: Uuid) -> ApprovalRequest {
    ApprovalRequest {
        id: request_id,
        contract_id: state.id,
        title: format!("Approval: {}", task_headline(&state.task)),
        summary: format!(
            "Task:\n{}\n\nDeliverable:\n{}\n\nReview report:\n{}",
            state.task, state.output, state.review_report
        ),
        approver: state.approval.approver,
        approver_id: state.approval.approver_id.clone(),
        cc: state.approval.cc.clone(),
        status: ApprovalStatus::Pending,
        rejection_notes: None,
        created_at: state.updated_at,
        resolved_at: None,
        resolved_by: None,
    }
}

fn terminal_outcome(state: ContractState) -> Result<RunOutcome, EngineError> {
    match state.phase {
        Phase::Completed => Ok(RunOutcome::Completed(state)),
        Phase::Escalated => Ok(RunOutcome::Escalated(state)),
        Phase::Rejected => Ok(RunOutcome::Rejected(state)),
        phase => Err(EngineError::Other(anyhow!(
            "contract {} finished in non-terminal phase {}",
            state.id,
            phase
        ))),
    }
}
