//! Node executors: one pure state-transition function per role/phase.
//!
//! Each executor receives the current `ContractState` and the shared
//! collaborator handles, and returns a [`NodeOutcome`] — a partial update
//! plus a continue/suspend signal. Executors never mutate state directly and
//! must be safe to re-run from the last checkpoint (check-before-act),
//! because crash recovery may re-execute the last uncommitted node.

mod acceptance;
mod dispatch;
mod escalate;
mod execute;
mod final_approval;
mod plan;
mod review;

use crate::approval::ApprovalLedger;
use crate::collab::{ApprovalNotifier, ModelClient};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::mail::Mailroom;
use crate::router::NodeId;
use crate::state::{ContractState, StateUpdate};
use std::sync::Arc;

/// Shared handles passed to every node executor.
#[derive(Clone)]
pub struct NodeContext {
    pub model: Arc<dyn ModelClient>,
    pub notifier: Arc<dyn ApprovalNotifier>,
    pub ledger: Arc<ApprovalLedger>,
    pub mailroom: Mailroom,
    pub config: EngineConfig,
}

/// How a node hands control back to the interpreter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeSignal {
    /// Merge the update and route to the next node.
    #[default]
    Continue,
    /// Persist and exit cleanly; an external callback resumes later.
    Suspend,
}

/// A node's result: the partial update to merge and the control signal.
#[derive(Debug, Default)]
pub struct NodeOutcome {
    pub update: StateUpdate,
    pub signal: NodeSignal,
}

impl NodeOutcome {
    pub fn advance(update: StateUpdate) -> Self {
        Self {
            update,
            signal: NodeSignal::Continue,
        }
    }

    pub fn suspend(update: StateUpdate) -> Self {
        Self {
            update,
            signal: NodeSignal::Suspend,
        }
    }
}

/// The node → executor table. One authoritative dispatch point; the router
/// holds the matching node → successor table.
pub async fn run_node(
    node: NodeId,
    state: &ContractState,
    ctx: &NodeContext,
) -> Result<NodeOutcome, EngineError> {
    match node {
        NodeId::Dispatch => dispatch::run(state, ctx),
        NodeId::Plan => plan::run(state, ctx).await,
        NodeId::AcceptOrReject => acceptance::accept_or_reject(state, ctx).await,
        NodeId::Reassign => acceptance::reassign(state, ctx),
        NodeId::Execute => execute::run(state, ctx).await,
        NodeId::ProgressCheck => execute::progress_check(state, ctx),
        NodeId::Review => review::run(state, ctx).await,
        NodeId::ReviewDecision => review::decision(state, ctx),
        NodeId::FinalApproval => final_approval::run(state, ctx).await,
        NodeId::Escalate => escalate::run(state, ctx),
        NodeId::Done => Ok(NodeOutcome::default()),
    }
}

/// First line of the task, clipped for subjects and titles.
pub(crate) fn task_headline(task: &str) -> String {
    let line = task.lines().next().unwrap_or("").trim();
    if line.chars().count() > 60 {
        let clipped: String = line.chars().take(57).collect();
        format!("{}...", clipped)
    } else {
        line.to_string()
    }
}
