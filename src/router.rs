//! Pure routing: the decision tables mapping state to the next node.
//!
//! The whole branch/retry/escalate policy lives in [`next_node`] as one
//! exhaustive table over the closed [`NodeId`] set. Adding a node is a
//! compile-error-guided edit here and in `nodes::run_node`; nothing else
//! dispatches on node identity.

use crate::phase::Phase;
use crate::state::{ContractState, ProgressResult, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Dispatch,
    Plan,
    AcceptOrReject,
    Reassign,
    Execute,
    ProgressCheck,
    Review,
    ReviewDecision,
    FinalApproval,
    Escalate,
    /// Terminal marker: the interpreter stops here.
    Done,
}

impl NodeId {
    /// The phase a contract is in while this node executes.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Dispatch => Some(Phase::Dispatch),
            Self::Plan => Some(Phase::Planning),
            Self::AcceptOrReject => Some(Phase::Acceptance),
            Self::Reassign => Some(Phase::Reassign),
            Self::Execute => Some(Phase::Execution),
            Self::ProgressCheck => Some(Phase::ProgressCheck),
            Self::Review => Some(Phase::Review),
            Self::ReviewDecision => Some(Phase::ReviewDecision),
            Self::FinalApproval => Some(Phase::FinalApproval),
            Self::Escalate => Some(Phase::Escalation),
            Self::Done => None,
        }
    }

    /// The node that executes a given phase, used to re-enter the interpreter
    /// from a persisted snapshot.
    pub fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::Dispatch => Some(Self::Dispatch),
            Phase::Planning => Some(Self::Plan),
            Phase::Acceptance => Some(Self::AcceptOrReject),
            Phase::Reassign => Some(Self::Reassign),
            Phase::Execution => Some(Self::Execute),
            Phase::ProgressCheck => Some(Self::ProgressCheck),
            Phase::Review => Some(Self::Review),
            Phase::ReviewDecision => Some(Self::ReviewDecision),
            Phase::FinalApproval => Some(Self::FinalApproval),
            Phase::Escalation => Some(Self::Escalate),
            Phase::Completed | Phase::Escalated | Phase::Rejected => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase() {
            Some(phase) => write!(f, "{}", phase),
            None => write!(f, "done"),
        }
    }
}

/// Compute the next node after `current` has executed and its update has
/// been merged. Total over the closed node set.
pub fn next_node(current: NodeId, state: &ContractState) -> NodeId {
    match current {
        NodeId::Dispatch => NodeId::Plan,
        NodeId::Plan => NodeId::AcceptOrReject,

        // Accepted means work begins; rejection and no-response route alike.
        NodeId::AcceptOrReject => {
            if state.ownership.accepted == Some(true) {
                NodeId::Execute
            } else {
                NodeId::Reassign
            }
        }

        NodeId::Reassign => {
            if state.escalated {
                NodeId::Escalate
            } else {
                NodeId::AcceptOrReject
            }
        }

        // Checks repeat until one passes or the check budget runs out. After
        // an on-track check the execute node re-enters report-only and
        // proceeds to review.
        NodeId::Execute => {
            if state.progress.check_interval_secs.is_some()
                && state.progress.last_result != Some(ProgressResult::OnTrack)
            {
                NodeId::ProgressCheck
            } else {
                NodeId::Review
            }
        }

        // A stuck check that has not exhausted the check budget grants the
        // executor another run; the final stuck check sets the escalated
        // flag.
        NodeId::ProgressCheck => {
            if state.escalated {
                NodeId::Escalate
            } else {
                NodeId::Execute
            }
        }

        NodeId::Review => NodeId::ReviewDecision,

        // The execute node consumes the attempt, so remaining budget here
        // means another execution may be granted.
        NodeId::ReviewDecision => match state.verdict {
            Some(Verdict::Pass) => NodeId::FinalApproval,
            _ => {
                if state.attempts_remaining() {
                    NodeId::Execute
                } else {
                    NodeId::Escalate
                }
            }
        },

        // Reached only when the gate resolved without suspending: approval
        // completes the contract, an automatic rejection re-enters the retry
        // cycle, and a human rejection was already made terminal by the node.
        NodeId::FinalApproval => {
            if state.approved || state.is_terminal() {
                NodeId::Done
            } else if state.attempts_remaining() {
                NodeId::Execute
            } else {
                NodeId::Escalate
            }
        }

        NodeId::Escalate => NodeId::Done,
        NodeId::Done => NodeId::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{OwnershipState, Priority, ProgressState, StateUpdate};

    fn state(max_attempts: u32) -> ContractState {
        ContractState::new("task", Priority::Normal, "dept", max_attempts)
    }

    fn with(state: &ContractState, update: StateUpdate) -> ContractState {
        let mut s = state.clone();
        s.apply(update);
        s
    }

    #[test]
    fn linear_edges() {
        let s = state(3);
        assert_eq!(next_node(NodeId::Dispatch, &s), NodeId::Plan);
        assert_eq!(next_node(NodeId::Plan, &s), NodeId::AcceptOrReject);
        assert_eq!(next_node(NodeId::Review, &s), NodeId::ReviewDecision);
        assert_eq!(next_node(NodeId::Escalate, &s), NodeId::Done);
        assert_eq!(next_node(NodeId::Done, &s), NodeId::Done);
    }

    #[test]
    fn acceptance_routes_accepted_to_execute() {
        let s = state(3);
        let accepted = with(
            &s,
            StateUpdate {
                ownership: Some(OwnershipState {
                    accepted: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::AcceptOrReject, &accepted), NodeId::Execute);
    }

    #[test]
    fn acceptance_routes_rejection_and_no_response_alike() {
        let s = state(3);
        // No response: accepted unset.
        assert_eq!(next_node(NodeId::AcceptOrReject, &s), NodeId::Reassign);
        let rejected = with(
            &s,
            StateUpdate {
                ownership: Some(OwnershipState {
                    accepted: Some(false),
                    rejection_reason: Some("overloaded".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::AcceptOrReject, &rejected), NodeId::Reassign);
    }

    #[test]
    fn reassign_escalates_only_when_flagged() {
        let s = state(3);
        assert_eq!(next_node(NodeId::Reassign, &s), NodeId::AcceptOrReject);
        let exhausted = with(
            &s,
            StateUpdate {
                escalated: Some(true),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::Reassign, &exhausted), NodeId::Escalate);
    }

    #[test]
    fn execute_routes_to_progress_check_until_a_check_passes() {
        let s = state(3);
        assert_eq!(next_node(NodeId::Execute, &s), NodeId::Review);

        let configured = with(
            &s,
            StateUpdate {
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    max_checks: 3,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::Execute, &configured), NodeId::ProgressCheck);

        // A stuck check sends the granted re-run back for another check.
        let stuck = with(
            &configured,
            StateUpdate {
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    check_count: 1,
                    max_checks: 3,
                    last_check_at: None,
                    last_result: Some(ProgressResult::Stuck),
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::Execute, &stuck), NodeId::ProgressCheck);

        let on_track = with(
            &configured,
            StateUpdate {
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    check_count: 1,
                    max_checks: 3,
                    last_check_at: None,
                    last_result: Some(ProgressResult::OnTrack),
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::Execute, &on_track), NodeId::Review);
    }

    #[test]
    fn progress_check_grants_a_rerun_until_the_budget_forces_escalation() {
        let s = state(3);
        let on_track = with(
            &s,
            StateUpdate {
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    check_count: 1,
                    max_checks: 3,
                    last_check_at: None,
                    last_result: Some(ProgressResult::OnTrack),
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ProgressCheck, &on_track), NodeId::Execute);

        // Stuck but with check budget left: the executor gets another run.
        let stuck = with(
            &s,
            StateUpdate {
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    check_count: 1,
                    max_checks: 3,
                    last_check_at: None,
                    last_result: Some(ProgressResult::Stuck),
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ProgressCheck, &stuck), NodeId::Execute);

        // The final stuck check set the escalated flag.
        let forced = with(
            &stuck,
            StateUpdate {
                escalated: Some(true),
                progress: Some(ProgressState {
                    check_interval_secs: Some(30),
                    check_count: 3,
                    max_checks: 3,
                    last_check_at: None,
                    last_result: Some(ProgressResult::Stuck),
                }),
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ProgressCheck, &forced), NodeId::Escalate);
    }

    #[test]
    fn review_decision_table() {
        let s = state(2);
        let pass = with(
            &s,
            StateUpdate {
                verdict: Some(Verdict::Pass),
                attempt_increment: 1,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ReviewDecision, &pass), NodeId::FinalApproval);

        let fail_with_budget = with(
            &s,
            StateUpdate {
                verdict: Some(Verdict::Fail),
                attempt_increment: 1,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ReviewDecision, &fail_with_budget), NodeId::Execute);

        let fail_exhausted = with(
            &s,
            StateUpdate {
                verdict: Some(Verdict::Fail),
                attempt_increment: 2,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::ReviewDecision, &fail_exhausted), NodeId::Escalate);
    }

    #[test]
    fn final_approval_table() {
        let s = state(3);
        let approved = with(
            &s,
            StateUpdate {
                approved: Some(true),
                attempt_increment: 1,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::FinalApproval, &approved), NodeId::Done);

        // Automatic rejection with budget left retries.
        let rejected = with(
            &s,
            StateUpdate {
                attempt_increment: 1,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::FinalApproval, &rejected), NodeId::Execute);

        let rejected_exhausted = with(
            &s,
            StateUpdate {
                attempt_increment: 3,
                ..Default::default()
            },
        );
        assert_eq!(
            next_node(NodeId::FinalApproval, &rejected_exhausted),
            NodeId::Escalate
        );

        // Human rejection is already terminal when the router runs.
        let human_rejected = with(
            &s,
            StateUpdate {
                phase: Some(Phase::Rejected),
                attempt_increment: 1,
                ..Default::default()
            },
        );
        assert_eq!(next_node(NodeId::FinalApproval, &human_rejected), NodeId::Done);
    }

    #[test]
    fn node_and_phase_maps_are_inverse() {
        for node in [
            NodeId::Dispatch,
            NodeId::Plan,
            NodeId::AcceptOrReject,
            NodeId::Reassign,
            NodeId::Execute,
            NodeId::ProgressCheck,
            NodeId::Review,
            NodeId::ReviewDecision,
            NodeId::FinalApproval,
            NodeId::Escalate,
        ] {
            let phase = node.phase().unwrap();
            assert_eq!(NodeId::for_phase(phase), Some(node));
        }
        assert_eq!(NodeId::Done.phase(), None);
        assert_eq!(NodeId::for_phase(Phase::Completed), None);
    }
}
