//! Roles, actions, and the chain-of-command permission matrix.
//!
//! The communication topology is a fixed directed graph: a role may only
//! initiate mail toward the roles in its whitelist. The matrix is the single
//! enforcement point for chain of command — checked at send time on every
//! message, not only at design time.
//!
//! Two kinds of check with different failure semantics:
//! - [`PermissionMatrix::check_action`] gates side-effecting capabilities and
//!   fails hard with `PermissionDenied`.
//! - [`PermissionMatrix::check_route`] never fails — a denied route is a
//!   normal, auditable occurrence returned as [`RouteCheck::Denied`].

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The closed set of organizational roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Initiates contracts and owns the final approval gate.
    Director,
    /// Decomposes work, assigns it, and handles escalation.
    Planner,
    /// Accepts assignments and performs the work.
    Executor,
    /// Independently evaluates executor output.
    Reviewer,
}

impl Role {
    /// All roles, in chain-of-command order.
    pub const ALL: [Role; 4] = [Role::Director, Role::Planner, Role::Executor, Role::Reviewer];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Director => "director",
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Reviewer => "reviewer",
        };
        write!(f, "{}", s)
    }
}

/// Side-effecting capabilities a node may invoke on behalf of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    DispatchContract,
    ApproveContract,
    CloseContract,
    PlanWork,
    AssignWork,
    MonitorProgress,
    EvaluateReview,
    EscalateContract,
    AcceptAssignment,
    ExecuteWork,
    ReportStatus,
    ReviewOutput,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DispatchContract => "dispatch_contract",
            Self::ApproveContract => "approve_contract",
            Self::CloseContract => "close_contract",
            Self::PlanWork => "plan_work",
            Self::AssignWork => "assign_work",
            Self::MonitorProgress => "monitor_progress",
            Self::EvaluateReview => "evaluate_review",
            Self::EscalateContract => "escalate_contract",
            Self::AcceptAssignment => "accept_assignment",
            Self::ExecuteWork => "execute_work",
            Self::ReportStatus => "report_status",
            Self::ReviewOutput => "review_output",
        };
        write!(f, "{}", s)
    }
}

/// Static per-role authorization entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Actions this role may invoke.
    pub allowed_actions: Vec<Action>,
    /// Roles this role may initiate communication toward.
    pub allowed_routes: Vec<Role>,
    /// Free-text constraint tags, informational only.
    pub constraints: Vec<String>,
}

/// Outcome of a route check. Denial is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCheck {
    Allowed,
    Denied(String),
}

impl RouteCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Static authorization tables for all roles.
#[derive(Debug, Clone)]
pub struct PermissionMatrix {
    entries: HashMap<Role, PermissionEntry>,
}

impl PermissionMatrix {
    /// The standard chain-of-command topology:
    ///
    /// ```text
    /// director -> planner
    /// planner  -> director, executor, reviewer
    /// executor -> planner
    /// reviewer -> planner        (never the director)
    /// ```
    pub fn standard() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            Role::Director,
            PermissionEntry {
                allowed_actions: vec![
                    Action::DispatchContract,
                    Action::ApproveContract,
                    Action::CloseContract,
                ],
                allowed_routes: vec![Role::Planner],
                constraints: vec!["delegates through the planner".to_string()],
            },
        );
        entries.insert(
            Role::Planner,
            PermissionEntry {
                allowed_actions: vec![
                    Action::PlanWork,
                    Action::AssignWork,
                    Action::MonitorProgress,
                    Action::EvaluateReview,
                    Action::EscalateContract,
                ],
                allowed_routes: vec![Role::Director, Role::Executor, Role::Reviewer],
                constraints: vec!["sole relay between director and executor".to_string()],
            },
        );
        entries.insert(
            Role::Executor,
            PermissionEntry {
                allowed_actions: vec![
                    Action::AcceptAssignment,
                    Action::ExecuteWork,
                    Action::ReportStatus,
                ],
                allowed_routes: vec![Role::Planner],
                constraints: vec!["must accept before working".to_string()],
            },
        );
        entries.insert(
            Role::Reviewer,
            PermissionEntry {
                allowed_actions: vec![Action::ReviewOutput],
                allowed_routes: vec![Role::Planner],
                constraints: vec!["reports to the planner only".to_string()],
            },
        );
        Self { entries }
    }

    /// Look up the entry for a role. All roles are present in the standard
    /// matrix by construction.
    pub fn entry(&self, role: Role) -> &PermissionEntry {
        &self.entries[&role]
    }

    /// Gate a side-effecting capability. Never bypassed.
    pub fn check_action(&self, role: Role, action: Action) -> Result<(), EngineError> {
        if self.entry(role).allowed_actions.contains(&action) {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied { role, action })
        }
    }

    /// Check whether `from` may initiate communication toward `to`.
    ///
    /// Does not raise: callers must handle the denial as data, because a
    /// denied route is audited rather than treated as a programming error.
    pub fn check_route(&self, from: Role, to: Role) -> RouteCheck {
        if from == to {
            return RouteCheck::Denied(format!("{} may not message itself", from));
        }
        if self.entry(from).allowed_routes.contains(&to) {
            RouteCheck::Allowed
        } else {
            RouteCheck::Denied(format!(
                "{} is outside the chain of command for {}",
                to, from
            ))
        }
    }
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_an_entry() {
        let matrix = PermissionMatrix::standard();
        for role in Role::ALL {
            assert!(!matrix.entry(role).allowed_actions.is_empty());
        }
    }

    #[test]
    fn allowed_actions_pass() {
        let matrix = PermissionMatrix::standard();
        assert!(matrix
            .check_action(Role::Director, Action::DispatchContract)
            .is_ok());
        assert!(matrix.check_action(Role::Planner, Action::PlanWork).is_ok());
        assert!(matrix
            .check_action(Role::Executor, Action::ExecuteWork)
            .is_ok());
        assert!(matrix
            .check_action(Role::Reviewer, Action::ReviewOutput)
            .is_ok());
    }

    #[test]
    fn disallowed_action_is_permission_denied() {
        let matrix = PermissionMatrix::standard();
        let err = matrix
            .check_action(Role::Reviewer, Action::ApproveContract)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::PermissionDenied {
                role: Role::Reviewer,
                action: Action::ApproveContract,
            }
        ));
    }

    #[test]
    fn reviewer_may_only_reach_planner() {
        let matrix = PermissionMatrix::standard();
        assert!(matrix.check_route(Role::Reviewer, Role::Planner).is_allowed());
        assert!(!matrix
            .check_route(Role::Reviewer, Role::Director)
            .is_allowed());
        assert!(!matrix
            .check_route(Role::Reviewer, Role::Executor)
            .is_allowed());
    }

    #[test]
    fn director_may_not_bypass_planner() {
        let matrix = PermissionMatrix::standard();
        assert!(matrix.check_route(Role::Director, Role::Planner).is_allowed());
        assert!(!matrix
            .check_route(Role::Director, Role::Executor)
            .is_allowed());
        assert!(!matrix
            .check_route(Role::Director, Role::Reviewer)
            .is_allowed());
    }

    #[test]
    fn self_routes_are_denied() {
        let matrix = PermissionMatrix::standard();
        for role in Role::ALL {
            assert!(!matrix.check_route(role, role).is_allowed());
        }
    }

    #[test]
    fn denial_carries_a_reason() {
        let matrix = PermissionMatrix::standard();
        match matrix.check_route(Role::Reviewer, Role::Director) {
            RouteCheck::Denied(reason) => {
                assert!(reason.contains("chain of command"));
            }
            RouteCheck::Allowed => panic!("Expected denial"),
        }
    }
}
