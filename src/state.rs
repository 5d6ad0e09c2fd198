//! The contract's full mutable record and the partial-update merge.
//!
//! A [`ContractState`] is owned exclusively by the orchestrator core between
//! node invocations. Nodes never mutate it directly: each returns a
//! [`StateUpdate`] which the core merges via [`ContractState::apply`] — plain
//! fields last-write-wins, the two audit logs merge by append and are never
//! replaced, truncated, or reordered.

use crate::approval::{ApprovalStatus, ApproverKind};
use crate::mail::{MailMessage, MailOutcome, MailRejection};
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contract priority, set at intake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// The independent reviewer's binary outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Result of a periodic progress check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressResult {
    OnTrack,
    Stuck,
}

/// The ownership step: explicit accept/reject before any work begins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnershipState {
    /// Unset until the assignee responds; no response routes like rejection.
    pub accepted: Option<bool>,
    pub rejection_reason: Option<String>,
    /// Advisory deadline for the acceptance response. Recorded for the audit
    /// trail; no timer enforces it.
    pub acceptance_deadline: Option<DateTime<Utc>>,
}

/// Periodic progress-check bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Check cadence in seconds. `None` disables progress checks entirely.
    pub check_interval_secs: Option<u64>,
    pub check_count: u32,
    pub max_checks: u32,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_result: Option<ProgressResult>,
}

/// Approval-gate sub-state mirrored from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub request_id: Option<Uuid>,
    pub status: Option<ApprovalStatus>,
    pub rejection_notes: Option<String>,
    pub approver: ApproverKind,
    pub approver_id: String,
    pub cc: Vec<String>,
}

/// One contract's full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractState {
    pub id: Uuid,
    pub task: String,
    pub priority: Priority,
    pub department: String,
    pub phase: Phase,
    /// Executor output for the current attempt.
    pub output: String,
    pub verdict: Option<Verdict>,
    pub review_report: String,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub subtasks: Vec<String>,
    pub instruction: String,
    /// Append-only log of every delivered message.
    pub mail_log: Vec<MailMessage>,
    /// Append-only log of every denied send attempt.
    pub mail_rejections: Vec<MailRejection>,
    pub final_result: String,
    pub approved: bool,
    pub escalated: bool,
    pub ownership: OwnershipState,
    pub progress: ProgressState,
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContractState {
    pub fn new(task: &str, priority: Priority, department: &str, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task: task.to_string(),
            priority,
            department: department.to_string(),
            phase: Phase::Dispatch,
            output: String::new(),
            verdict: None,
            review_report: String::new(),
            attempt_count: 0,
            max_attempts,
            subtasks: Vec::new(),
            instruction: String::new(),
            mail_log: Vec::new(),
            mail_rejections: Vec::new(),
            final_result: String::new(),
            approved: false,
            escalated: false,
            ownership: OwnershipState::default(),
            progress: ProgressState::default(),
            approval: ApprovalState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether retry budget remains for another attempt.
    pub fn attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Merge a node's partial update. Plain fields last-write-wins; the two
    /// audit logs grow by append only.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(phase) = update.phase {
            self.phase = phase;
        }
        if let Some(output) = update.output {
            self.output = output;
        }
        if let Some(verdict) = update.verdict {
            self.verdict = Some(verdict);
        }
        if let Some(report) = update.review_report {
            self.review_report = report;
        }
        self.attempt_count += update.attempt_increment;
        debug_assert!(
            self.attempt_count <= self.max_attempts,
            "attempt_count {} exceeded max_attempts {}",
            self.attempt_count,
            self.max_attempts
        );
        if let Some(subtasks) = update.subtasks {
            self.subtasks = subtasks;
        }
        if let Some(instruction) = update.instruction {
            self.instruction = instruction;
        }
        self.mail_log.extend(update.mail);
        self.mail_rejections.extend(update.mail_rejections);
        if let Some(final_result) = update.final_result {
            self.final_result = final_result;
        }
        if let Some(approved) = update.approved {
            self.approved = approved;
        }
        if let Some(escalated) = update.escalated {
            self.escalated = escalated;
        }
        if let Some(ownership) = update.ownership {
            self.ownership = ownership;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(approval) = update.approval {
            self.approval = approval;
        }
        self.updated_at = Utc::now();
    }
}

/// A node executor's partial update, merged by the orchestrator core.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub phase: Option<Phase>,
    pub output: Option<String>,
    pub verdict: Option<Verdict>,
    pub review_report: Option<String>,
    /// Attempts are consumed, never set absolutely.
    pub attempt_increment: u32,
    pub subtasks: Option<Vec<String>>,
    pub instruction: Option<String>,
    pub mail: Vec<MailMessage>,
    pub mail_rejections: Vec<MailRejection>,
    pub final_result: Option<String>,
    pub approved: Option<bool>,
    pub escalated: Option<bool>,
    pub ownership: Option<OwnershipState>,
    pub progress: Option<ProgressState>,
    pub approval: Option<ApprovalState>,
}

impl StateUpdate {
    /// Append a mail outcome to the appropriate log.
    pub fn record_mail(&mut self, outcome: MailOutcome) {
        match outcome {
            MailOutcome::Sent(msg) => self.mail.push(msg),
            MailOutcome::Denied(rej) => self.mail_rejections.push(rej),
        }
    }
}
