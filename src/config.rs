//! Runtime configuration for the engine.

use crate::approval::ApproverKind;
use std::time::Duration;

/// Default retry budget per contract.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default cap on concurrently running contracts.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default cap on progress checks without output before forced escalation.
pub const DEFAULT_MAX_PROGRESS_CHECKS: u32 = 3;

/// Default advisory window for the acceptance response.
const DEFAULT_ACCEPTANCE_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Default token budget per model call.
const DEFAULT_TOKEN_BUDGET: u32 = 2048;

/// Engine-wide settings applied to every contract at intake.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry budget: execution/reassignment attempts before escalation.
    pub max_attempts: u32,
    /// Concurrency limit; excess contracts queue FIFO for a slot.
    pub max_parallel: usize,
    /// Progress-check cadence. `None` disables the progress-check node.
    pub progress_check_interval: Option<Duration>,
    /// Progress checks without output before forced escalation.
    pub max_progress_checks: u32,
    /// Advisory deadline window for the ownership step.
    pub acceptance_window: Duration,
    /// Which kind of approver answers the final gate.
    pub approver: ApproverKind,
    /// Identity of the approver (model alias or human id).
    pub approver_id: String,
    /// Read-only recipients copied on approval requests.
    pub cc: Vec<String>,
    /// Token budget handed to the model collaborator per call.
    pub token_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_parallel: DEFAULT_MAX_PARALLEL,
            progress_check_interval: None,
            max_progress_checks: DEFAULT_MAX_PROGRESS_CHECKS,
            acceptance_window: Duration::from_secs(DEFAULT_ACCEPTANCE_WINDOW_SECS),
            approver: ApproverKind::Automatic,
            approver_id: "auto-approver".to_string(),
            cc: Vec::new(),
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }
}

impl EngineConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_progress_checks(mut self, interval: Duration, max_checks: u32) -> Self {
        self.progress_check_interval = Some(interval);
        self.max_progress_checks = max_checks;
        self
    }

    pub fn with_human_approver(mut self, approver_id: &str, cc: Vec<String>) -> Self {
        self.approver = ApproverKind::Human;
        self.approver_id = approver_id.to_string();
        self.cc = cc;
        self
    }

    pub fn with_acceptance_window(mut self, window: Duration) -> Self {
        self.acceptance_window = window;
        self
    }
}
