//! External collaborator boundaries: the language model and the human
//! approval notification channel.
//!
//! Collaborator output is untrusted free text. The parsing rule for decision
//! markers: the first non-empty line, after stripping markdown emphasis
//! characters, must equal one of the expected markers. Anything else is
//! ambiguous and resolved by the caller to the conservative outcome — never
//! raised as a crash.

use crate::role::Role;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_`#~>]").unwrap());

/// Language-model collaborator. Given a role, system instructions, user
/// instructions, and a token budget, returns free text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        role: Role,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String>;
}

/// Payload delivered to the human approver and, read-only, to the CC list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalNotification {
    pub approver_id: String,
    pub request_id: Uuid,
    pub contract_id: Uuid,
    pub title: String,
    pub summary: String,
    /// Recipients of a read-only copy with no actionable controls.
    pub cc: Vec<String>,
}

/// Delivers approval notifications. Delivery failures are the caller's to
/// absorb; they never crash the engine.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify(&self, notification: &ApprovalNotification) -> Result<()>;
}

/// The resume signal delivered back to the engine for a suspended contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub action: ApprovalAction,
    /// Mandatory when `action` is `Reject`.
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

/// Extract a decision marker from collaborator output.
///
/// Returns the matched marker, or `None` when the first non-empty line does
/// not match any expected marker (the ambiguous case).
pub fn parse_marker<'a>(text: &str, expected: &[&'a str]) -> Option<&'a str> {
    let line = first_line(text)?;
    let stripped = EMPHASIS.replace_all(line, "");
    let token = stripped
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_uppercase();
    expected.iter().find(|m| **m == token).copied()
}

/// Everything after the first non-empty line, trimmed. Used for reviewer
/// reports and rejection notes that follow the marker line.
pub fn remainder(text: &str) -> String {
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if !line.trim().is_empty() {
            break;
        }
    }
    lines.collect::<Vec<_>>().join("\n").trim().to_string()
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}
