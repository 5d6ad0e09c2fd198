//! Approval requests and the ledger that enforces their invariants.
//!
//! The ledger is an explicit store constructed by the host process and passed
//! by reference into the engine — never a module-level global. It enforces,
//! rather than advises:
//!
//! - at most one `Pending` request per contract at a time
//! - `Rejected` requires non-empty, non-whitespace notes
//! - a resolved record is immutable; a second resolve attempt fails without
//!   mutating anything

use crate::errors::ApprovalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Who answers the final approval gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverKind {
    /// A decision function is invoked synchronously.
    #[default]
    Automatic,
    /// A human answers asynchronously; the contract suspends while waiting.
    Human,
}

/// Lifecycle of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// One approval gate crossing for one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub title: String,
    pub summary: String,
    pub approver: ApproverKind,
    pub approver_id: String,
    /// Read-only notification recipients. CC'd parties cannot act.
    pub cc: Vec<String>,
    pub status: ApprovalStatus,
    pub rejection_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        contract_id: Uuid,
        title: &str,
        summary: &str,
        approver: ApproverKind,
        approver_id: &str,
        cc: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id,
            title: title.to_string(),
            summary: summary.to_string(),
            approver,
            approver_id: approver_id.to_string(),
            cc,
            status: ApprovalStatus::Pending,
            rejection_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status != ApprovalStatus::Pending
    }
}

/// In-memory approval store with invariant enforcement.
#[derive(Debug, Default)]
pub struct ApprovalLedger {
    inner: Mutex<HashMap<Uuid, ApprovalRequest>>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. Fails if the contract already has one pending.
    pub async fn create(&self, request: ApprovalRequest) -> Result<ApprovalRequest, ApprovalError> {
        let mut inner = self.inner.lock().await;
        let pending_exists = inner
            .values()
            .any(|r| r.contract_id == request.contract_id && !r.is_resolved());
        if pending_exists {
            return Err(ApprovalError::PendingExists {
                contract_id: request.contract_id,
            });
        }
        info!(
            request_id = %request.id,
            contract_id = %request.contract_id,
            approver = ?request.approver,
            "approval request created"
        );
        inner.insert(request.id, request.clone());
        Ok(request)
    }

    /// Re-insert a request reconstructed from a checkpoint, for an engine
    /// whose ledger never saw the original (a different process, or a
    /// restart with an in-memory ledger). A record already present is kept
    /// untouched.
    pub async fn restore(&self, request: ApprovalRequest) {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&request.id) {
            return;
        }
        info!(
            request_id = %request.id,
            contract_id = %request.contract_id,
            "approval request restored from checkpoint"
        );
        inner.insert(request.id, request);
    }

    pub async fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.inner.lock().await.get(&id).cloned()
    }

    /// The pending request for a contract, if any. The create invariant
    /// guarantees there is at most one.
    pub async fn pending_for(&self, contract_id: Uuid) -> Option<ApprovalRequest> {
        self.inner
            .lock()
            .await
            .values()
            .find(|r| r.contract_id == contract_id && !r.is_resolved())
            .cloned()
    }

    pub async fn approve(&self, id: Uuid, resolver: &str) -> Result<ApprovalRequest, ApprovalError> {
        let mut inner = self.inner.lock().await;
        let request = inner.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;
        if request.is_resolved() {
            return Err(ApprovalError::AlreadyResolved { id });
        }
        request.status = ApprovalStatus::Approved;
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(resolver.to_string());
        info!(request_id = %id, resolver, "approval request approved");
        Ok(request.clone())
    }

    pub async fn reject(
        &self,
        id: Uuid,
        resolver: &str,
        notes: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        if notes.trim().is_empty() {
            return Err(ApprovalError::EmptyRejectionNotes);
        }
        let mut inner = self.inner.lock().await;
        let request = inner.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;
        if request.is_resolved() {
            return Err(ApprovalError::AlreadyResolved { id });
        }
        request.status = ApprovalStatus::Rejected;
        request.rejection_notes = Some(notes.to_string());
        request.resolved_at = Some(Utc::now());
        request.resolved_by = Some(resolver.to_string());
        info!(request_id = %id, resolver, "approval request rejected");
        Ok(request.clone())
    }
}
