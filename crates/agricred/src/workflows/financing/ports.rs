//! Outbound collaborator boundary.
//!
//! Document extraction, registry lookups, risk scoring, submission and payment
//! all live behind these traits. The controller never calls them directly; it
//! hands back a [`PendingCall`] and the session actor runs it through
//! [`Collaborators::dispatch`] with a bounded wait.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{ApplicationDraft, DocumentHandle, FieldValue};

/// Error returned by any collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
    #[error("collaborator did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    /// Read invoice fields out of an uploaded document.
    InvoiceExtraction,
    /// Look a warehouse receipt up in the repository registry.
    ReceiptRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSubject {
    Document(DocumentHandle),
    Identifier(String),
}

impl VerificationSubject {
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Document(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub purpose: VerificationPurpose,
    pub subject: VerificationSubject,
}

/// Answer from a verification or extraction call. Folded into the draft once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    pub is_valid: bool,
    #[serde(default)]
    pub is_pledged: bool,
}

impl VerificationResult {
    pub fn extracted(fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            success: true,
            fields,
            is_valid: true,
            is_pledged: false,
        }
    }

    pub fn unreadable() -> Self {
        Self {
            success: false,
            fields: BTreeMap::new(),
            is_valid: false,
            is_pledged: false,
        }
    }
}

/// Score produced by the risk engine, on a 0..=1000 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskQuote {
    pub raw_score: u16,
    pub min_interest_percent: u64,
    pub max_interest_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub reference: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Upi,
    Card,
    NetBanking,
}

impl PaymentMethod {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Upi => "UPI",
            Self::Card => "Card",
            Self::NetBanking => "Net Banking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub transaction_id: String,
    pub amount: u64,
    pub method: PaymentMethod,
    pub processed_at: DateTime<Utc>,
}

/// Document extraction and registry verification.
///
/// Implementations must tolerate the same request being retried.
#[async_trait]
pub trait VerificationPort: Send + Sync {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, PortError>;
}

#[async_trait]
pub trait ScoringPort: Send + Sync {
    async fn score(&self, draft: &ApplicationDraft) -> Result<RiskQuote, PortError>;
}

/// Finalises an application. Called at most once per draft from review.
#[async_trait]
pub trait SubmissionPort: Send + Sync {
    async fn submit(&self, draft: &ApplicationDraft) -> Result<SubmissionReceipt, PortError>;
}

#[async_trait]
pub trait PaymentPort: Send + Sync {
    async fn process_payment(
        &self,
        amount: u64,
        method: PaymentMethod,
    ) -> Result<PaymentResult, PortError>;
}

/// Work the controller has asked for while suspended.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingCall {
    Verify(VerificationRequest),
    Score(ApplicationDraft),
    Submit(ApplicationDraft),
}

impl PendingCall {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Verify(_) => "verify",
            Self::Score(_) => "score",
            Self::Submit(_) => "submit",
        }
    }
}

/// Result of a [`PendingCall`], fed back into the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Verified(Result<VerificationResult, PortError>),
    Scored(Result<RiskQuote, PortError>),
    Submitted(Result<SubmissionReceipt, PortError>),
}

/// The set of outbound adapters a financing session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub verification: Arc<dyn VerificationPort>,
    pub scoring: Arc<dyn ScoringPort>,
    pub submission: Arc<dyn SubmissionPort>,
    pub payments: Arc<dyn PaymentPort>,
}

impl Collaborators {
    /// Run a pending call, converting an overrun into [`PortError::Timeout`].
    pub async fn dispatch(&self, call: PendingCall, limit: Duration) -> CallOutcome {
        let label = call.label();
        debug!(call = label, timeout_secs = limit.as_secs(), "dispatching collaborator call");

        match call {
            PendingCall::Verify(request) => {
                CallOutcome::Verified(bounded(label, limit, self.verification.verify(request)).await)
            }
            PendingCall::Score(draft) => {
                CallOutcome::Scored(bounded(label, limit, self.scoring.score(&draft)).await)
            }
            PendingCall::Submit(draft) => {
                CallOutcome::Submitted(bounded(label, limit, self.submission.submit(&draft)).await)
            }
        }
    }
}

/// Await a collaborator for at most `limit`.
pub(crate) async fn bounded<T, F>(label: &'static str, limit: Duration, call: F) -> Result<T, PortError>
where
    F: std::future::Future<Output = Result<T, PortError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(call = label, timeout_secs = limit.as_secs(), "collaborator call timed out");
            Err(PortError::Timeout(limit))
        }
    }
}
