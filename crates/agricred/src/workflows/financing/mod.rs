//! Multi-step financing application engine.
//!
//! A draft moves through an ordered (and for warehouse receipts, branching)
//! table of steps. Each step is gated by validation and may call out to a
//! collaborator before the wizard moves on. The controller is a plain state
//! machine; [`session`] wraps it in a single-writer tokio task per draft.

pub mod blueprint;
pub mod controller;
pub mod domain;
pub mod draft;
pub mod error;
pub mod ports;
pub mod router;
pub mod schema;
pub mod session;
pub mod validation;
pub mod valuation;

#[cfg(test)]
mod tests;

pub use blueprint::{
    resolve_branch, FinancingBlueprint, SideEffect, StepDefinition, StepKey, StepSequence,
};
pub use controller::{ControllerState, Ticket, Transition, WorkflowController, WorkflowView};
pub use domain::{
    ApplicationDraft, DocumentHandle, DraftId, DraftStatus, FieldKind, FieldValue,
    InstrumentType, InsurancePolicy, ReceiptPath,
};
pub use draft::{DraftError, DraftIdSource, DraftStore, RandomDraftIds, SequentialDraftIds};
pub use error::{ErrorBody, WorkflowError};
pub use ports::{
    CallOutcome, Collaborators, PaymentMethod, PaymentPort, PaymentResult, PendingCall,
    PortError, RiskQuote, ScoringPort, SubmissionPort, SubmissionReceipt, VerificationPort,
    VerificationPurpose, VerificationRequest, VerificationResult, VerificationSubject,
};
pub use router::financing_router;
pub use session::{DraftRegistry, FinancingSession, SessionSettings};
pub use validation::{validate_step, FieldError, FieldIssue, ValidationError};
pub use valuation::{
    estimated_financing, financing_preview, risk_tier, withdrawal_charges, AdvanceRateTable,
    ChargeBreakdown, ChargeFlags, ChargeSchedule, FinancingPreview, FlowVariant, RiskTier,
    ValuationConfig,
};
