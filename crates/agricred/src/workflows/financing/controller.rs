//! Synchronous workflow state machine.
//!
//! The controller never awaits. When a step needs a collaborator it moves to
//! a suspended state and returns the call to make together with a [`Ticket`].
//! The caller runs the call and hands the outcome back through
//! [`WorkflowController::complete`]; outcomes carrying any ticket other than
//! the one currently outstanding are dropped.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::blueprint::{FinancingBlueprint, SideEffect, StepDefinition, StepKey};
use super::domain::{
    ApplicationDraft, DraftId, DraftStatus, FieldValue, InstrumentType, ReceiptPath,
};
use super::draft::{DraftError, DraftStore};
use super::error::WorkflowError;
use super::ports::{
    CallOutcome, PendingCall, PortError, RiskQuote, SubmissionReceipt, VerificationPurpose,
    VerificationRequest, VerificationResult, VerificationSubject,
};
use super::schema::{
    field_spec, ENWR_DOCUMENT, ENWR_NUMBER, INVOICE_DOCUMENT, MAX_INTEREST, MIN_INTEREST,
    RECEIPT_PATH, RISK_SCORE,
};
use super::validation::{validate_step, FieldError};
use super::valuation::{financing_preview, FinancingPreview, FlowVariant, ValuationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    StepActive { step: usize },
    Verifying { step: usize, effect: SideEffect },
    ReviewActive,
    Submitting,
    Submitted,
}

impl ControllerState {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::StepActive { .. } => "on a step",
            Self::Verifying { .. } => "verifying",
            Self::ReviewActive => "in review",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
        }
    }

    pub const fn is_suspended(&self) -> bool {
        matches!(self, Self::Verifying { .. } | Self::Submitting)
    }
}

/// Identifies one outstanding collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub draft_id: DraftId,
    pub epoch: u64,
    pub sequence: u64,
}

/// What a controller operation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Moved(ControllerState),
    /// The controller is waiting; run `call` and report back with `ticket`.
    Suspended { ticket: Ticket, call: PendingCall },
    /// A late or foreign outcome was discarded.
    Ignored,
}

#[derive(Debug, Clone)]
struct InFlight {
    ticket: Ticket,
    document_based: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub key: StepKey,
    pub name: &'static str,
    pub ordinal: usize,
    pub total: usize,
}

/// Everything a presentation layer needs to render the wizard.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowView {
    pub state: ControllerState,
    pub draft: Option<ApplicationDraft>,
    pub step: Option<StepSummary>,
    pub errors: Vec<FieldError>,
    pub last_failure: Option<String>,
    pub fallback_to_manual: bool,
    pub busy: bool,
    pub can_advance: bool,
    pub can_back: bool,
    pub can_submit: bool,
    pub preview: Option<FinancingPreview>,
    pub receipt: Option<SubmissionReceipt>,
}

pub struct WorkflowController {
    store: DraftStore,
    blueprint: Arc<FinancingBlueprint>,
    valuation: ValuationConfig,
    state: ControllerState,
    in_flight: Option<InFlight>,
    call_sequence: u64,
    errors: Vec<FieldError>,
    last_failure: Option<String>,
    fallback_to_manual: bool,
    receipt: Option<SubmissionReceipt>,
}

impl WorkflowController {
    pub fn new(blueprint: Arc<FinancingBlueprint>, valuation: ValuationConfig) -> Self {
        Self::with_store(DraftStore::new(), blueprint, valuation)
    }

    pub fn with_store(
        store: DraftStore,
        blueprint: Arc<FinancingBlueprint>,
        valuation: ValuationConfig,
    ) -> Self {
        Self {
            store,
            blueprint,
            valuation,
            state: ControllerState::Idle,
            in_flight: None,
            call_sequence: 0,
            errors: Vec::new(),
            last_failure: None,
            fallback_to_manual: false,
            receipt: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn draft(&self) -> Option<&ApplicationDraft> {
        self.store.current()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_suspended()
    }

    /// Open a fresh draft. Allowed when idle or after a completed submission.
    pub fn start(&mut self, instrument: InstrumentType) -> Result<&ApplicationDraft, WorkflowError> {
        match self.state {
            ControllerState::Idle | ControllerState::Submitted => {}
            other => return Err(invalid("start a draft", other)),
        }

        self.clear_session_state();
        self.store.init_draft(instrument);
        self.enter_step(0);
        self.current()
    }

    /// Discard the draft and anything in flight; late outcomes become stale.
    pub fn close(&mut self) -> bool {
        let had_draft = self.store.current().is_some();
        if let Some(in_flight) = self.in_flight.take() {
            info!(
                draft_id = %in_flight.ticket.draft_id,
                sequence = in_flight.ticket.sequence,
                "abandoning in-flight call"
            );
        }
        self.store.reset_draft();
        self.clear_session_state();
        self.state = ControllerState::Idle;
        had_draft
    }

    pub fn update_field(
        &mut self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), WorkflowError> {
        self.update_fields([(field.to_string(), value.into())])
    }

    /// Apply several field writes as one replacement; none land if any fails.
    pub fn update_fields(
        &mut self,
        updates: impl IntoIterator<Item = (String, FieldValue)>,
    ) -> Result<(), WorkflowError> {
        self.ensure_editable("update fields")?;

        let mut next = self.current()?.clone();
        let mut touched = Vec::new();
        for (field, value) in updates {
            if field_spec(next.instrument_type, &field).is_some_and(|spec| spec.read_only) {
                return Err(DraftError::ReadOnly(field).into());
            }
            if field == RECEIPT_PATH {
                let FieldValue::ReceiptPath(path) = value else {
                    return Err(DraftError::TypeMismatch {
                        field,
                        expected: super::domain::FieldKind::ReceiptPath,
                    }
                    .into());
                };
                next = self.switch_branch(next, path)?;
            } else {
                next = next.update_field(&field, value)?;
            }
            touched.push(field);
        }

        self.errors.retain(|error| !touched.contains(&error.field));
        self.store.replace(next);
        Ok(())
    }

    /// Pick the warehouse-receipt sub-wizard. Only valid on the choice step;
    /// switching away from a branch drops the fields it owned.
    pub fn choose_receipt_path(&mut self, path: ReceiptPath) -> Result<(), WorkflowError> {
        self.update_fields([(RECEIPT_PATH.to_string(), FieldValue::ReceiptPath(path))])
    }

    pub fn advance(&mut self) -> Result<Transition, WorkflowError> {
        let index = match self.state {
            ControllerState::StepActive { step } => step,
            ControllerState::Idle => return Err(WorkflowError::NoActiveDraft),
            state @ (ControllerState::Verifying { .. } | ControllerState::Submitting) => {
                return Err(WorkflowError::ConcurrencyViolation(format!(
                    "cannot advance while {}",
                    state.label()
                )))
            }
            other => return Err(invalid("advance", other)),
        };

        let draft = self.current()?.clone();
        let step = self.step_definition(&draft, index)?.clone();

        if let Err(error) = validate_step(&step, &draft) {
            debug!(draft_id = %draft.id, step = step.name, issues = error.errors.len(), "step rejected");
            self.errors = error.errors.clone();
            return Err(error.into());
        }
        self.errors.clear();
        self.last_failure = None;

        let effect = match step.side_effect {
            Some(SideEffect::ExtractDocument) if self.fallback_to_manual => {
                debug!(draft_id = %draft.id, "skipping extraction after manual fallback");
                None
            }
            other => other,
        };

        match effect {
            Some(effect) => Ok(self.suspend_for(&draft, index, effect)),
            None => {
                // Manual entry only applies to the step whose collaborator failed.
                self.fallback_to_manual = false;
                Ok(Transition::Moved(self.enter_step(index + 1)))
            }
        }
    }

    pub fn back(&mut self) -> Result<Transition, WorkflowError> {
        let target = match self.state {
            ControllerState::Idle => return Err(WorkflowError::NoActiveDraft),
            ControllerState::StepActive { step: 0 } => return Err(invalid("go back", self.state)),
            ControllerState::StepActive { step } => step - 1,
            ControllerState::Verifying { step, .. } => {
                self.in_flight = None;
                step
            }
            ControllerState::ReviewActive => self.store.active_step().saturating_sub(1),
            other @ (ControllerState::Submitting | ControllerState::Submitted) => {
                return Err(invalid("go back", other))
            }
        };

        self.errors.clear();
        Ok(Transition::Moved(self.enter_step(target)))
    }

    /// Re-check every step, then hand the draft to the submission port.
    pub fn begin_submit(&mut self) -> Result<Transition, WorkflowError> {
        match self.state {
            ControllerState::ReviewActive => {}
            ControllerState::Idle => return Err(WorkflowError::NoActiveDraft),
            state @ (ControllerState::Verifying { .. } | ControllerState::Submitting) => {
                return Err(WorkflowError::ConcurrencyViolation(format!(
                    "cannot submit while {}",
                    state.label()
                )))
            }
            other => return Err(invalid("submit", other)),
        }

        let draft = self.current()?.clone();
        let failure = self
            .blueprint
            .steps_for_draft(&draft)
            .enumerate()
            .find_map(|(index, step)| validate_step(step, &draft).err().map(|error| (index, error)));

        if let Some((index, error)) = failure {
            warn!(draft_id = %draft.id, step = index, "review found an incomplete step");
            self.enter_step(index);
            self.errors = error.errors.clone();
            return Err(error.into());
        }

        self.errors.clear();
        self.last_failure = None;
        let ticket = self.issue_ticket(&draft, false);
        self.state = ControllerState::Submitting;
        info!(draft_id = %draft.id, "submitting application");
        Ok(Transition::Suspended {
            ticket,
            call: PendingCall::Submit(draft),
        })
    }

    /// Fold a collaborator outcome back in.
    pub fn complete(
        &mut self,
        ticket: &Ticket,
        outcome: CallOutcome,
    ) -> Result<Transition, WorkflowError> {
        let document_based = match &self.in_flight {
            Some(in_flight) if &in_flight.ticket == ticket => in_flight.document_based,
            _ => {
                debug!(
                    draft_id = %ticket.draft_id,
                    sequence = ticket.sequence,
                    "dropping stale collaborator outcome"
                );
                return Ok(Transition::Ignored);
            }
        };
        self.in_flight = None;

        match (self.state, outcome) {
            (ControllerState::Verifying { step, effect }, CallOutcome::Verified(result)) => {
                self.finish_verification(step, effect, document_based, result)
            }
            (ControllerState::Verifying { step, effect }, CallOutcome::Scored(result)) => {
                self.finish_scoring(step, effect, result)
            }
            (ControllerState::Submitting, CallOutcome::Submitted(result)) => {
                self.finish_submission(result)
            }
            (state, outcome) => {
                warn!(state = state.label(), ?outcome, "outcome does not match pending call");
                Ok(Transition::Ignored)
            }
        }
    }

    pub fn view(&self) -> WorkflowView {
        let draft = self.store.current().cloned();
        let step = draft.as_ref().and_then(|draft| {
            let index = self.store.active_step();
            let sequence = self.blueprint.steps_for_draft(draft);
            let total = sequence.total();
            self.blueprint
                .step_at(draft, index)
                .map(|step| StepSummary {
                    key: step.key,
                    name: step.name,
                    ordinal: index,
                    total,
                })
        });
        let preview = draft.as_ref().and_then(|draft| {
            financing_preview(draft, FlowVariant::FinancingApplication, &self.valuation)
        });

        WorkflowView {
            state: self.state,
            step,
            errors: self.errors.clone(),
            last_failure: self.last_failure.clone(),
            fallback_to_manual: self.fallback_to_manual,
            busy: self.is_busy(),
            can_advance: matches!(self.state, ControllerState::StepActive { .. }),
            can_back: matches!(
                self.state,
                ControllerState::StepActive { step } if step > 0
            ) || matches!(
                self.state,
                ControllerState::Verifying { .. } | ControllerState::ReviewActive
            ),
            can_submit: self.state == ControllerState::ReviewActive,
            preview,
            receipt: self.receipt.clone(),
            draft,
        }
    }

    fn current(&self) -> Result<&ApplicationDraft, WorkflowError> {
        self.store.current().ok_or(WorkflowError::NoActiveDraft)
    }

    fn ensure_editable(&self, action: &'static str) -> Result<(), WorkflowError> {
        match self.state {
            ControllerState::Idle => Err(WorkflowError::NoActiveDraft),
            ControllerState::Verifying { .. } | ControllerState::Submitting => Err(
                WorkflowError::ConcurrencyViolation(format!("cannot {action} while {}", self.state.label())),
            ),
            ControllerState::Submitted => Err(DraftError::Immutable(
                self.current()?.id.clone(),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn step_definition(
        &self,
        draft: &ApplicationDraft,
        index: usize,
    ) -> Result<&StepDefinition, WorkflowError> {
        self.blueprint
            .step_at(draft, index)
            .ok_or_else(|| invalid("advance", self.state))
    }

    fn switch_branch(
        &self,
        draft: ApplicationDraft,
        path: ReceiptPath,
    ) -> Result<ApplicationDraft, WorkflowError> {
        match self.state {
            ControllerState::StepActive { step: 0 }
                if draft.instrument_type == InstrumentType::WarehouseReceipt => {}
            other => return Err(invalid("choose a receipt option", other)),
        }

        let draft = match draft.receipt_path() {
            Some(previous) if previous != path => {
                let stale = self.blueprint.branch_fields(previous);
                debug!(draft_id = %draft.id, ?previous, ?path, "switching receipt branch");
                draft.clear_fields(stale.iter().copied())?
            }
            _ => draft,
        };

        Ok(draft.update_field(RECEIPT_PATH, path)?)
    }

    fn enter_step(&mut self, index: usize) -> ControllerState {
        let Some(draft) = self.store.current() else {
            self.state = ControllerState::Idle;
            return self.state;
        };

        let last = self.blueprint.steps_for_draft(draft).total().saturating_sub(1);
        let needs_branch = draft.instrument_type == InstrumentType::WarehouseReceipt
            && draft.receipt_path().is_none();
        let index = index.min(last);

        let state = if index == last && !needs_branch {
            ControllerState::ReviewActive
        } else {
            ControllerState::StepActive { step: index }
        };
        debug!(draft_id = %draft.id, step = index, state = state.label(), "entered step");

        self.state = state;
        self.store.set_active_step(index);
        self.state
    }

    fn suspend_for(&mut self, draft: &ApplicationDraft, step: usize, effect: SideEffect) -> Transition {
        let call = match effect {
            SideEffect::ExtractDocument => PendingCall::Verify(VerificationRequest {
                purpose: VerificationPurpose::InvoiceExtraction,
                subject: draft
                    .document(INVOICE_DOCUMENT)
                    .cloned()
                    .map(VerificationSubject::Document)
                    .unwrap_or_else(|| VerificationSubject::Identifier(draft.id.to_string())),
            }),
            SideEffect::VerifyReceipt => PendingCall::Verify(VerificationRequest {
                purpose: VerificationPurpose::ReceiptRegistry,
                subject: self.receipt_subject(draft),
            }),
            SideEffect::ScoreRisk => PendingCall::Score(draft.clone()),
        };

        let document_based = matches!(
            &call,
            PendingCall::Verify(VerificationRequest { subject, .. }) if subject.is_document()
        );
        let ticket = self.issue_ticket(draft, document_based);
        self.state = ControllerState::Verifying { step, effect };
        info!(draft_id = %draft.id, step, effect = effect.label(), "awaiting collaborator");

        Transition::Suspended { ticket, call }
    }

    /// Document first, unless a failed read pushed the user to type the number.
    fn receipt_subject(&self, draft: &ApplicationDraft) -> VerificationSubject {
        let identifier = draft
            .text(ENWR_NUMBER)
            .filter(|number| !number.trim().is_empty())
            .map(str::to_string);
        let document = draft.document(ENWR_DOCUMENT).cloned();

        match (document, identifier) {
            (Some(_), Some(number)) if self.fallback_to_manual => VerificationSubject::Identifier(number),
            (Some(document), _) => VerificationSubject::Document(document),
            (None, Some(number)) => VerificationSubject::Identifier(number),
            (None, None) => VerificationSubject::Identifier(String::new()),
        }
    }

    fn issue_ticket(&mut self, draft: &ApplicationDraft, document_based: bool) -> Ticket {
        self.call_sequence += 1;
        let ticket = Ticket {
            draft_id: draft.id.clone(),
            epoch: self.store.epoch(),
            sequence: self.call_sequence,
        };
        self.in_flight = Some(InFlight {
            ticket: ticket.clone(),
            document_based,
        });
        ticket
    }

    fn finish_verification(
        &mut self,
        step: usize,
        effect: SideEffect,
        document_based: bool,
        result: Result<VerificationResult, PortError>,
    ) -> Result<Transition, WorkflowError> {
        let result = match result {
            Ok(result) if !result.success => {
                return self.verification_failed(step, effect, "the document could not be read".into(), document_based)
            }
            Ok(result) if !result.is_valid => {
                return self.verification_failed(step, effect, "the receipt could not be validated".into(), false)
            }
            Ok(result) if result.is_pledged => {
                return self.verification_failed(step, effect, "the receipt is already pledged".into(), false)
            }
            Ok(result) => result,
            Err(error) => {
                return self.verification_failed(step, effect, error.to_string(), document_based)
            }
        };

        let draft = self.current()?.clone();
        let mut next = draft.clone();
        for (field, value) in result.fields {
            match next.update_field(&field, value) {
                Ok(updated) => next = updated,
                Err(error) => warn!(draft_id = %draft.id, %field, %error, "skipping extracted field"),
            }
        }

        let status = match effect {
            SideEffect::ExtractDocument => DraftStatus::Processing,
            _ => DraftStatus::Verified,
        };
        self.store.replace(promote(next, status));
        self.fallback_to_manual = false;
        info!(draft_id = %draft.id, effect = effect.label(), "verification succeeded");

        Ok(Transition::Moved(self.enter_step(step + 1)))
    }

    fn finish_scoring(
        &mut self,
        step: usize,
        effect: SideEffect,
        result: Result<RiskQuote, PortError>,
    ) -> Result<Transition, WorkflowError> {
        let quote = match result {
            Ok(quote) => quote,
            Err(error) => return self.verification_failed(step, effect, error.to_string(), false),
        };

        let draft = self.current()?;
        let next = draft
            .update_field(RISK_SCORE, u64::from(quote.raw_score.min(1000)))?
            .update_field(MIN_INTEREST, quote.min_interest_percent)?
            .update_field(MAX_INTEREST, quote.max_interest_percent)?;
        info!(draft_id = %next.id, raw_score = quote.raw_score, "risk score recorded");
        self.store.replace(promote(next, DraftStatus::Scored));

        Ok(Transition::Moved(self.enter_step(step + 1)))
    }

    fn finish_submission(
        &mut self,
        result: Result<SubmissionReceipt, PortError>,
    ) -> Result<Transition, WorkflowError> {
        match result {
            Ok(receipt) => {
                let submitted = self.current()?.with_status(DraftStatus::Submitted)?;
                info!(draft_id = %submitted.id, reference = %receipt.reference, "application submitted");
                self.store.replace(submitted);
                self.receipt = Some(receipt);
                self.state = ControllerState::Submitted;
                Ok(Transition::Moved(self.state))
            }
            Err(error) => {
                warn!(%error, "submission failed");
                self.state = ControllerState::ReviewActive;
                self.last_failure = Some(error.to_string());
                Err(WorkflowError::SubmissionFailure(error.to_string()))
            }
        }
    }

    fn verification_failed(
        &mut self,
        step: usize,
        effect: SideEffect,
        reason: String,
        fallback_to_manual: bool,
    ) -> Result<Transition, WorkflowError> {
        warn!(step, effect = effect.label(), %reason, fallback_to_manual, "verification failed");
        self.state = ControllerState::StepActive { step };
        self.last_failure = Some(reason.clone());
        self.fallback_to_manual = self.fallback_to_manual || fallback_to_manual;
        Err(WorkflowError::VerificationFailure {
            reason,
            fallback_to_manual,
        })
    }

    fn clear_session_state(&mut self) {
        self.in_flight = None;
        self.errors.clear();
        self.last_failure = None;
        self.fallback_to_manual = false;
        self.receipt = None;
    }
}

/// Move status forward; a repeated step never drags it back.
fn promote(draft: ApplicationDraft, status: DraftStatus) -> ApplicationDraft {
    match draft.with_status(status) {
        Ok(next) => next,
        Err(_) => draft,
    }
}

fn invalid(action: &'static str, state: ControllerState) -> WorkflowError {
    WorkflowError::InvalidTransition {
        action,
        state: state.label(),
    }
}
