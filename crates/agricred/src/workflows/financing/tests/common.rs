use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::financing::schema::*;
use crate::workflows::financing::{
    ApplicationDraft, Collaborators, DocumentHandle, DraftId, DraftRegistry, FieldValue,
    FinancingBlueprint, PaymentMethod, PaymentPort, PaymentResult, PendingCall, PortError,
    RiskQuote, ScoringPort, SessionSettings, SubmissionPort, SubmissionReceipt, Ticket,
    Transition, ValuationConfig, VerificationPort, VerificationRequest, VerificationResult,
    WorkflowController,
};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn invoice_pdf() -> DocumentHandle {
    DocumentHandle {
        name: "INV-2024-001.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size_bytes: 182_044,
        storage_key: "uploads/invoices/INV-2024-001.pdf".to_string(),
    }
}

pub(super) fn enwr_xml() -> DocumentHandle {
    DocumentHandle {
        name: "ENWR2024567890.xml".to_string(),
        content_type: "text/xml".to_string(),
        size_bytes: 4_812,
        storage_key: "uploads/enwr/ENWR2024567890.xml".to_string(),
    }
}

pub(super) fn extracted_invoice() -> VerificationResult {
    let mut fields = BTreeMap::new();
    fields.insert(INVOICE_NUMBER.to_string(), FieldValue::from("INV-2024-001"));
    fields.insert(BUYER_NAME.to_string(), FieldValue::from("Reliance Retail Ltd."));
    fields.insert(INVOICE_AMOUNT.to_string(), FieldValue::from(250_000u64));
    fields.insert(INVOICE_DATE.to_string(), FieldValue::from(date(2024, 6, 15)));
    fields.insert(DUE_DATE.to_string(), FieldValue::from(date(2024, 7, 15)));
    fields.insert(BUYER_GSTIN.to_string(), FieldValue::from("27AABCR1234M1Z5"));
    fields.insert(SUPPLY_TERMS_DAYS.to_string(), FieldValue::from(30u64));
    VerificationResult::extracted(fields)
}

pub(super) fn registry_receipt() -> VerificationResult {
    let mut fields = BTreeMap::new();
    fields.insert(REPOSITORY.to_string(), FieldValue::from("NeRL"));
    fields.insert(COMMODITY.to_string(), FieldValue::from("Soybean"));
    fields.insert(QUANTITY.to_string(), FieldValue::from(150u64));
    fields.insert(WAREHOUSE_NAME.to_string(), FieldValue::from("V.P. Patil Warehouse"));
    fields.insert(STORAGE_LOCATION.to_string(), FieldValue::from("Latur"));
    fields.insert(ISSUED_DATE.to_string(), FieldValue::from(date(2024, 3, 1)));
    fields.insert(VALID_TILL.to_string(), FieldValue::from(date(2025, 3, 1)));
    fields.insert(LIEN_MARKED.to_string(), FieldValue::from(false));
    fields.insert(ESTIMATED_VALUE.to_string(), FieldValue::from(500_000u64));
    VerificationResult::extracted(fields)
}

pub(super) fn pledged_receipt() -> VerificationResult {
    VerificationResult {
        is_pledged: true,
        ..registry_receipt()
    }
}

pub(super) fn quote() -> RiskQuote {
    RiskQuote {
        raw_score: 720,
        min_interest_percent: 11,
        max_interest_percent: 14,
    }
}

pub(super) fn receipt(reference: &str) -> SubmissionReceipt {
    SubmissionReceipt {
        reference: reference.to_string(),
        submitted_at: Utc::now(),
    }
}

pub(super) fn bank_fields() -> Vec<(String, FieldValue)> {
    vec![
        (ACCOUNT_HOLDER_NAME.to_string(), "Ramesh Patil".into()),
        (ACCOUNT_NUMBER.to_string(), "50100234567890".into()),
        (CONFIRM_ACCOUNT_NUMBER.to_string(), "50100234567890".into()),
        (IFSC_CODE.to_string(), "hdfc0001234".into()),
        (CONFIRM_ACCURACY.to_string(), true.into()),
    ]
}

pub(super) fn generated_receipt_fields() -> Vec<(String, FieldValue)> {
    vec![
        (DEPOSITOR_NAME.to_string(), "Sunita Deshmukh".into()),
        (PAN_AADHAAR.to_string(), "abcpd1234k".into()),
        (MOBILE_NUMBER.to_string(), "+919823456780".into()),
        (WAREHOUSE.to_string(), "Maharashtra State Warehouse, Pune".into()),
    ]
}

pub(super) fn commodity_fields() -> Vec<(String, FieldValue)> {
    vec![
        (COMMODITY_NAME.to_string(), "Wheat".into()),
        (QUANTITY.to_string(), 200u64.into()),
        (DECLARED_VALUE.to_string(), 440_000u64.into()),
    ]
}

pub(super) fn controller() -> WorkflowController {
    WorkflowController::new(
        Arc::new(FinancingBlueprint::standard()),
        ValuationConfig::default(),
    )
}

pub(super) fn suspended(transition: Transition) -> (Ticket, PendingCall) {
    match transition {
        Transition::Suspended { ticket, call } => (ticket, call),
        other => panic!("expected suspension, got {other:?}"),
    }
}

#[derive(Default)]
pub(super) struct ScriptedVerification {
    script: Mutex<VecDeque<Result<VerificationResult, PortError>>>,
    requests: Mutex<Vec<VerificationRequest>>,
}

impl ScriptedVerification {
    pub(super) fn with(responses: impl IntoIterator<Item = Result<VerificationResult, PortError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().expect("request mutex poisoned").clone()
    }
}

#[async_trait]
impl VerificationPort for ScriptedVerification {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, PortError> {
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .push(request);
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Unavailable("script exhausted".to_string())))
    }
}

/// Holds every call until the gate is opened.
pub(super) struct GatedVerification {
    pub(super) gate: Arc<Notify>,
    result: VerificationResult,
}

impl GatedVerification {
    pub(super) fn new(result: VerificationResult) -> Self {
        Self {
            gate: Arc::new(Notify::new()),
            result,
        }
    }
}

#[async_trait]
impl VerificationPort for GatedVerification {
    async fn verify(&self, _request: VerificationRequest) -> Result<VerificationResult, PortError> {
        self.gate.notified().await;
        Ok(self.result.clone())
    }
}

pub(super) struct HangingVerification;

#[async_trait]
impl VerificationPort for HangingVerification {
    async fn verify(&self, _request: VerificationRequest) -> Result<VerificationResult, PortError> {
        std::future::pending().await
    }
}

pub(super) struct FixedScoring(pub(super) RiskQuote);

#[async_trait]
impl ScoringPort for FixedScoring {
    async fn score(&self, _draft: &ApplicationDraft) -> Result<RiskQuote, PortError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub(super) struct ScriptedSubmission {
    script: Mutex<VecDeque<Result<SubmissionReceipt, PortError>>>,
    calls: Mutex<Vec<DraftId>>,
}

impl ScriptedSubmission {
    pub(super) fn with(responses: impl IntoIterator<Item = Result<SubmissionReceipt, PortError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> Vec<DraftId> {
        self.calls.lock().expect("call mutex poisoned").clone()
    }
}

#[async_trait]
impl SubmissionPort for ScriptedSubmission {
    async fn submit(&self, draft: &ApplicationDraft) -> Result<SubmissionReceipt, PortError> {
        self.calls
            .lock()
            .expect("call mutex poisoned")
            .push(draft.id.clone());
        self.script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(receipt(&format!("AGC-{}", draft.id))))
    }
}

pub(super) struct DeclinedPayments;

#[async_trait]
impl PaymentPort for DeclinedPayments {
    async fn process_payment(
        &self,
        _amount: u64,
        _method: PaymentMethod,
    ) -> Result<PaymentResult, PortError> {
        Err(PortError::Rejected("payments are not part of this flow".to_string()))
    }
}

pub(super) fn collaborators(
    verification: Arc<dyn VerificationPort>,
    submission: Arc<dyn SubmissionPort>,
) -> Collaborators {
    Collaborators {
        verification,
        scoring: Arc::new(FixedScoring(quote())),
        submission,
        payments: Arc::new(DeclinedPayments),
    }
}

pub(super) fn settings(timeout: Duration) -> SessionSettings {
    SessionSettings {
        collaborator_timeout: timeout,
        ..SessionSettings::default()
    }
}

pub(super) fn registry(verification: Arc<dyn VerificationPort>) -> Arc<DraftRegistry> {
    Arc::new(DraftRegistry::new(
        collaborators(verification, Arc::new(ScriptedSubmission::default())),
        settings(Duration::from_secs(5)),
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
