use agricred::workflows::financing::schema::*;
use agricred::workflows::financing::{
    ApplicationDraft, Collaborators, FieldValue, PaymentMethod, PaymentPort, PaymentResult,
    PortError, RiskQuote, ScoringPort, SubmissionPort, SubmissionReceipt, VerificationPort,
    VerificationPurpose, VerificationRequest, VerificationResult, VerificationSubject,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stands in for OCR extraction and the NeRL registry.
pub(crate) struct MockVerification {
    latency: Duration,
}

#[async_trait]
impl VerificationPort for MockVerification {
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResult, PortError> {
        tokio::time::sleep(self.latency).await;
        debug!(purpose = ?request.purpose, "mock verification answered");

        let result = match (request.purpose, request.subject) {
            (VerificationPurpose::InvoiceExtraction, _) => extracted_invoice(),
            (VerificationPurpose::ReceiptRegistry, VerificationSubject::Identifier(number)) => {
                registry_lookup(&number)
            }
            (VerificationPurpose::ReceiptRegistry, VerificationSubject::Document(_)) => {
                parsed_receipt_file()
            }
        };
        Ok(result)
    }
}

type Fields = BTreeMap<String, FieldValue>;

fn put_date(fields: &mut Fields, field: &str, (year, month, day): (i32, u32, u32)) {
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        fields.insert(field.to_string(), date.into());
    }
}

fn extracted_invoice() -> VerificationResult {
    let mut fields = Fields::new();
    fields.insert(INVOICE_NUMBER.to_string(), "INV-2024-001".into());
    fields.insert(BUYER_NAME.to_string(), "Reliance Retail Ltd.".into());
    fields.insert(INVOICE_AMOUNT.to_string(), 250_000u64.into());
    put_date(&mut fields, INVOICE_DATE, (2024, 6, 15));
    put_date(&mut fields, DUE_DATE, (2024, 7, 15));
    fields.insert(BUYER_GSTIN.to_string(), "27AABCR1234M1Z5".into());
    fields.insert(SUPPLY_TERMS_DAYS.to_string(), 30u64.into());
    VerificationResult::extracted(fields)
}

fn registry_lookup(number: &str) -> VerificationResult {
    let mut fields = Fields::new();
    fields.insert(ENWR_NUMBER.to_string(), number.into());
    fields.insert(REPOSITORY.to_string(), "NeRL".into());
    fields.insert(COMMODITY.to_string(), "Wheat".into());
    fields.insert(QUANTITY.to_string(), 100u64.into());
    fields.insert(WAREHOUSE_NAME.to_string(), "ABC Warehouse Pvt Ltd".into());
    fields.insert(STORAGE_LOCATION.to_string(), "Rajasthan".into());
    put_date(&mut fields, VALID_TILL, (2024, 12, 31));
    put_date(&mut fields, ISSUED_DATE, (2024, 6, 1));
    fields.insert(LIEN_MARKED.to_string(), false.into());
    fields.insert(ESTIMATED_VALUE.to_string(), 640_000u64.into());
    VerificationResult::extracted(fields)
}

fn parsed_receipt_file() -> VerificationResult {
    let mut fields = Fields::new();
    fields.insert(ENWR_NUMBER.to_string(), "ENWR2024567890".into());
    fields.insert(REPOSITORY.to_string(), "NeRL".into());
    fields.insert(COMMODITY.to_string(), "Wheat".into());
    fields.insert(QUANTITY.to_string(), 200u64.into());
    fields.insert(WAREHOUSE_NAME.to_string(), "Maharashtra State Warehouse".into());
    fields.insert(STORAGE_LOCATION.to_string(), "Pune, Maharashtra".into());
    put_date(&mut fields, ISSUED_DATE, (2025, 6, 25));
    fields.insert(LIEN_MARKED.to_string(), false.into());
    fields.insert(ESTIMATED_VALUE.to_string(), 640_000u64.into());
    VerificationResult::extracted(fields)
}

pub(crate) struct MockScoring {
    latency: Duration,
}

#[async_trait]
impl ScoringPort for MockScoring {
    async fn score(&self, _draft: &ApplicationDraft) -> Result<RiskQuote, PortError> {
        tokio::time::sleep(self.latency).await;
        Ok(RiskQuote {
            raw_score: 720,
            min_interest_percent: 11,
            max_interest_percent: 14,
        })
    }
}

#[derive(Default)]
pub(crate) struct MockSubmission {
    sequence: AtomicU64,
}

#[async_trait]
impl SubmissionPort for MockSubmission {
    async fn submit(&self, draft: &ApplicationDraft) -> Result<SubmissionReceipt, PortError> {
        let number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(draft_id = %draft.id, number, "mock submission accepted");
        Ok(SubmissionReceipt {
            reference: format!("AGC-{}-{number:04}", Utc::now().format("%Y%m%d")),
            submitted_at: Utc::now(),
        })
    }
}

pub(crate) struct MockPayments {
    latency: Duration,
    sequence: AtomicU64,
}

#[async_trait]
impl PaymentPort for MockPayments {
    async fn process_payment(
        &self,
        amount: u64,
        method: PaymentMethod,
    ) -> Result<PaymentResult, PortError> {
        tokio::time::sleep(self.latency).await;
        let number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(PaymentResult {
            transaction_id: format!("TXN{number:08}"),
            amount,
            method,
            processed_at: Utc::now(),
        })
    }
}

/// In-process collaborators answering with fixed data after `latency`.
pub(crate) fn mock_collaborators(latency: Duration) -> Collaborators {
    Collaborators {
        verification: Arc::new(MockVerification { latency }),
        scoring: Arc::new(MockScoring { latency }),
        submission: Arc::new(MockSubmission::default()),
        payments: Arc::new(MockPayments {
            latency,
            sequence: AtomicU64::new(0),
        }),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
