//! Warehouse receipt financing and stock withdrawal through the public session API.

mod common {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use agricred::workflows::financing::schema::*;
    use agricred::workflows::financing::{
        ApplicationDraft, Collaborators, FieldValue, PaymentMethod, PaymentPort, PaymentResult,
        PortError, RiskQuote, ScoringPort, SessionSettings, SubmissionPort, SubmissionReceipt,
        VerificationPort, VerificationRequest, VerificationResult, VerificationSubject,
    };
    use async_trait::async_trait;
    use chrono::Utc;

    /// Answers registry lookups from a queue and remembers what was asked.
    #[derive(Default)]
    pub(super) struct Registry {
        answers: Mutex<VecDeque<VerificationResult>>,
        pub(super) subjects: Mutex<Vec<VerificationSubject>>,
    }

    impl Registry {
        pub(super) fn answering(answers: impl IntoIterator<Item = VerificationResult>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                subjects: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VerificationPort for Registry {
        async fn verify(
            &self,
            request: VerificationRequest,
        ) -> Result<VerificationResult, PortError> {
            self.subjects
                .lock()
                .expect("subject mutex poisoned")
                .push(request.subject);
            self.answers
                .lock()
                .expect("answer mutex poisoned")
                .pop_front()
                .ok_or_else(|| PortError::Unavailable("registry offline".to_string()))
        }
    }

    pub(super) fn wheat_receipt(pledged: bool) -> VerificationResult {
        let mut fields = BTreeMap::new();
        fields.insert(REPOSITORY.to_string(), FieldValue::from("NeRL"));
        fields.insert(COMMODITY.to_string(), FieldValue::from("Wheat"));
        fields.insert(QUANTITY.to_string(), FieldValue::from(200u64));
        fields.insert(
            WAREHOUSE_NAME.to_string(),
            FieldValue::from("Maharashtra State Warehouse"),
        );
        fields.insert(STORAGE_LOCATION.to_string(), FieldValue::from("Pune"));
        fields.insert(ESTIMATED_VALUE.to_string(), FieldValue::from(450_000u64));
        VerificationResult {
            is_pledged: pledged,
            ..VerificationResult::extracted(fields)
        }
    }

    struct UnusedScoring;

    #[async_trait]
    impl ScoringPort for UnusedScoring {
        async fn score(&self, _draft: &ApplicationDraft) -> Result<RiskQuote, PortError> {
            Err(PortError::Unavailable("scoring is not used for receipts".to_string()))
        }
    }

    struct AcceptingSubmission;

    #[async_trait]
    impl SubmissionPort for AcceptingSubmission {
        async fn submit(&self, draft: &ApplicationDraft) -> Result<SubmissionReceipt, PortError> {
            Ok(SubmissionReceipt {
                reference: format!("AGC-WR-{}", draft.id),
                submitted_at: Utc::now(),
            })
        }
    }

    #[derive(Default)]
    pub(super) struct Gateway {
        pub(super) charged: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl PaymentPort for Gateway {
        async fn process_payment(
            &self,
            amount: u64,
            method: PaymentMethod,
        ) -> Result<PaymentResult, PortError> {
            self.charged.lock().expect("charge mutex poisoned").push(amount);
            Ok(PaymentResult {
                transaction_id: "TXN2024WD0001".to_string(),
                amount,
                method,
                processed_at: Utc::now(),
            })
        }
    }

    pub(super) fn collaborators(registry: Arc<Registry>) -> Collaborators {
        Collaborators {
            verification: registry,
            scoring: Arc::new(UnusedScoring),
            submission: Arc::new(AcceptingSubmission),
            payments: Arc::new(Gateway::default()),
        }
    }

    pub(super) fn settings() -> SessionSettings {
        SessionSettings {
            collaborator_timeout: Duration::from_secs(5),
            ..SessionSettings::default()
        }
    }

    pub(super) fn bank_fields() -> Vec<(String, FieldValue)> {
        vec![
            (ACCOUNT_HOLDER_NAME.to_string(), "Sunita Deshmukh".into()),
            (ACCOUNT_NUMBER.to_string(), "32109876543210".into()),
            (CONFIRM_ACCOUNT_NUMBER.to_string(), "32109876543210".into()),
            (IFSC_CODE.to_string(), "sbin0004321".into()),
            (CONFIRM_ACCURACY.to_string(), true.into()),
        ]
    }
}

use std::sync::Arc;
use std::time::Duration;

use agricred::workflows::financing::schema::*;
use agricred::workflows::financing::{
    ChargeSchedule, ControllerState, DraftStatus, FinancingSession, InstrumentType, PaymentMethod,
    ReceiptPath, VerificationSubject, WorkflowError,
};
use agricred::workflows::withdrawal::{
    DeliveryType, PaymentStatus, ReceiptHolding, WithdrawalError, WithdrawalRequest,
};

#[tokio::test]
async fn existing_receipt_is_verified_and_submitted() {
    let registry = Arc::new(common::Registry::answering([common::wheat_receipt(false)]));
    let (session, _) = FinancingSession::start(
        InstrumentType::WarehouseReceipt,
        common::collaborators(registry.clone()),
        &common::settings(),
    )
    .expect("session starts");

    session
        .choose_receipt_path(ReceiptPath::Existing)
        .await
        .expect("branch chosen");
    session.advance().await.expect("choice passes");
    session
        .update_field(ENWR_NUMBER, "ENWR2024567890")
        .await
        .expect("receipt number");

    let view = session.advance().await.expect("registry verifies");
    let draft = view.draft.as_ref().expect("draft");
    assert_eq!(draft.status, DraftStatus::Verified);
    assert_eq!(draft.text(STORAGE_LOCATION), Some("Pune"));
    assert_eq!(view.preview.as_ref().map(|p| p.estimated_financing), Some(360_000));
    assert_eq!(
        registry.subjects.lock().expect("subjects").as_slice(),
        [VerificationSubject::Identifier("ENWR2024567890".to_string())]
    );

    session.advance().await.expect("review passes");
    session
        .update_fields(common::bank_fields())
        .await
        .expect("bank fields");
    let view = session.advance().await.expect("bank passes");
    assert_eq!(view.state, ControllerState::ReviewActive);

    let view = session.submit().await.expect("submission accepted");
    assert_eq!(view.state, ControllerState::Submitted);
    let reference = view.receipt.expect("receipt").reference;
    assert!(reference.starts_with("AGC-WR-draft-"));
}

#[tokio::test]
async fn pledged_receipt_cannot_be_financed() {
    let registry = Arc::new(common::Registry::answering([common::wheat_receipt(true)]));
    let (session, _) = FinancingSession::start(
        InstrumentType::WarehouseReceipt,
        common::collaborators(registry),
        &common::settings(),
    )
    .expect("session starts");

    session
        .choose_receipt_path(ReceiptPath::Existing)
        .await
        .expect("branch chosen");
    session.advance().await.expect("choice passes");
    session
        .update_field(ENWR_NUMBER, "ENWR2024567890")
        .await
        .expect("receipt number");

    let error = session.advance().await.expect_err("pledged receipt rejected");
    assert_eq!(
        error,
        WorkflowError::VerificationFailure {
            reason: "the receipt is already pledged".to_string(),
            fallback_to_manual: false,
        }
    );

    let view = session.view().await.expect("view");
    assert_eq!(view.state, ControllerState::StepActive { step: 1 });
    assert_eq!(view.draft.expect("draft").status, DraftStatus::Draft);
}

#[tokio::test]
async fn switching_branch_discards_existing_receipt_data() {
    let registry = Arc::new(common::Registry::default());
    let (session, _) = FinancingSession::start(
        InstrumentType::WarehouseReceipt,
        common::collaborators(registry),
        &common::settings(),
    )
    .expect("session starts");

    session
        .choose_receipt_path(ReceiptPath::Existing)
        .await
        .expect("branch chosen");
    session.advance().await.expect("choice passes");
    session
        .update_field(ENWR_NUMBER, "ENWR2024567890")
        .await
        .expect("receipt number");
    session.back().await.expect("back to choice");

    let view = session
        .choose_receipt_path(ReceiptPath::Generate)
        .await
        .expect("branch switched");
    let draft = view.draft.expect("draft");
    assert!(draft.is_blank(ENWR_NUMBER));
    assert_eq!(draft.receipt_path(), Some(ReceiptPath::Generate));
    assert_eq!(view.step.expect("step").total, 7);
}

#[tokio::test]
async fn withdrawal_is_paid_once_and_submitted() {
    let gateway = common::Gateway::default();
    let schedule = ChargeSchedule::default();
    let mut request = WithdrawalRequest::new(ReceiptHolding {
        enwr_number: "ENWR2024567890".to_string(),
        commodity: "Wheat".to_string(),
        total_quantity: 200,
    });

    request.set_quantity(0).expect("editable");
    assert!(!request.is_quantity_valid());
    assert!(!request.can_pay());

    request.set_quantity(200).expect("editable");
    request.set_delivery_type(DeliveryType::Full).expect("editable");
    request.set_assay_required(true).expect("editable");
    request.set_payment_mode(PaymentMethod::NetBanking).expect("editable");
    assert!(request.can_pay());

    let expected = 200 * 240 + 200 * 100 + 2_000 + 500;
    assert_eq!(request.charges(&schedule).total, expected);

    let paid = request
        .pay(&gateway, &schedule, Duration::from_secs(5))
        .await
        .expect("payment succeeds")
        .amount;
    assert_eq!(paid, expected);
    assert_eq!(request.payment_status(), PaymentStatus::Success);
    assert_eq!(
        request
            .pay(&gateway, &schedule, Duration::from_secs(5))
            .await
            .expect_err("no second charge"),
        WithdrawalError::AlreadyPaid
    );
    assert_eq!(gateway.charged.lock().expect("charges").as_slice(), [expected]);

    request.acknowledge(true).expect("editable");
    let submission = request.submit(&schedule).expect("submitted");
    assert_eq!(submission.transaction_id, "TXN2024WD0001");
    assert_eq!(submission.delivery_type, Some(DeliveryType::Full));
}
