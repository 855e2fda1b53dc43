use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::workflows::financing::schema::*;
use crate::workflows::financing::{
    ControllerState, DraftRegistry, DraftStatus, FinancingSession, InstrumentType, PortError,
    VerificationSubject, WorkflowError,
};

#[tokio::test]
async fn invoice_session_runs_to_submission() {
    let verification = Arc::new(ScriptedVerification::with([Ok(extracted_invoice())]));
    let submission = Arc::new(ScriptedSubmission::default());
    let (session, view) = FinancingSession::start(
        InstrumentType::Invoice,
        collaborators(verification.clone(), submission.clone()),
        &settings(Duration::from_secs(5)),
    )
    .expect("session starts");
    assert_eq!(view.state, ControllerState::StepActive { step: 0 });

    session
        .update_field(INVOICE_DOCUMENT, invoice_pdf())
        .await
        .expect("document accepted");
    let view = session.advance().await.expect("extraction succeeds");
    assert_eq!(view.state, ControllerState::StepActive { step: 1 });
    assert_eq!(
        verification.requests()[0].subject,
        VerificationSubject::Document(invoice_pdf())
    );

    let view = session.advance().await.expect("scoring succeeds");
    assert_eq!(view.state, ControllerState::StepActive { step: 2 });
    session
        .update_field(PREVIEW_CONFIRMED, true)
        .await
        .expect("preview confirmed");
    session.advance().await.expect("preview passes");
    session
        .update_fields(bank_fields())
        .await
        .expect("bank fields");
    let view = session.advance().await.expect("bank passes");
    assert_eq!(view.state, ControllerState::ReviewActive);

    let view = session.submit().await.expect("submission succeeds");
    assert_eq!(view.state, ControllerState::Submitted);
    let draft = view.draft.expect("draft present");
    assert_eq!(draft.status, DraftStatus::Submitted);
    assert_eq!(submission.calls(), vec![draft.id.clone()]);
    assert_eq!(
        view.receipt.map(|receipt| receipt.reference),
        Some(format!("AGC-{}", draft.id))
    );
}

#[tokio::test]
async fn second_advance_while_verifying_is_refused() {
    let gated = Arc::new(GatedVerification::new(extracted_invoice()));
    let (session, _) = FinancingSession::start(
        InstrumentType::Invoice,
        collaborators(gated.clone(), Arc::new(ScriptedSubmission::default())),
        &settings(Duration::from_secs(5)),
    )
    .expect("session starts");
    session
        .update_field(INVOICE_DOCUMENT, invoice_pdf())
        .await
        .expect("document accepted");

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.advance().await }
    });

    let mut view = session.view().await.expect("view while waiting");
    while !view.busy {
        tokio::task::yield_now().await;
        view = session.view().await.expect("view while waiting");
    }
    assert!(!view.can_advance);

    let second = session.advance().await;
    assert!(matches!(second, Err(WorkflowError::ConcurrencyViolation(_))));

    gated.gate.notify_one();
    let view = first
        .await
        .expect("task joins")
        .expect("first advance completes");
    assert_eq!(view.state, ControllerState::StepActive { step: 1 });
}

#[tokio::test]
async fn closing_mid_verification_abandons_the_waiter() {
    let gated = Arc::new(GatedVerification::new(extracted_invoice()));
    let registry = registry(gated.clone());
    let view = registry
        .open(InstrumentType::Invoice)
        .expect("draft opens");
    let draft_id = view.draft.expect("draft").id;
    let session = registry.session(&draft_id).expect("session registered");
    session
        .update_field(INVOICE_DOCUMENT, invoice_pdf())
        .await
        .expect("document accepted");

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.advance().await }
    });
    while !session.view().await.expect("view").busy {
        tokio::task::yield_now().await;
    }

    assert!(registry.close(&draft_id).await);
    gated.gate.notify_one();

    let outcome = pending.await.expect("task joins");
    assert!(matches!(outcome, Err(WorkflowError::Abandoned)));
    assert!(matches!(
        session.view().await,
        Err(WorkflowError::SessionUnavailable)
    ));
    assert!(registry.session(&draft_id).is_none());

    let reopened = registry
        .open(InstrumentType::Invoice)
        .expect("fresh draft");
    assert_eq!(reopened.state, ControllerState::StepActive { step: 0 });
    let fresh = reopened.draft.expect("draft");
    assert_ne!(fresh.id, draft_id);
    assert!(fresh.fields.is_empty());
}

#[tokio::test]
async fn collaborator_overrun_is_reported_as_failure() {
    let (session, _) = FinancingSession::start(
        InstrumentType::Invoice,
        collaborators(
            Arc::new(HangingVerification),
            Arc::new(ScriptedSubmission::default()),
        ),
        &settings(Duration::from_millis(50)),
    )
    .expect("session starts");
    session
        .update_field(INVOICE_DOCUMENT, invoice_pdf())
        .await
        .expect("document accepted");

    let error = session.advance().await.expect_err("call times out");

    match error {
        WorkflowError::VerificationFailure {
            reason,
            fallback_to_manual,
        } => {
            assert_eq!(reason, PortError::Timeout(Duration::from_millis(50)).to_string());
            assert!(fallback_to_manual);
        }
        other => panic!("expected verification failure, got {other:?}"),
    }
    let view = session.view().await.expect("session still alive");
    assert_eq!(view.state, ControllerState::StepActive { step: 0 });
    assert!(view.fallback_to_manual);
}

#[tokio::test]
async fn submitted_draft_is_released() {
    let registry = registry(Arc::new(ScriptedVerification::with([Ok(extracted_invoice())])));
    let draft_id = registry
        .open(InstrumentType::Invoice)
        .expect("draft opens")
        .draft
        .expect("draft")
        .id;
    let session = registry.session(&draft_id).expect("session registered");

    session
        .update_field(INVOICE_DOCUMENT, invoice_pdf())
        .await
        .expect("document accepted");
    session.advance().await.expect("extraction succeeds");
    session.advance().await.expect("scoring succeeds");
    session
        .update_field(PREVIEW_CONFIRMED, true)
        .await
        .expect("preview confirmed");
    session.advance().await.expect("preview passes");
    session
        .update_fields(bank_fields())
        .await
        .expect("bank fields");
    session.advance().await.expect("bank passes");
    assert_eq!(registry.len(), 1);

    let view = session.submit().await.expect("submission succeeds");
    assert_eq!(view.state, ControllerState::Submitted);
    assert!(view.receipt.is_some());

    assert!(registry.is_empty());
    assert!(registry.session(&draft_id).is_none());
    assert!(matches!(
        session.view().await,
        Err(WorkflowError::SessionUnavailable)
    ));
    assert!(!registry.close(&draft_id).await);
}

#[tokio::test]
async fn registry_tracks_open_sessions() {
    let registry = DraftRegistry::new(
        collaborators(
            Arc::new(ScriptedVerification::default()),
            Arc::new(ScriptedSubmission::default()),
        ),
        settings(Duration::from_secs(1)),
    );
    assert!(registry.is_empty());

    let invoice = registry.open(InstrumentType::Invoice).expect("opens");
    let receipt = registry
        .open(InstrumentType::WarehouseReceipt)
        .expect("opens");
    assert_eq!(registry.len(), 2);

    let invoice_id = invoice.draft.expect("draft").id;
    assert!(registry.close(&invoice_id).await);
    assert!(!registry.close(&invoice_id).await);
    assert_eq!(registry.len(), 1);
    assert!(registry
        .session(&receipt.draft.expect("draft").id)
        .is_some());
}
