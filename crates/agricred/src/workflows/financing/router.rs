use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::domain::{DraftId, FieldValue, InstrumentType, ReceiptPath};
use super::error::WorkflowError;
use super::session::{DraftRegistry, ViewResult};
use super::validation::quantity_within;
use super::valuation::{withdrawal_charges, ChargeBreakdown, ChargeFlags};

#[derive(Debug, Deserialize)]
pub struct OpenDraftRequest {
    pub instrument_type: InstrumentType,
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdateRequest {
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Deserialize)]
pub struct BranchRequest {
    pub receipt_path: ReceiptPath,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalQuoteRequest {
    pub quantity: u64,
    pub total_quantity: u64,
    #[serde(default)]
    pub days_stored: Option<u32>,
    #[serde(default)]
    pub assay_required: bool,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalQuote {
    pub quantity_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charges: Option<ChargeBreakdown>,
}

/// Router exposing draft sessions and the withdrawal tariff.
pub fn financing_router(registry: Arc<DraftRegistry>) -> Router {
    Router::new()
        .route("/api/v1/financing/drafts", post(open_handler))
        .route(
            "/api/v1/financing/drafts/:draft_id",
            get(view_handler).delete(close_handler),
        )
        .route("/api/v1/financing/drafts/:draft_id/fields", put(fields_handler))
        .route("/api/v1/financing/drafts/:draft_id/advance", post(advance_handler))
        .route("/api/v1/financing/drafts/:draft_id/back", post(back_handler))
        .route("/api/v1/financing/drafts/:draft_id/branch", post(branch_handler))
        .route("/api/v1/financing/drafts/:draft_id/submit", post(submit_handler))
        .route("/api/v1/withdrawals/quote", post(quote_handler))
        .with_state(registry)
}

pub(crate) fn error_status(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::ConcurrencyViolation(_) | WorkflowError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::NoActiveDraft | WorkflowError::SessionUnavailable => StatusCode::NOT_FOUND,
        WorkflowError::VerificationFailure { .. } | WorkflowError::SubmissionFailure(_) => {
            StatusCode::BAD_GATEWAY
        }
        WorkflowError::Draft(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Abandoned => StatusCode::GONE,
    }
}

fn error_response(error: WorkflowError) -> Response {
    let status = error_status(&error);
    if status.is_server_error() {
        warn!(%error, "financing request failed upstream");
    }
    (status, Json(error.body())).into_response()
}

fn respond(result: ViewResult, success: StatusCode) -> Response {
    match result {
        Ok(view) => (success, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

fn unknown_draft(draft_id: &str) -> Response {
    let payload = json!({
        "error": "draft not found",
        "draft_id": draft_id,
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

pub(crate) async fn open_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Json(request): Json<OpenDraftRequest>,
) -> Response {
    respond(registry.open(request.instrument_type), StatusCode::CREATED)
}

pub(crate) async fn view_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(session.view().await, StatusCode::OK),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn fields_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
    Json(request): Json<FieldUpdateRequest>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(
            session
                .update_fields(request.fields.into_iter().collect())
                .await,
            StatusCode::OK,
        ),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn advance_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(session.advance().await, StatusCode::OK),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn back_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(session.back().await, StatusCode::OK),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn branch_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
    Json(request): Json<BranchRequest>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(
            session.choose_receipt_path(request.receipt_path).await,
            StatusCode::OK,
        ),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn submit_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
) -> Response {
    match registry.session(&DraftId(draft_id.clone())) {
        Some(session) => respond(session.submit().await, StatusCode::OK),
        None => unknown_draft(&draft_id),
    }
}

pub(crate) async fn close_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Path(draft_id): Path<String>,
) -> Response {
    if registry.close(&DraftId(draft_id.clone())).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        unknown_draft(&draft_id)
    }
}

pub(crate) async fn quote_handler(
    State(registry): State<Arc<DraftRegistry>>,
    Json(request): Json<WithdrawalQuoteRequest>,
) -> Response {
    let schedule = &registry.settings().valuation.charges;
    let quantity_valid = quantity_within(request.quantity, request.total_quantity);
    let charges = quantity_valid.then(|| {
        withdrawal_charges(
            request.quantity,
            request.days_stored.unwrap_or(schedule.default_days_stored),
            ChargeFlags {
                assay_required: request.assay_required,
            },
            schedule,
        )
    });

    let status = if quantity_valid {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (
        status,
        Json(WithdrawalQuote {
            quantity_valid,
            charges,
        }),
    )
        .into_response()
}
