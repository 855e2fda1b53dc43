use crate::infra::mock_collaborators;
use agricred::config::AppConfig;
use agricred::error::AppError;
use agricred::workflows::financing::schema::*;
use agricred::workflows::financing::{
    ChargeBreakdown, ChargeSchedule, Collaborators, DocumentHandle, FieldValue, FinancingSession,
    InstrumentType, PaymentMethod, ReceiptPath, SequentialDraftIds, SessionSettings, WorkflowView,
};
use agricred::workflows::withdrawal::{
    DeliveryType, ReceiptHolding, WithdrawalError, WithdrawalRequest,
};
use chrono::NaiveDate;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Invoice file to attach; its content type is guessed from the extension.
    #[arg(long)]
    pub(crate) invoice: Option<PathBuf>,
    /// eNWR file to verify instead of looking the receipt up by number.
    #[arg(long)]
    pub(crate) enwr_file: Option<PathBuf>,
    /// eNWR number used for the registry lookup.
    #[arg(long, default_value = "ENWR2024567890")]
    pub(crate) enwr_number: String,
    /// Units to withdraw (defaults to half the verified quantity).
    #[arg(long)]
    pub(crate) withdraw: Option<u64>,
    /// Requested delivery date (YYYY-MM-DD).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) delivery_window: Option<NaiveDate>,
    /// Simulated collaborator latency in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub(crate) latency_ms: u64,
}

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// Units to withdraw
    #[arg(long)]
    pub(crate) quantity: u64,
    /// Units held under the receipt
    #[arg(long)]
    pub(crate) total_quantity: u64,
    /// Days the stock has been stored (defaults to the tariff's billing minimum)
    #[arg(long)]
    pub(crate) days_stored: Option<u32>,
    /// Include the assaying fee
    #[arg(long)]
    pub(crate) assay: bool,
}

pub(crate) fn run_withdrawal_quote(args: QuoteArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let schedule = &config.financing.valuation.charges;

    let charges = quote(&args, schedule)?;
    println!(
        "Withdrawal quote for {} of {} units",
        args.quantity, args.total_quantity
    );
    render_charges(&charges);
    Ok(())
}

fn quote(args: &QuoteArgs, schedule: &ChargeSchedule) -> Result<ChargeBreakdown, WithdrawalError> {
    let mut request = WithdrawalRequest::new(ReceiptHolding {
        enwr_number: String::new(),
        commodity: String::new(),
        total_quantity: args.total_quantity,
    });
    request.set_quantity(args.quantity)?;
    request.set_assay_required(args.assay)?;
    if let Some(days) = args.days_stored {
        request.set_days_stored(days)?;
    }
    request.validate()?;
    Ok(request.charges(schedule))
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let mut settings = config.financing.session_settings();
    settings.draft_ids = Arc::new(SequentialDraftIds::new("demo"));
    let collaborators = mock_collaborators(Duration::from_millis(args.latency_ms));

    println!("AgriCred financing demo");

    let invoice = match &args.invoice {
        Some(path) => read_document(path, "uploads/invoices")?,
        None => describe_document("INV-2024-001.pdf", 182_044, "uploads/invoices"),
    };
    let view = run_invoice_flow(&collaborators, &settings, invoice).await?;
    render_outcome("Invoice discounting", &view);

    let enwr = match &args.enwr_file {
        Some(path) => ReceiptEvidence::Document(read_document(path, "uploads/enwr")?),
        None => ReceiptEvidence::Number(args.enwr_number.clone()),
    };
    let view = run_receipt_flow(&collaborators, &settings, enwr).await?;
    render_outcome("Warehouse receipt financing", &view);

    let draft = view.draft.as_ref();
    let holding = ReceiptHolding {
        enwr_number: draft
            .and_then(|draft| draft.text(ENWR_NUMBER))
            .unwrap_or(args.enwr_number.as_str())
            .to_string(),
        commodity: draft
            .and_then(|draft| draft.text(COMMODITY))
            .unwrap_or("Unknown")
            .to_string(),
        total_quantity: draft.and_then(|draft| draft.number(QUANTITY)).unwrap_or(0),
    };
    let quantity = args.withdraw.unwrap_or(holding.total_quantity / 2);
    run_withdrawal(
        &collaborators,
        &settings,
        holding,
        quantity,
        args.delivery_window,
    )
    .await?;

    Ok(())
}

pub(crate) enum ReceiptEvidence {
    Number(String),
    Document(DocumentHandle),
}

fn describe_document(name: &str, size_bytes: u64, prefix: &str) -> DocumentHandle {
    let content_type = mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    DocumentHandle {
        name: name.to_string(),
        content_type,
        size_bytes,
        storage_key: format!("{prefix}/{name}"),
    }
}

fn read_document(path: &Path, prefix: &str) -> Result<DocumentHandle, AppError> {
    let size = std::fs::metadata(path)?.len();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(describe_document(&name, size, prefix))
}

fn bank_fields(holder: &str) -> Vec<(String, FieldValue)> {
    vec![
        (ACCOUNT_HOLDER_NAME.to_string(), holder.into()),
        (ACCOUNT_NUMBER.to_string(), "50100234567890".into()),
        (CONFIRM_ACCOUNT_NUMBER.to_string(), "50100234567890".into()),
        (IFSC_CODE.to_string(), "HDFC0001234".into()),
        (CONFIRM_ACCURACY.to_string(), true.into()),
    ]
}

pub(crate) async fn run_invoice_flow(
    collaborators: &Collaborators,
    settings: &SessionSettings,
    invoice: DocumentHandle,
) -> Result<WorkflowView, AppError> {
    let (session, _) =
        FinancingSession::start(InstrumentType::Invoice, collaborators.clone(), settings)?;

    session.update_field(INVOICE_DOCUMENT, invoice).await?;
    session.advance().await?;
    let view = session.advance().await?;
    if let Some(preview) = &view.preview {
        println!(
            "  financing preview: {} of {} at {}%",
            preview.estimated_financing, preview.declared_value, preview.advance_rate_percent
        );
        if let Some(risk) = &preview.risk {
            println!("  risk: {}/100 ({})", risk.score_out_of_100, risk.tier_label);
        }
    }

    session.update_field(PREVIEW_CONFIRMED, true).await?;
    session.advance().await?;
    session.update_fields(bank_fields("Ramesh Patil")).await?;
    session.advance().await?;
    let view = session.submit().await?;
    session.close().await;
    Ok(view)
}

pub(crate) async fn run_receipt_flow(
    collaborators: &Collaborators,
    settings: &SessionSettings,
    evidence: ReceiptEvidence,
) -> Result<WorkflowView, AppError> {
    let (session, _) = FinancingSession::start(
        InstrumentType::WarehouseReceipt,
        collaborators.clone(),
        settings,
    )?;

    session.choose_receipt_path(ReceiptPath::Existing).await?;
    session.advance().await?;
    match evidence {
        ReceiptEvidence::Number(number) => session.update_field(ENWR_NUMBER, number).await?,
        ReceiptEvidence::Document(document) => {
            session.update_field(ENWR_DOCUMENT, document).await?
        }
    };
    let view = session.advance().await?;
    if let Some(draft) = &view.draft {
        println!(
            "  verified {} {} at {}",
            draft.number(QUANTITY).unwrap_or(0),
            draft.text(COMMODITY).unwrap_or("-"),
            draft.text(WAREHOUSE_NAME).unwrap_or("-"),
        );
    }

    session.advance().await?;
    session.update_fields(bank_fields("Sunita Deshmukh")).await?;
    session.advance().await?;
    let view = session.submit().await?;
    session.close().await;
    Ok(view)
}

async fn run_withdrawal(
    collaborators: &Collaborators,
    settings: &SessionSettings,
    holding: ReceiptHolding,
    quantity: u64,
    delivery_window: Option<NaiveDate>,
) -> Result<(), AppError> {
    let schedule = &settings.valuation.charges;
    println!(
        "\nStock withdrawal: {quantity} of {} units of {}",
        holding.total_quantity, holding.commodity
    );

    let delivery = if quantity == holding.total_quantity {
        DeliveryType::Full
    } else {
        DeliveryType::Partial
    };
    let mut request = WithdrawalRequest::new(holding);
    request.set_quantity(quantity)?;
    request.set_delivery_type(delivery)?;
    if let Some(window) = delivery_window {
        request.set_delivery_window(window)?;
    }
    request.set_payment_mode(PaymentMethod::Upi)?;
    render_charges(&request.charges(schedule));

    let payment = request
        .pay(collaborators.payments.as_ref(), schedule, settings.collaborator_timeout)
        .await?;
    println!("  paid via {}: {}", payment.method.label(), payment.transaction_id);

    request.acknowledge(true)?;
    let submission = request.submit(schedule)?;
    println!(
        "  delivery requested for {} units ({:?})",
        submission.quantity, delivery
    );
    Ok(())
}

fn render_outcome(title: &str, view: &WorkflowView) {
    let reference = view
        .receipt
        .as_ref()
        .map(|receipt| receipt.reference.as_str())
        .unwrap_or("-");
    let status = view
        .draft
        .as_ref()
        .map(|draft| draft.status.label())
        .unwrap_or("-");
    println!("{title}: {status} (reference {reference})");
}

fn render_charges(charges: &ChargeBreakdown) {
    println!("  storage     {:>10}", charges.storage);
    println!("  handling    {:>10}", charges.handling);
    println!("  assaying    {:>10}", charges.assaying);
    println!("  processing  {:>10}", charges.processing);
    println!("  total       {:>10}", charges.total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use agricred::workflows::financing::{ControllerState, DraftStatus};

    #[test]
    fn document_type_is_guessed_from_extension() {
        assert_eq!(
            describe_document("INV-7.pdf", 10, "uploads").content_type,
            "application/pdf"
        );
        assert_eq!(
            describe_document("ENWR1.zip", 10, "uploads").content_type,
            "application/zip"
        );
        let unknown = describe_document("scan.unknownext", 10, "uploads");
        assert_eq!(unknown.content_type, "application/octet-stream");
        assert_eq!(unknown.storage_key, "uploads/scan.unknownext");
    }

    #[test]
    fn quote_rejects_oversized_withdrawal() {
        let args = QuoteArgs {
            quantity: 150,
            total_quantity: 100,
            days_stored: None,
            assay: false,
        };
        assert!(matches!(
            quote(&args, &ChargeSchedule::default()),
            Err(WithdrawalError::InvalidQuantity { .. })
        ));

        let args = QuoteArgs {
            quantity: 50,
            ..args
        };
        assert_eq!(quote(&args, &ChargeSchedule::default()).unwrap().total, 17_500);
    }

    #[tokio::test]
    async fn demo_flows_submit_against_mocks() {
        let collaborators = mock_collaborators(Duration::ZERO);
        let settings = SessionSettings::default();

        let invoice = describe_document("INV-2024-001.pdf", 182_044, "uploads/invoices");
        let view = run_invoice_flow(&collaborators, &settings, invoice)
            .await
            .unwrap();
        assert_eq!(view.state, ControllerState::Submitted);

        let view = run_receipt_flow(
            &collaborators,
            &settings,
            ReceiptEvidence::Number("ENWR2024567890".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(view.state, ControllerState::Submitted);
        let draft = view.draft.expect("draft");
        assert_eq!(draft.status, DraftStatus::Submitted);
        assert_eq!(draft.text(WAREHOUSE_NAME), Some("ABC Warehouse Pvt Ltd"));
    }
}
