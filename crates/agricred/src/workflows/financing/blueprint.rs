use std::collections::BTreeSet;

use serde::Serialize;

use super::domain::{ApplicationDraft, InstrumentType, ReceiptPath};
use super::schema::*;
use super::validation::{FieldCheck, FieldRule, Presence};

pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

const INVOICE_DOCUMENT_TYPES: &[&str] = &["application/pdf"];
const RECEIPT_DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/xml",
    "text/xml",
    "application/zip",
];
const DEPOSIT_RECEIPT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];
const CHEQUE_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    DocumentUpload,
    DetailConfirmation,
    ScorePreview,
    ReceiptChoice,
    ReceiptVerification,
    ReceiptReview,
    DepositorWarehouse,
    CommodityDetails,
    InsuranceDetails,
    GenerationReview,
    BankDetails,
    ReviewSubmit,
}

/// External work a step triggers once its fields validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// OCR-style extraction from the uploaded invoice.
    ExtractDocument,
    /// Registry lookup for an existing warehouse receipt.
    VerifyReceipt,
    /// Risk scoring over the confirmed invoice details.
    ScoreRisk,
}

impl SideEffect {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExtractDocument => "document extraction",
            Self::VerifyReceipt => "receipt verification",
            Self::ScoreRisk => "risk scoring",
        }
    }
}

/// Immutable description of one wizard step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub key: StepKey,
    pub name: &'static str,
    pub ordinal: usize,
    /// Branch this step belongs to; `None` for steps every path visits.
    pub branch: Option<ReceiptPath>,
    pub checks: Vec<FieldCheck>,
    pub side_effect: Option<SideEffect>,
}

impl StepDefinition {
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|check| check.field)
    }
}

/// The full step table for both instrument types.
#[derive(Debug, Clone)]
pub struct FinancingBlueprint {
    invoice: Vec<StepDefinition>,
    warehouse_head: Vec<StepDefinition>,
    existing_branch: Vec<StepDefinition>,
    generate_branch: Vec<StepDefinition>,
    warehouse_tail: Vec<StepDefinition>,
}

impl FinancingBlueprint {
    pub fn standard() -> Self {
        Self::with_document_limit(DEFAULT_MAX_DOCUMENT_BYTES)
    }

    pub fn with_document_limit(max_document_bytes: u64) -> Self {
        let bank = bank_details_step(max_document_bytes);
        let review = review_step();

        let mut invoice = invoice_steps(max_document_bytes);
        invoice.push(bank.clone());
        invoice.push(review.clone());
        renumber(&mut invoice, 0);

        let warehouse_head = vec![StepDefinition {
            key: StepKey::ReceiptChoice,
            name: "Choose eNWR Option",
            ordinal: 0,
            branch: None,
            checks: vec![FieldCheck::required(RECEIPT_PATH)],
            side_effect: None,
        }];

        let mut existing_branch = existing_receipt_steps(max_document_bytes);
        renumber(&mut existing_branch, 1);
        let mut generate_branch = generate_receipt_steps(max_document_bytes);
        renumber(&mut generate_branch, 1);

        Self {
            invoice,
            warehouse_head,
            existing_branch,
            generate_branch,
            warehouse_tail: vec![bank, review],
        }
    }

    /// Ordered steps for an instrument. For warehouse receipts the sequence
    /// stops at the choice step until a branch is resolved.
    pub fn steps_for(&self, instrument: InstrumentType, path: Option<ReceiptPath>) -> StepSequence<'_> {
        let segments: Vec<&[StepDefinition]> = match (instrument, path) {
            (InstrumentType::Invoice, _) => vec![self.invoice.as_slice()],
            (InstrumentType::WarehouseReceipt, None) => vec![self.warehouse_head.as_slice()],
            (InstrumentType::WarehouseReceipt, Some(path)) => vec![
                self.warehouse_head.as_slice(),
                self.branch(path),
                self.warehouse_tail.as_slice(),
            ],
        };

        StepSequence::new(segments)
    }

    /// Steps for the branch recorded on `draft`.
    pub fn steps_for_draft(&self, draft: &ApplicationDraft) -> StepSequence<'_> {
        self.steps_for(draft.instrument_type, resolve_branch(draft))
    }

    pub fn step_at(&self, draft: &ApplicationDraft, index: usize) -> Option<&StepDefinition> {
        self.steps_for_draft(draft).nth(index)
    }

    fn branch(&self, path: ReceiptPath) -> &[StepDefinition] {
        match path {
            ReceiptPath::Existing => &self.existing_branch,
            ReceiptPath::Generate => &self.generate_branch,
        }
    }

    /// Fields owned exclusively by one branch; cleared when the user switches away.
    pub fn branch_fields(&self, path: ReceiptPath) -> BTreeSet<&'static str> {
        self.branch(path)
            .iter()
            .flat_map(StepDefinition::fields)
            .chain(extra_branch_fields(path).iter().copied())
            .collect()
    }
}

/// Branch selection is a pure function of the draft.
pub fn resolve_branch(draft: &ApplicationDraft) -> Option<ReceiptPath> {
    match draft.instrument_type {
        InstrumentType::Invoice => None,
        InstrumentType::WarehouseReceipt => draft.receipt_path(),
    }
}

/// Fields written by collaborators rather than typed into a branch step.
fn extra_branch_fields(path: ReceiptPath) -> &'static [&'static str] {
    match path {
        ReceiptPath::Existing => &[
            REPOSITORY,
            COMMODITY,
            QUANTITY,
            WAREHOUSE_NAME,
            STORAGE_LOCATION,
            VALID_TILL,
            ISSUED_DATE,
            LIEN_MARKED,
        ],
        ReceiptPath::Generate => &[],
    }
}

/// Lazy, finite sequence over one or more step segments. Clone to restart.
#[derive(Debug, Clone)]
pub struct StepSequence<'a> {
    segments: Vec<&'a [StepDefinition]>,
    segment: usize,
    offset: usize,
}

impl<'a> StepSequence<'a> {
    fn new(segments: Vec<&'a [StepDefinition]>) -> Self {
        Self {
            segments,
            segment: 0,
            offset: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.segments.iter().map(|segment| segment.len()).sum()
    }
}

impl<'a> Iterator for StepSequence<'a> {
    type Item = &'a StepDefinition;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(segment) = self.segments.get(self.segment) {
            if let Some(step) = segment.get(self.offset) {
                self.offset += 1;
                return Some(step);
            }
            self.segment += 1;
            self.offset = 0;
        }
        None
    }
}

fn renumber(steps: &mut [StepDefinition], start: usize) {
    for (index, step) in steps.iter_mut().enumerate() {
        step.ordinal = start + index;
    }
}

fn document_check(field: &'static str, allowed: &'static [&'static str], limit: u64) -> FieldCheck {
    FieldCheck::required(field)
        .rule(FieldRule::DocumentTypes(allowed))
        .rule(FieldRule::MaxDocumentBytes(limit))
}

fn invoice_steps(limit: u64) -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            key: StepKey::DocumentUpload,
            name: "Upload Invoice",
            ordinal: 0,
            branch: None,
            checks: vec![document_check(INVOICE_DOCUMENT, INVOICE_DOCUMENT_TYPES, limit)],
            side_effect: Some(SideEffect::ExtractDocument),
        },
        StepDefinition {
            key: StepKey::DetailConfirmation,
            name: "Confirm Invoice Details",
            ordinal: 0,
            branch: None,
            checks: vec![
                FieldCheck::required(INVOICE_NUMBER),
                FieldCheck::required(BUYER_NAME),
                FieldCheck::required(INVOICE_AMOUNT).rule(FieldRule::Positive),
                FieldCheck::optional(INVOICE_DATE),
                FieldCheck::optional(DUE_DATE).rule(FieldRule::NotBefore(INVOICE_DATE)),
                FieldCheck::optional(BUYER_GSTIN).rule(FieldRule::GstinFormat),
                FieldCheck::optional(SUPPLY_TERMS_DAYS),
            ],
            side_effect: Some(SideEffect::ScoreRisk),
        },
        StepDefinition {
            key: StepKey::ScorePreview,
            name: "Invoice Score Preview",
            ordinal: 0,
            branch: None,
            checks: vec![FieldCheck::required(PREVIEW_CONFIRMED).rule(FieldRule::MustBeTrue)],
            side_effect: None,
        },
    ]
}

fn existing_receipt_steps(limit: u64) -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            key: StepKey::ReceiptVerification,
            name: "Verify Existing eNWR",
            ordinal: 0,
            branch: Some(ReceiptPath::Existing),
            checks: vec![
                FieldCheck::required(ENWR_NUMBER).with_presence(Presence::RequiredUnless(ENWR_DOCUMENT)),
                FieldCheck::optional(ENWR_DOCUMENT)
                    .rule(FieldRule::DocumentTypes(RECEIPT_DOCUMENT_TYPES))
                    .rule(FieldRule::MaxDocumentBytes(limit)),
            ],
            side_effect: Some(SideEffect::VerifyReceipt),
        },
        StepDefinition {
            key: StepKey::ReceiptReview,
            name: "Review eNWR Details",
            ordinal: 0,
            branch: Some(ReceiptPath::Existing),
            checks: vec![FieldCheck::required(ESTIMATED_VALUE).rule(FieldRule::Positive)],
            side_effect: None,
        },
    ]
}

fn generate_receipt_steps(limit: u64) -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            key: StepKey::DepositorWarehouse,
            name: "Depositor & Warehouse Information",
            ordinal: 0,
            branch: Some(ReceiptPath::Generate),
            checks: vec![
                FieldCheck::required(DEPOSITOR_NAME),
                FieldCheck::optional(PAN_AADHAAR).rule(FieldRule::PanOrAadhaarFormat),
                FieldCheck::optional(MOBILE_NUMBER).rule(FieldRule::MobileFormat),
                FieldCheck::required(WAREHOUSE),
                FieldCheck::optional(WAREHOUSE_REG_NO),
                FieldCheck::optional(GPS_COORDINATES),
                FieldCheck::optional(STORAGE_TYPE),
                document_check(DEPOSIT_RECEIPT, DEPOSIT_RECEIPT_TYPES, limit)
                    .with_presence(Presence::Optional),
            ],
            side_effect: None,
        },
        StepDefinition {
            key: StepKey::CommodityDetails,
            name: "Commodity Details",
            ordinal: 0,
            branch: Some(ReceiptPath::Generate),
            checks: vec![
                FieldCheck::required(COMMODITY_NAME),
                FieldCheck::optional(VARIETY_GRADE),
                FieldCheck::required(QUANTITY).rule(FieldRule::Positive),
                FieldCheck::optional(PACK_TYPE),
                FieldCheck::optional(PACK_SIZE),
                FieldCheck::optional(ASSAYING_REQUIRED),
                FieldCheck::optional(ASSAYING_AGENCY)
                    .with_presence(Presence::RequiredWhen(ASSAYING_REQUIRED)),
                FieldCheck::required(DECLARED_VALUE).rule(FieldRule::Positive),
            ],
            side_effect: None,
        },
        StepDefinition {
            key: StepKey::InsuranceDetails,
            name: "Insurance Details",
            ordinal: 0,
            branch: Some(ReceiptPath::Generate),
            checks: vec![FieldCheck::optional(INSURANCE_POLICIES).rule(FieldRule::PoliciesComplete)],
            side_effect: None,
        },
        StepDefinition {
            key: StepKey::GenerationReview,
            name: "Confirm eNWR Details",
            ordinal: 0,
            branch: Some(ReceiptPath::Generate),
            checks: vec![FieldCheck::required(DETAILS_CONFIRMED).rule(FieldRule::MustBeTrue)],
            side_effect: None,
        },
    ]
}

fn bank_details_step(limit: u64) -> StepDefinition {
    StepDefinition {
        key: StepKey::BankDetails,
        name: "Bank Account Details",
        ordinal: 0,
        branch: None,
        checks: vec![
            FieldCheck::required(ACCOUNT_HOLDER_NAME),
            FieldCheck::required(ACCOUNT_NUMBER),
            FieldCheck::required(CONFIRM_ACCOUNT_NUMBER).rule(FieldRule::Matches(ACCOUNT_NUMBER)),
            FieldCheck::required(IFSC_CODE).rule(FieldRule::IfscFormat),
            FieldCheck::optional(UPI_ID),
            document_check(CANCELLED_CHEQUE, CHEQUE_TYPES, limit).with_presence(Presence::Optional),
            FieldCheck::required(CONFIRM_ACCURACY).rule(FieldRule::MustBeTrue),
        ],
        side_effect: None,
    }
}

fn review_step() -> StepDefinition {
    StepDefinition {
        key: StepKey::ReviewSubmit,
        name: "Review & Submit",
        ordinal: 0,
        branch: None,
        checks: Vec::new(),
        side_effect: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(sequence: StepSequence<'_>) -> Vec<StepKey> {
        sequence.map(|step| step.key).collect()
    }

    #[test]
    fn invoice_steps_follow_fixed_order() {
        let blueprint = FinancingBlueprint::standard();
        assert_eq!(
            keys(blueprint.steps_for(InstrumentType::Invoice, None)),
            vec![
                StepKey::DocumentUpload,
                StepKey::DetailConfirmation,
                StepKey::ScorePreview,
                StepKey::BankDetails,
                StepKey::ReviewSubmit,
            ]
        );
    }

    #[test]
    fn warehouse_sequence_waits_for_branch() {
        let blueprint = FinancingBlueprint::standard();
        assert_eq!(
            keys(blueprint.steps_for(InstrumentType::WarehouseReceipt, None)),
            vec![StepKey::ReceiptChoice]
        );
        assert_eq!(
            keys(blueprint.steps_for(InstrumentType::WarehouseReceipt, Some(ReceiptPath::Existing))),
            vec![
                StepKey::ReceiptChoice,
                StepKey::ReceiptVerification,
                StepKey::ReceiptReview,
                StepKey::BankDetails,
                StepKey::ReviewSubmit,
            ]
        );
        assert_eq!(
            keys(blueprint.steps_for(InstrumentType::WarehouseReceipt, Some(ReceiptPath::Generate))),
            vec![
                StepKey::ReceiptChoice,
                StepKey::DepositorWarehouse,
                StepKey::CommodityDetails,
                StepKey::InsuranceDetails,
                StepKey::GenerationReview,
                StepKey::BankDetails,
                StepKey::ReviewSubmit,
            ]
        );
    }

    #[test]
    fn sequence_restarts_from_a_clone() {
        let blueprint = FinancingBlueprint::standard();
        let mut sequence = blueprint.steps_for(InstrumentType::Invoice, None);
        let restart = sequence.clone();

        sequence.next();
        sequence.next();

        assert_eq!(sequence.count(), 3);
        assert_eq!(restart.total(), 5);
        assert_eq!(restart.count(), 5);
    }

    #[test]
    fn branch_fields_do_not_include_shared_steps() {
        let blueprint = FinancingBlueprint::standard();
        let existing = blueprint.branch_fields(ReceiptPath::Existing);
        let generate = blueprint.branch_fields(ReceiptPath::Generate);

        assert!(existing.contains(ENWR_NUMBER));
        assert!(existing.contains(ESTIMATED_VALUE));
        assert!(generate.contains(DEPOSITOR_NAME));
        assert!(generate.contains(QUANTITY));
        assert!(!existing.contains(IFSC_CODE));
        assert!(!generate.contains(RECEIPT_PATH));
    }

    #[test]
    fn ordinals_are_positions_within_the_sequence() {
        let blueprint = FinancingBlueprint::standard();
        for (index, step) in blueprint
            .steps_for(InstrumentType::WarehouseReceipt, Some(ReceiptPath::Generate))
            .take(5)
            .enumerate()
        {
            assert_eq!(step.ordinal, index);
        }
    }
}
