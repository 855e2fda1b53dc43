//! Field catalogue for each instrument type.
//!
//! Field names are shared constants so step definitions, validation rules and
//! collaborator adapters all agree on spelling.

use super::domain::{FieldKind, FieldValue, InstrumentType};

// invoice
pub const INVOICE_DOCUMENT: &str = "invoice_document";
pub const INVOICE_NUMBER: &str = "invoice_number";
pub const BUYER_NAME: &str = "buyer_name";
pub const INVOICE_AMOUNT: &str = "invoice_amount";
pub const INVOICE_DATE: &str = "invoice_date";
pub const DUE_DATE: &str = "due_date";
pub const BUYER_GSTIN: &str = "buyer_gstin";
pub const SUPPLY_TERMS_DAYS: &str = "supply_terms_days";
pub const RISK_SCORE: &str = "risk_score";
pub const MIN_INTEREST: &str = "min_interest";
pub const MAX_INTEREST: &str = "max_interest";
pub const PREVIEW_CONFIRMED: &str = "preview_confirmed";

// warehouse receipt, shared
pub const RECEIPT_PATH: &str = "receipt_path";
pub const QUANTITY: &str = "quantity";

// warehouse receipt, existing branch
pub const ENWR_NUMBER: &str = "enwr_number";
pub const ENWR_DOCUMENT: &str = "enwr_document";
pub const REPOSITORY: &str = "repository";
pub const COMMODITY: &str = "commodity";
pub const WAREHOUSE_NAME: &str = "warehouse_name";
pub const STORAGE_LOCATION: &str = "storage_location";
pub const VALID_TILL: &str = "valid_till";
pub const ISSUED_DATE: &str = "issued_date";
pub const LIEN_MARKED: &str = "lien_marked";
pub const ESTIMATED_VALUE: &str = "estimated_value";

// warehouse receipt, generate branch
pub const DEPOSITOR_NAME: &str = "depositor_name";
pub const PAN_AADHAAR: &str = "pan_aadhaar";
pub const MOBILE_NUMBER: &str = "mobile_number";
pub const WAREHOUSE: &str = "warehouse";
pub const WAREHOUSE_REG_NO: &str = "warehouse_reg_no";
pub const GPS_COORDINATES: &str = "gps_coordinates";
pub const STORAGE_TYPE: &str = "storage_type";
pub const DEPOSIT_RECEIPT: &str = "deposit_receipt";
pub const COMMODITY_NAME: &str = "commodity_name";
pub const VARIETY_GRADE: &str = "variety_grade";
pub const PACK_TYPE: &str = "pack_type";
pub const PACK_SIZE: &str = "pack_size";
pub const ASSAYING_REQUIRED: &str = "assaying_required";
pub const ASSAYING_AGENCY: &str = "assaying_agency";
pub const DECLARED_VALUE: &str = "declared_value";
pub const INSURANCE_POLICIES: &str = "insurance_policies";
pub const DETAILS_CONFIRMED: &str = "details_confirmed";

// bank details, shared by both instruments
pub const ACCOUNT_HOLDER_NAME: &str = "account_holder_name";
pub const ACCOUNT_NUMBER: &str = "account_number";
pub const CONFIRM_ACCOUNT_NUMBER: &str = "confirm_account_number";
pub const IFSC_CODE: &str = "ifsc_code";
pub const UPI_ID: &str = "upi_id";
pub const CANCELLED_CHEQUE: &str = "cancelled_cheque";
pub const CONFIRM_ACCURACY: &str = "confirm_accuracy";

/// How raw input is cleaned up before it lands in a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    None,
    Trim,
    Uppercase,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub normalization: Normalization,
    /// Filled in by a collaborator; user edits are refused.
    pub read_only: bool,
}

const fn spec(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        normalization: Normalization::None,
        read_only: false,
    }
}

const fn attested(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        normalization: Normalization::None,
        read_only: true,
    }
}

const fn trimmed(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        normalization: Normalization::Trim,
        read_only: false,
    }
}

const fn upper(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        normalization: Normalization::Uppercase,
        read_only: false,
    }
}

const BANK_FIELDS: [FieldSpec; 7] = [
    spec(ACCOUNT_HOLDER_NAME, FieldKind::Text),
    trimmed(ACCOUNT_NUMBER),
    trimmed(CONFIRM_ACCOUNT_NUMBER),
    upper(IFSC_CODE),
    trimmed(UPI_ID),
    spec(CANCELLED_CHEQUE, FieldKind::Document),
    spec(CONFIRM_ACCURACY, FieldKind::Flag),
];

const INVOICE_FIELDS: [FieldSpec; 12] = [
    spec(INVOICE_DOCUMENT, FieldKind::Document),
    trimmed(INVOICE_NUMBER),
    spec(BUYER_NAME, FieldKind::Text),
    spec(INVOICE_AMOUNT, FieldKind::Number),
    spec(INVOICE_DATE, FieldKind::Date),
    spec(DUE_DATE, FieldKind::Date),
    upper(BUYER_GSTIN),
    spec(SUPPLY_TERMS_DAYS, FieldKind::Number),
    attested(RISK_SCORE, FieldKind::Number),
    attested(MIN_INTEREST, FieldKind::Number),
    attested(MAX_INTEREST, FieldKind::Number),
    spec(PREVIEW_CONFIRMED, FieldKind::Flag),
];

const WAREHOUSE_FIELDS: [FieldSpec; 29] = [
    spec(RECEIPT_PATH, FieldKind::ReceiptPath),
    spec(QUANTITY, FieldKind::Number),
    upper(ENWR_NUMBER),
    spec(ENWR_DOCUMENT, FieldKind::Document),
    spec(REPOSITORY, FieldKind::Text),
    spec(COMMODITY, FieldKind::Text),
    spec(WAREHOUSE_NAME, FieldKind::Text),
    spec(STORAGE_LOCATION, FieldKind::Text),
    spec(VALID_TILL, FieldKind::Date),
    spec(ISSUED_DATE, FieldKind::Date),
    attested(LIEN_MARKED, FieldKind::Flag),
    attested(ESTIMATED_VALUE, FieldKind::Number),
    spec(DEPOSITOR_NAME, FieldKind::Text),
    upper(PAN_AADHAAR),
    trimmed(MOBILE_NUMBER),
    spec(WAREHOUSE, FieldKind::Text),
    upper(WAREHOUSE_REG_NO),
    trimmed(GPS_COORDINATES),
    spec(STORAGE_TYPE, FieldKind::Text),
    spec(DEPOSIT_RECEIPT, FieldKind::Document),
    spec(COMMODITY_NAME, FieldKind::Text),
    spec(VARIETY_GRADE, FieldKind::Text),
    spec(PACK_TYPE, FieldKind::Text),
    spec(PACK_SIZE, FieldKind::Text),
    spec(ASSAYING_REQUIRED, FieldKind::Flag),
    spec(ASSAYING_AGENCY, FieldKind::Text),
    spec(DECLARED_VALUE, FieldKind::Number),
    spec(INSURANCE_POLICIES, FieldKind::Policies),
    spec(DETAILS_CONFIRMED, FieldKind::Flag),
];

/// Look up a field in the schema of `instrument`.
pub fn field_spec(instrument: InstrumentType, name: &str) -> Option<&'static FieldSpec> {
    let own: &'static [FieldSpec] = match instrument {
        InstrumentType::Invoice => &INVOICE_FIELDS,
        InstrumentType::WarehouseReceipt => &WAREHOUSE_FIELDS,
    };

    own.iter()
        .chain(BANK_FIELDS.iter())
        .find(|spec| spec.name == name)
}

pub fn field_names(instrument: InstrumentType) -> Vec<&'static str> {
    let own: &'static [FieldSpec] = match instrument {
        InstrumentType::Invoice => &INVOICE_FIELDS,
        InstrumentType::WarehouseReceipt => &WAREHOUSE_FIELDS,
    };

    own.iter()
        .chain(BANK_FIELDS.iter())
        .map(|spec| spec.name)
        .collect()
}

impl FieldSpec {
    pub(crate) fn normalize(&self, value: FieldValue) -> FieldValue {
        match (self.normalization, value) {
            (Normalization::Trim, FieldValue::Text(text)) => FieldValue::Text(text.trim().to_string()),
            (Normalization::Uppercase, FieldValue::Text(text)) => {
                FieldValue::Text(text.trim().to_ascii_uppercase())
            }
            (_, other) => other,
        }
    }
}
