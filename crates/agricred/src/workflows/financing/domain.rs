use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for in-progress financing drafts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collateral backing a financing application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstrumentType {
    Invoice,
    WarehouseReceipt,
}

impl InstrumentType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Invoice => "Invoice",
            Self::WarehouseReceipt => "eNWR",
        }
    }
}

/// Lifecycle of a draft. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Processing,
    Verified,
    Scored,
    Submitted,
}

impl DraftStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Processing => 1,
            Self::Verified | Self::Scored => 2,
            Self::Submitted => 3,
        }
    }

    /// `verified` and `scored` share a tier; neither may replace the other.
    pub const fn can_advance_to(self, next: Self) -> bool {
        self as u8 == next as u8 || next.rank() > self.rank()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Processing => "Processing",
            Self::Verified => "Verified",
            Self::Scored => "Scored",
            Self::Submitted => "Submitted",
        }
    }
}

/// Sub-option of the warehouse-receipt wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptPath {
    Existing,
    Generate,
}

/// Metadata for an uploaded file; the bytes themselves live in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_key: String,
}

/// One row of the insurance schedule captured while generating a new receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub policy_name: String,
    pub policy_number: String,
    pub insured_amount: u64,
    pub validity_from: NaiveDate,
    pub validity_to: NaiveDate,
    pub company_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Flag,
    Document,
    ReceiptPath,
    Policies,
}

/// Value stored under a draft field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(u64),
    Date(NaiveDate),
    Flag(bool),
    Document(DocumentHandle),
    ReceiptPath(ReceiptPath),
    Policies(Vec<InsurancePolicy>),
}

impl FieldValue {
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Number(_) => FieldKind::Number,
            Self::Date(_) => FieldKind::Date,
            Self::Flag(_) => FieldKind::Flag,
            Self::Document(_) => FieldKind::Document,
            Self::ReceiptPath(_) => FieldKind::ReceiptPath,
            Self::Policies(_) => FieldKind::Policies,
        }
    }

    /// Whitespace-only text and empty policy lists count as unset.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Policies(policies) => policies.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DocumentHandle> for FieldValue {
    fn from(value: DocumentHandle) -> Self {
        Self::Document(value)
    }
}

impl From<ReceiptPath> for FieldValue {
    fn from(value: ReceiptPath) -> Self {
        Self::ReceiptPath(value)
    }
}

/// The in-progress financing application record.
///
/// Drafts are values: every mutation produces a new draft through
/// [`ApplicationDraft::update_field`], so a snapshot handed to a collaborator
/// can never observe later edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub id: DraftId,
    pub instrument_type: InstrumentType,
    pub status: DraftStatus,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ApplicationDraft {
    pub fn new(id: DraftId, instrument_type: InstrumentType) -> Self {
        Self {
            id,
            instrument_type,
            status: DraftStatus::Draft,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn is_blank(&self, field: &str) -> bool {
        self.get(field).map(FieldValue::is_blank).unwrap_or(true)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.get(field) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn number(&self, field: &str) -> Option<u64> {
        match self.get(field) {
            Some(FieldValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.get(field) {
            Some(FieldValue::Date(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, field: &str) -> bool {
        matches!(self.get(field), Some(FieldValue::Flag(true)))
    }

    pub fn document(&self, field: &str) -> Option<&DocumentHandle> {
        match self.get(field) {
            Some(FieldValue::Document(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn receipt_path(&self) -> Option<ReceiptPath> {
        match self.get(super::schema::RECEIPT_PATH) {
            Some(FieldValue::ReceiptPath(path)) => Some(*path),
            _ => None,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.status == DraftStatus::Submitted
    }
}
