use serde::{Deserialize, Serialize};

use super::super::domain::InstrumentType;

/// Screen the advance rate is quoted from.
///
/// The financing wizard and the instrument upload modal quote warehouse
/// receipts at different rates, so the rate is keyed by both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVariant {
    FinancingApplication,
    InstrumentUpload,
}

/// Percentage of declared value offered as financing, per instrument and flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceRateTable {
    pub invoice: u8,
    pub invoice_upload: u8,
    pub warehouse_receipt: u8,
    pub warehouse_receipt_upload: u8,
}

impl AdvanceRateTable {
    pub fn rate_for(&self, instrument: InstrumentType, variant: FlowVariant) -> u8 {
        match (instrument, variant) {
            (InstrumentType::Invoice, FlowVariant::FinancingApplication) => self.invoice,
            (InstrumentType::Invoice, FlowVariant::InstrumentUpload) => self.invoice_upload,
            (InstrumentType::WarehouseReceipt, FlowVariant::FinancingApplication) => {
                self.warehouse_receipt
            }
            (InstrumentType::WarehouseReceipt, FlowVariant::InstrumentUpload) => {
                self.warehouse_receipt_upload
            }
        }
    }
}

impl Default for AdvanceRateTable {
    fn default() -> Self {
        Self {
            invoice: 80,
            invoice_upload: 80,
            warehouse_receipt: 80,
            warehouse_receipt_upload: 70,
        }
    }
}

/// Warehouse tariff applied to stock withdrawals, in whole rupees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeSchedule {
    pub storage_rate_per_unit_per_day: u64,
    pub handling_rate_per_unit: u64,
    pub assay_fee: u64,
    pub processing_fee: u64,
    /// Days billed when the stored duration is unknown.
    pub default_days_stored: u32,
}

impl Default for ChargeSchedule {
    fn default() -> Self {
        Self {
            storage_rate_per_unit_per_day: 240,
            handling_rate_per_unit: 100,
            assay_fee: 2_000,
            processing_fee: 500,
            default_days_stored: 1,
        }
    }
}

/// Tunable inputs for every derived figure the workflow shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationConfig {
    pub advance_rates: AdvanceRateTable,
    pub charges: ChargeSchedule,
}
