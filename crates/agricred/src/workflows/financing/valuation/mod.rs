mod config;

pub use config::{AdvanceRateTable, ChargeSchedule, FlowVariant, ValuationConfig};

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationDraft, InstrumentType, ReceiptPath};
use super::schema::{
    DECLARED_VALUE, ESTIMATED_VALUE, INVOICE_AMOUNT, MAX_INTEREST, MIN_INTEREST, RISK_SCORE,
};

/// `floor(declared_value * advance_rate_percent / 100)`.
pub fn estimated_financing(declared_value: u64, advance_rate_percent: u8) -> u64 {
    let scaled = declared_value as u128 * advance_rate_percent as u128 / 100;
    scaled.min(u64::MAX as u128) as u64
}

/// Options that change the withdrawal tariff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeFlags {
    pub assay_required: bool,
}

/// Itemised withdrawal charges. Only constructed through
/// [`withdrawal_charges`], so `total` always equals the sum of the parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeBreakdown {
    pub storage: u64,
    pub handling: u64,
    pub assaying: u64,
    pub processing: u64,
    pub total: u64,
}

pub fn withdrawal_charges(
    quantity: u64,
    days_stored: u32,
    flags: ChargeFlags,
    schedule: &ChargeSchedule,
) -> ChargeBreakdown {
    let storage = quantity
        .saturating_mul(schedule.storage_rate_per_unit_per_day)
        .saturating_mul(days_stored as u64);
    let handling = quantity.saturating_mul(schedule.handling_rate_per_unit);
    let assaying = if flags.assay_required {
        schedule.assay_fee
    } else {
        0
    };
    let processing = schedule.processing_fee;

    ChargeBreakdown {
        storage,
        handling,
        assaying,
        processing,
        total: storage
            .saturating_add(handling)
            .saturating_add(assaying)
            .saturating_add(processing),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        }
    }
}

/// Scale a 0..=1000 engine score down to 0..=100, truncating.
pub fn normalized_score(raw_score_out_of_1000: u16) -> u16 {
    raw_score_out_of_1000 / 10
}

/// `>= 80` low, `60..=79` medium, below 60 high, on the normalized scale.
pub fn risk_tier(raw_score_out_of_1000: u16) -> RiskTier {
    match normalized_score(raw_score_out_of_1000) {
        80.. => RiskTier::Low,
        60..=79 => RiskTier::Medium,
        _ => RiskTier::High,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskPreview {
    pub raw_score: u16,
    pub score_out_of_100: u16,
    pub tier: RiskTier,
    pub tier_label: &'static str,
    pub min_interest_percent: Option<u64>,
    pub max_interest_percent: Option<u64>,
}

/// Derived figures shown beside the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancingPreview {
    pub instrument_type: InstrumentType,
    pub declared_value: u64,
    pub advance_rate_percent: u8,
    pub estimated_financing: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskPreview>,
}

/// Value the advance rate applies to, if the draft carries one yet.
pub fn declared_value(draft: &ApplicationDraft) -> Option<u64> {
    match draft.instrument_type {
        InstrumentType::Invoice => draft.number(INVOICE_AMOUNT),
        InstrumentType::WarehouseReceipt => match draft.receipt_path() {
            Some(ReceiptPath::Existing) => draft.number(ESTIMATED_VALUE),
            Some(ReceiptPath::Generate) => draft.number(DECLARED_VALUE),
            None => None,
        },
    }
}

pub fn financing_preview(
    draft: &ApplicationDraft,
    variant: FlowVariant,
    config: &ValuationConfig,
) -> Option<FinancingPreview> {
    let value = declared_value(draft)?;
    let rate = config
        .advance_rates
        .rate_for(draft.instrument_type, variant);

    let risk = draft.number(RISK_SCORE).map(|raw| {
        let raw = raw.min(1000) as u16;
        let tier = risk_tier(raw);
        RiskPreview {
            raw_score: raw,
            score_out_of_100: normalized_score(raw),
            tier,
            tier_label: tier.label(),
            min_interest_percent: draft.number(MIN_INTEREST),
            max_interest_percent: draft.number(MAX_INTEREST),
        }
    });

    Some(FinancingPreview {
        instrument_type: draft.instrument_type,
        declared_value: value,
        advance_rate_percent: rate,
        estimated_financing: estimated_financing(value, rate),
        risk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::financing::domain::DraftId;
    use crate::workflows::financing::schema::RECEIPT_PATH;

    #[test]
    fn financing_is_floored_percentage_of_value() {
        assert_eq!(estimated_financing(250_000, 80), 200_000);
        assert_eq!(estimated_financing(300_000, 70), 210_000);
        assert_eq!(estimated_financing(999, 70), 699);
        assert_eq!(estimated_financing(0, 80), 0);
    }

    #[test]
    fn risk_tier_boundaries_are_exact() {
        assert_eq!(risk_tier(800), RiskTier::Low);
        assert_eq!(risk_tier(799), RiskTier::Medium);
        assert_eq!(risk_tier(600), RiskTier::Medium);
        assert_eq!(risk_tier(599), RiskTier::High);
        assert_eq!(risk_tier(1000), RiskTier::Low);
        assert_eq!(risk_tier(0), RiskTier::High);
        assert_eq!(risk_tier(800).label(), "Low Risk");
    }

    #[test]
    fn charge_total_matches_components() {
        let schedule = ChargeSchedule::default();
        for quantity in [0, 1, 50, 100, 12_345] {
            for days in [0, 1, 30] {
                for assay_required in [false, true] {
                    let charges =
                        withdrawal_charges(quantity, days, ChargeFlags { assay_required }, &schedule);
                    assert_eq!(
                        charges.total,
                        charges.storage + charges.handling + charges.assaying + charges.processing
                    );
                }
            }
        }
    }

    #[test]
    fn charges_follow_the_schedule() {
        let charges = withdrawal_charges(
            50,
            1,
            ChargeFlags {
                assay_required: true,
            },
            &ChargeSchedule::default(),
        );

        assert_eq!(charges.storage, 12_000);
        assert_eq!(charges.handling, 5_000);
        assert_eq!(charges.assaying, 2_000);
        assert_eq!(charges.processing, 500);
        assert_eq!(charges.total, 19_500);
    }

    #[test]
    fn upload_flow_quotes_warehouse_receipts_at_seventy_percent() {
        let draft = ApplicationDraft::new(DraftId("d-1".into()), InstrumentType::WarehouseReceipt)
            .update_field(RECEIPT_PATH, ReceiptPath::Existing)
            .and_then(|draft| draft.update_field(ESTIMATED_VALUE, 300_000u64))
            .expect("fields accepted");
        let config = ValuationConfig::default();

        let upload = financing_preview(&draft, FlowVariant::InstrumentUpload, &config)
            .expect("value present");
        let application = financing_preview(&draft, FlowVariant::FinancingApplication, &config)
            .expect("value present");

        assert_eq!(upload.estimated_financing, 210_000);
        assert_eq!(application.estimated_financing, 240_000);
    }

    #[test]
    fn preview_is_absent_without_declared_value() {
        let draft = ApplicationDraft::new(DraftId("d-2".into()), InstrumentType::Invoice);
        assert!(financing_preview(
            &draft,
            FlowVariant::FinancingApplication,
            &ValuationConfig::default()
        )
        .is_none());
    }
}
