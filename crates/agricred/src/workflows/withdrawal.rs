//! Stock withdrawal against an electronic warehouse receipt.
//!
//! A request is priced from the warehouse tariff, paid once through the
//! [`PaymentPort`], acknowledged and then submitted for delivery.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::workflows::financing::ports::bounded;
use crate::workflows::financing::validation::quantity_within;
use crate::workflows::financing::{
    withdrawal_charges, ChargeBreakdown, ChargeFlags, ChargeSchedule, PaymentMethod, PaymentPort,
    PaymentResult, PortError,
};

/// Stock held under a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptHolding {
    pub enwr_number: String,
    pub commodity: String,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Full,
    Partial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WithdrawalError {
    #[error("quantity {quantity} must be between 1 and {available}")]
    InvalidQuantity { quantity: u64, available: u64 },
    #[error("full delivery must withdraw all {available} units, not {quantity}")]
    FullDeliveryMismatch { quantity: u64, available: u64 },
    #[error("select a payment mode")]
    PaymentModeMissing,
    #[error("a payment is already being processed")]
    PaymentInFlight,
    #[error("charges have already been paid")]
    AlreadyPaid,
    #[error("payment failed: {0}")]
    PaymentFailure(PortError),
    #[error("complete payment before submitting")]
    NotPaid,
    #[error("acknowledge the delivery charges before submitting")]
    NotAcknowledged,
    #[error("withdrawal has already been submitted")]
    AlreadySubmitted,
}

/// Confirmation handed back once a paid request is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalSubmission {
    pub enwr_number: String,
    pub commodity: String,
    pub quantity: u64,
    pub delivery_type: Option<DeliveryType>,
    pub delivery_window: Option<NaiveDate>,
    pub charges: ChargeBreakdown,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalRequest {
    holding: ReceiptHolding,
    quantity: u64,
    delivery_type: Option<DeliveryType>,
    delivery_window: Option<NaiveDate>,
    assay_required: bool,
    reason: String,
    days_stored: Option<u32>,
    payment_mode: Option<PaymentMethod>,
    acknowledged: bool,
    payment_status: PaymentStatus,
    payment: Option<PaymentResult>,
    submitted: bool,
}

impl WithdrawalRequest {
    pub fn new(holding: ReceiptHolding) -> Self {
        Self {
            holding,
            quantity: 0,
            delivery_type: None,
            delivery_window: None,
            assay_required: false,
            reason: String::new(),
            days_stored: None,
            payment_mode: None,
            acknowledged: false,
            payment_status: PaymentStatus::Pending,
            payment: None,
            submitted: false,
        }
    }

    pub fn holding(&self) -> &ReceiptHolding {
        &self.holding
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment(&self) -> Option<&PaymentResult> {
        self.payment.as_ref()
    }

    /// Quantity feeds the charge total, so it is frozen once money moves.
    pub fn set_quantity(&mut self, quantity: u64) -> Result<(), WithdrawalError> {
        self.ensure_charges_open()?;
        self.quantity = quantity;
        Ok(())
    }

    pub fn set_delivery_type(&mut self, delivery_type: DeliveryType) -> Result<(), WithdrawalError> {
        self.ensure_charges_open()?;
        self.delivery_type = Some(delivery_type);
        Ok(())
    }

    pub fn set_assay_required(&mut self, required: bool) -> Result<(), WithdrawalError> {
        self.ensure_charges_open()?;
        self.assay_required = required;
        Ok(())
    }

    pub fn set_days_stored(&mut self, days: u32) -> Result<(), WithdrawalError> {
        self.ensure_charges_open()?;
        self.days_stored = Some(days);
        Ok(())
    }

    pub fn set_delivery_window(&mut self, window: NaiveDate) -> Result<(), WithdrawalError> {
        self.ensure_open()?;
        self.delivery_window = Some(window);
        Ok(())
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) -> Result<(), WithdrawalError> {
        self.ensure_open()?;
        self.reason = reason.into();
        Ok(())
    }

    pub fn set_payment_mode(&mut self, mode: PaymentMethod) -> Result<(), WithdrawalError> {
        self.ensure_charges_open()?;
        self.payment_mode = Some(mode);
        Ok(())
    }

    pub fn acknowledge(&mut self, acknowledged: bool) -> Result<(), WithdrawalError> {
        self.ensure_open()?;
        self.acknowledged = acknowledged;
        Ok(())
    }

    pub fn is_quantity_valid(&self) -> bool {
        quantity_within(self.quantity, self.holding.total_quantity)
    }

    pub fn charges(&self, schedule: &ChargeSchedule) -> ChargeBreakdown {
        withdrawal_charges(
            self.quantity,
            self.days_stored.unwrap_or(schedule.default_days_stored),
            ChargeFlags {
                assay_required: self.assay_required,
            },
            schedule,
        )
    }

    /// Quantity and delivery checks that gate payment.
    pub fn validate(&self) -> Result<(), WithdrawalError> {
        let available = self.holding.total_quantity;
        if !self.is_quantity_valid() {
            return Err(WithdrawalError::InvalidQuantity {
                quantity: self.quantity,
                available,
            });
        }
        if self.delivery_type == Some(DeliveryType::Full) && self.quantity != available {
            return Err(WithdrawalError::FullDeliveryMismatch {
                quantity: self.quantity,
                available,
            });
        }
        Ok(())
    }

    pub fn can_pay(&self) -> bool {
        !self.submitted
            && self.validate().is_ok()
            && self.payment_mode.is_some()
            && matches!(
                self.payment_status,
                PaymentStatus::Pending | PaymentStatus::Failed
            )
    }

    /// Charge the current total, waiting at most `limit` for the gateway.
    ///
    /// The port is never called while an earlier attempt is unresolved or
    /// after one has succeeded. An overrun, or dropping the returned future,
    /// leaves the request `Failed` so the user can retry.
    pub async fn pay(
        &mut self,
        payments: &dyn PaymentPort,
        schedule: &ChargeSchedule,
        limit: Duration,
    ) -> Result<&PaymentResult, WithdrawalError> {
        self.ensure_charges_open()?;
        self.validate()?;
        let method = self.payment_mode.ok_or(WithdrawalError::PaymentModeMissing)?;
        let amount = self.charges(schedule).total;

        let attempt = PaymentAttempt::begin(&mut self.payment_status);
        info!(
            enwr_number = %self.holding.enwr_number,
            amount,
            method = method.label(),
            "processing withdrawal payment"
        );

        match bounded("payment", limit, payments.process_payment(amount, method)).await {
            Ok(result) => {
                info!(transaction_id = %result.transaction_id, amount, "withdrawal payment settled");
                attempt.settle(PaymentStatus::Success);
                Ok(self.payment.insert(result))
            }
            Err(error) => {
                warn!(%error, amount, "withdrawal payment failed");
                attempt.settle(PaymentStatus::Failed);
                Err(WithdrawalError::PaymentFailure(error))
            }
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.submitted && self.payment_status == PaymentStatus::Success && self.acknowledged
    }

    pub fn submit(&mut self, schedule: &ChargeSchedule) -> Result<WithdrawalSubmission, WithdrawalError> {
        self.ensure_open()?;
        let payment = match (&self.payment, self.payment_status) {
            (Some(payment), PaymentStatus::Success) => payment,
            _ => return Err(WithdrawalError::NotPaid),
        };
        if !self.acknowledged {
            return Err(WithdrawalError::NotAcknowledged);
        }

        let submission = WithdrawalSubmission {
            enwr_number: self.holding.enwr_number.clone(),
            commodity: self.holding.commodity.clone(),
            quantity: self.quantity,
            delivery_type: self.delivery_type,
            delivery_window: self.delivery_window,
            charges: self.charges(schedule),
            transaction_id: payment.transaction_id.clone(),
        };
        self.submitted = true;
        info!(
            enwr_number = %submission.enwr_number,
            quantity = submission.quantity,
            "withdrawal request submitted"
        );
        Ok(submission)
    }

    fn ensure_open(&self) -> Result<(), WithdrawalError> {
        if self.submitted {
            Err(WithdrawalError::AlreadySubmitted)
        } else {
            Ok(())
        }
    }

    fn ensure_charges_open(&self) -> Result<(), WithdrawalError> {
        self.ensure_open()?;
        match self.payment_status {
            PaymentStatus::Processing => Err(WithdrawalError::PaymentInFlight),
            PaymentStatus::Success => Err(WithdrawalError::AlreadyPaid),
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(()),
        }
    }
}

/// Holds the request in `Processing` for one gateway call.
struct PaymentAttempt<'a> {
    status: &'a mut PaymentStatus,
}

impl<'a> PaymentAttempt<'a> {
    fn begin(status: &'a mut PaymentStatus) -> Self {
        *status = PaymentStatus::Processing;
        Self { status }
    }

    fn settle(self, outcome: PaymentStatus) {
        *self.status = outcome;
    }
}

impl Drop for PaymentAttempt<'_> {
    fn drop(&mut self) {
        if *self.status == PaymentStatus::Processing {
            warn!("withdrawal payment abandoned before the gateway answered");
            *self.status = PaymentStatus::Failed;
        }
    }
}
