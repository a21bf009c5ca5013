use crate::domain::money::{Currency, Money};
use crate::domain::payment::{PaymentId, PayoutId};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Processing,
    Completed,
    Rejected,
    Failed,
}

impl PayoutStatus {
    /// Rejected and failed requests hand their payments back to the pool.
    pub fn releases_allocation(&self) -> bool {
        matches!(self, PayoutStatus::Rejected | PayoutStatus::Failed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    ConnectedAccount,
}

/// Where the transfer goes. Opaque to the core, handed to the rail as-is.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct PayoutDetails {
    pub destination: String,
    #[serde(default)]
    pub account_holder: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
}

/// A landlord's claim against their available balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayoutRequest {
    pub id: PayoutId,
    pub landlord_id: String,
    pub amount: Money,
    pub currency: Currency,
    pub method: PayoutMethod,
    pub details: PayoutDetails,
    pub status: PayoutStatus,
    /// Payments reserved for this request; their net amounts cover `amount`.
    pub related_payments: Vec<PaymentId>,
    pub allocated_total: Money,
    /// Sent to the rail with the transfer. One key per attempt.
    pub idempotency_key: Uuid,
    pub transfer_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PayoutRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PayoutId,
        landlord_id: impl Into<String>,
        amount: Money,
        currency: Currency,
        method: PayoutMethod,
        details: PayoutDetails,
        related_payments: Vec<PaymentId>,
        allocated_total: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            landlord_id: landlord_id.into(),
            amount,
            currency,
            method,
            details,
            status: PayoutStatus::Pending,
            related_payments,
            allocated_total,
            idempotency_key: Uuid::new_v4(),
            transfer_reference: None,
            failure_reason: None,
            rejection_reason: None,
            approved_by: None,
            requested_at: now,
            approved_at: None,
            processed_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    fn transition(&mut self, from: PayoutStatus, to: PayoutStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status != from {
            return Err(SettlementError::InvalidTransition {
                entity: "payout request",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        self.transition(PayoutStatus::Pending, PayoutStatus::Approved, now)?;
        self.approved_by = Some(actor.to_string());
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        let reason = required_reason(reason)?;
        self.transition(PayoutStatus::Pending, PayoutStatus::Rejected, now)?;
        self.rejection_reason = Some(reason);
        Ok(())
    }

    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(PayoutStatus::Approved, PayoutStatus::Processing, now)?;
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn record_transfer(&mut self, reference: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != PayoutStatus::Processing {
            return Err(SettlementError::InvalidTransition {
                entity: "payout request",
                from: self.status.to_string(),
                to: "transfer recorded".to_string(),
            });
        }
        self.transfer_reference = Some(reference.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(PayoutStatus::Processing, PayoutStatus::Completed, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        let reason = required_reason(reason)?;
        self.transition(PayoutStatus::Processing, PayoutStatus::Failed, now)?;
        self.failure_reason = Some(reason);
        Ok(())
    }
}

fn required_reason(reason: &str) -> Result<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err(SettlementError::invalid("reason", "must not be empty"))
    } else {
        Ok(reason.to_string())
    }
}
