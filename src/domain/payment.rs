use crate::domain::commission::{CommissionBreakdown, CommissionRate};
use crate::domain::money::{Currency, Money};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PaymentId = Uuid;
pub type PayoutId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// What a payment is for. Resolved once at ingestion and persisted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    ApplicationFee,
    Other,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Not an escrow payment.
    #[default]
    None,
    Held,
    Released,
    Refunded,
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EscrowStatus::None => "none",
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// Preconditions an administrator must record before escrow can be released.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCondition {
    VisitConfirmed,
    DocumentsReceived,
}

impl fmt::Display for ReleaseCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseCondition::VisitConfirmed => f.write_str("visit not confirmed"),
            ReleaseCondition::DocumentsReceived => f.write_str("documents not received"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct ReleaseConditions {
    pub visit_confirmed: bool,
    pub documents_received: bool,
}

impl ReleaseConditions {
    pub fn mark(&mut self, condition: ReleaseCondition) {
        match condition {
            ReleaseCondition::VisitConfirmed => self.visit_confirmed = true,
            ReleaseCondition::DocumentsReceived => self.documents_received = true,
        }
    }

    pub fn unmet(&self) -> Vec<ReleaseCondition> {
        let mut unmet = Vec::new();
        if !self.visit_confirmed {
            unmet.push(ReleaseCondition::VisitConfirmed);
        }
        if !self.documents_received {
            unmet.push(ReleaseCondition::DocumentsReceived);
        }
        unmet
    }
}

/// Inclusive range of days a rent payment covers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct RentPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Escrow bookkeeping carried by rent payments.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct EscrowHold {
    pub held_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A payment collected through the provider.
///
/// Created once by webhook ingestion. Afterwards only the escrow transitions
/// (`release`, `refund`), provider status updates and payout allocation
/// touch it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    /// Gross amount in minor units.
    pub amount: Money,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub application_id: Option<String>,
    pub payer_id: Option<String>,
    pub landlord_id: Option<String>,
    pub is_escrow: bool,
    pub escrow_status: EscrowStatus,
    pub escrow: Option<EscrowHold>,
    pub release_conditions: ReleaseConditions,
    pub rent_period: Option<RentPeriod>,
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    /// Set exactly once, at escrow release.
    pub landlord_net_amount: Option<Money>,
    pub allocated_to_payout: bool,
    pub payout_request: Option<PayoutId>,
    pub provider_session_id: Option<String>,
    pub provider_payment_intent_id: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        amount: Money,
        currency: Currency,
        payment_type: PaymentType,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            currency,
            status,
            payment_type,
            application_id: None,
            payer_id: None,
            landlord_id: None,
            is_escrow: false,
            escrow_status: EscrowStatus::None,
            escrow: None,
            release_conditions: ReleaseConditions::default(),
            rent_period: None,
            commission_rate: CommissionRate::ZERO,
            commission_amount: Money::ZERO,
            landlord_net_amount: None,
            allocated_to_payout: false,
            payout_request: None,
            provider_session_id: None,
            provider_payment_intent_id: None,
            released_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Places the payment in escrow for `hold_window`.
    pub fn hold_in_escrow(&mut self, now: DateTime<Utc>, hold_window: Duration) -> Result<()> {
        let expires_at = now
            .checked_add_signed(hold_window)
            .ok_or_else(|| SettlementError::invalid("escrow_hold_window", "expiry out of range"))?;
        self.is_escrow = true;
        self.escrow_status = EscrowStatus::Held;
        self.escrow = Some(EscrowHold {
            held_at: now,
            expires_at,
        });
        Ok(())
    }

    /// `held -> released`. Fixes commission and the landlord's net amount.
    pub fn release(&mut self, breakdown: &CommissionBreakdown, now: DateTime<Utc>) -> Result<()> {
        self.ensure_held(EscrowStatus::Released)?;
        if self.status != PaymentStatus::Completed {
            return Err(SettlementError::InvalidTransition {
                entity: "payment",
                from: format!("{:?}", self.status).to_lowercase(),
                to: EscrowStatus::Released.to_string(),
            });
        }
        let unmet = self.release_conditions.unmet();
        if !unmet.is_empty() {
            return Err(SettlementError::EscrowConditionsUnmet(unmet));
        }
        if self.landlord_net_amount.is_some() {
            return Err(SettlementError::InvalidTransition {
                entity: "payment",
                from: "net amount already set".to_string(),
                to: EscrowStatus::Released.to_string(),
            });
        }

        self.escrow_status = EscrowStatus::Released;
        self.commission_rate = breakdown.rate;
        self.commission_amount = breakdown.commission;
        self.landlord_net_amount = Some(breakdown.net);
        self.released_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `held -> refunded`. Any commission figures are reset since no release happened.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_held(EscrowStatus::Refunded)?;
        self.escrow_status = EscrowStatus::Refunded;
        self.status = PaymentStatus::Refunded;
        self.commission_rate = CommissionRate::ZERO;
        self.commission_amount = Money::ZERO;
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_held(&self, to: EscrowStatus) -> Result<()> {
        if self.escrow_status == EscrowStatus::Held {
            Ok(())
        } else {
            Err(SettlementError::InvalidTransition {
                entity: "escrow",
                from: self.escrow_status.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Applies a provider-reported status. Events may arrive out of order, so
    /// a completed payment is never downgraded and a refund is final.
    pub fn apply_provider_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        let allowed = matches!(
            (self.status, status),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Completed)
        );
        if !allowed {
            return Err(SettlementError::InvalidTransition {
                entity: "payment",
                from: format!("{:?}", self.status).to_lowercase(),
                to: format!("{status:?}").to_lowercase(),
            });
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    /// Completed, released and not yet claimed by a payout request.
    pub fn is_payout_eligible(&self) -> bool {
        self.status == PaymentStatus::Completed
            && self.landlord_net_amount.is_some()
            && !self.allocated_to_payout
    }

    pub fn allocate(&mut self, payout: PayoutId, now: DateTime<Utc>) {
        self.allocated_to_payout = true;
        self.payout_request = Some(payout);
        self.updated_at = now;
    }

    pub fn deallocate(&mut self, now: DateTime<Utc>) {
        self.allocated_to_payout = false;
        self.payout_request = None;
        self.updated_at = now;
    }

    /// Informational only: an expired hold does not change escrow state.
    pub fn is_escrow_expired(&self, now: DateTime<Utc>) -> bool {
        self.escrow_status == EscrowStatus::Held
            && self.escrow.is_some_and(|hold| hold.expires_at <= now)
    }

    pub fn formatted_amount(&self) -> String {
        self.amount.format(&self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn held_rent(now: DateTime<Utc>) -> Payment {
        let mut payment = Payment::new(
            Money::from(100000),
            Currency::default(),
            PaymentType::Rent,
            PaymentStatus::Completed,
            now,
        );
        payment.hold_in_escrow(now, Duration::days(10)).unwrap();
        payment
    }

    fn breakdown(rate: rust_decimal::Decimal) -> CommissionBreakdown {
        CommissionBreakdown::compute(Money::from(100000), CommissionRate::new(rate).unwrap())
            .unwrap()
    }

    #[test]
    fn test_hold_sets_expiry() {
        let now = Utc::now();
        let payment = held_rent(now);
        assert!(payment.is_escrow);
        assert_eq!(payment.escrow_status, EscrowStatus::Held);
        assert_eq!(payment.escrow.unwrap().expires_at, now + Duration::days(10));
        assert_eq!(payment.commission_amount, Money::ZERO);
        assert!(payment.landlord_net_amount.is_none());
    }

    #[test]
    fn test_hold_rejects_expiry_out_of_range() {
        let now = Utc::now();
        let mut payment = Payment::new(
            Money::from(100000),
            Currency::default(),
            PaymentType::Rent,
            PaymentStatus::Completed,
            now,
        );
        let result = payment.hold_in_escrow(now, Duration::MAX);
        assert!(matches!(
            result,
            Err(SettlementError::InvalidArgument {
                field: "escrow_hold_window",
                ..
            })
        ));
        assert_eq!(payment.escrow_status, EscrowStatus::None);
        assert!(!payment.is_escrow);
    }

    #[test]
    fn test_release_requires_conditions() {
        let now = Utc::now();
        let mut payment = held_rent(now);
        payment.release_conditions.mark(ReleaseCondition::VisitConfirmed);

        let result = payment.release(&breakdown(dec!(0.10)), now);
        assert!(matches!(
            result,
            Err(SettlementError::EscrowConditionsUnmet(ref unmet))
                if unmet == &vec![ReleaseCondition::DocumentsReceived]
        ));
        assert_eq!(payment.escrow_status, EscrowStatus::Held);
    }

    #[test]
    fn test_release_sets_commission_once() {
        let now = Utc::now();
        let mut payment = held_rent(now);
        payment.release_conditions = ReleaseConditions {
            visit_confirmed: true,
            documents_received: true,
        };

        payment.release(&breakdown(dec!(0.10)), now).unwrap();
        assert_eq!(payment.escrow_status, EscrowStatus::Released);
        assert_eq!(payment.commission_amount, Money::from(10000));
        assert_eq!(payment.landlord_net_amount, Some(Money::from(90000)));
        assert!(payment.is_payout_eligible());

        // Terminal: a second release is rejected and nothing changes.
        assert!(payment.release(&breakdown(dec!(0.20)), now).is_err());
        assert_eq!(payment.commission_amount, Money::from(10000));
    }

    #[test]
    fn test_refund_resets_commission() {
        let now = Utc::now();
        let mut payment = held_rent(now);
        payment.commission_amount = Money::from(500);

        payment.refund(now).unwrap();
        assert_eq!(payment.escrow_status, EscrowStatus::Refunded);
        assert_eq!(payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.commission_amount, Money::ZERO);
        assert!(payment.refund(now).is_err());
    }

    #[test]
    fn test_non_escrow_cannot_release() {
        let now = Utc::now();
        let mut payment = Payment::new(
            Money::from(5000),
            Currency::default(),
            PaymentType::ApplicationFee,
            PaymentStatus::Completed,
            now,
        );
        assert!(matches!(
            payment.release(&breakdown(dec!(0.1)), now),
            Err(SettlementError::InvalidTransition { entity: "escrow", .. })
        ));
    }

    #[test]
    fn test_provider_status_never_downgrades() {
        let now = Utc::now();
        let mut payment = Payment::new(
            Money::from(5000),
            Currency::default(),
            PaymentType::Other,
            PaymentStatus::Pending,
            now,
        );
        payment.apply_provider_status(PaymentStatus::Failed, now).unwrap();
        payment.apply_provider_status(PaymentStatus::Completed, now).unwrap();
        assert!(payment.apply_provider_status(PaymentStatus::Failed, now).is_err());
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_expiry_is_informational() {
        let now = Utc::now();
        let payment = held_rent(now);
        assert!(!payment.is_escrow_expired(now));
        assert!(payment.is_escrow_expired(now + Duration::days(11)));
        assert_eq!(payment.escrow_status, EscrowStatus::Held);
    }
}
