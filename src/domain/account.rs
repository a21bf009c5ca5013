use crate::domain::money::Money;
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed drift between `total_net_earnings` and gross minus commission.
pub const CONSISTENCY_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which balance a credit lands in.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BalanceBucket {
    Available,
    Pending,
}

/// One released payment's contribution to the running totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsCredit {
    pub gross: Money,
    pub commission: Money,
    pub net: Money,
}

/// Why a landlord cannot request a payout right now.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutBlocker {
    KycNotVerified,
    BelowMinimum { minimum: Money },
    ExceedsAvailableBalance { available: Money },
    AccountNotActive(AccountStatus),
}

impl fmt::Display for PayoutBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutBlocker::KycNotVerified => f.write_str("KYC verification is not complete"),
            PayoutBlocker::BelowMinimum { minimum } => {
                write!(f, "amount is below the minimum payout of {minimum}")
            }
            PayoutBlocker::ExceedsAvailableBalance { available } => {
                write!(f, "amount exceeds the available balance of {available}")
            }
            PayoutBlocker::AccountNotActive(status) => write!(f, "account is {status}"),
        }
    }
}

/// Per-landlord running balances.
///
/// Created lazily the first time a landlord is referenced and mutated only by
/// the ledger (earnings) and by payout completion.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LandlordAccount {
    pub landlord_id: String,
    pub total_gross_earnings: Money,
    pub total_commission_paid: Money,
    pub total_net_earnings: Money,
    /// Funds a payout can be requested against.
    pub available_balance: Money,
    pub pending_balance: Money,
    pub total_payouts: Money,
    /// Cached copy of the KYC service's verdict, repaired on read.
    pub kyc_verified: bool,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LandlordAccount {
    pub fn new(landlord_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            landlord_id: landlord_id.into(),
            total_gross_earnings: Money::ZERO,
            total_commission_paid: Money::ZERO,
            total_net_earnings: Money::ZERO,
            available_balance: Money::ZERO,
            pending_balance: Money::ZERO,
            total_payouts: Money::ZERO,
            kyc_verified: false,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a released payment to the running totals and the chosen bucket.
    pub fn credit(&mut self, credit: EarningsCredit, bucket: BalanceBucket, now: DateTime<Utc>) {
        self.total_gross_earnings += credit.gross;
        self.total_commission_paid += credit.commission;
        self.total_net_earnings += credit.net;
        match bucket {
            BalanceBucket::Available => self.available_balance += credit.net,
            BalanceBucket::Pending => self.pending_balance += credit.net,
        }
        self.updated_at = now;
    }

    /// Books a completed payout against the available balance.
    pub fn settle_payout(&mut self, amount: Money, now: DateTime<Utc>) -> Result<()> {
        if self.available_balance >= amount {
            self.available_balance -= amount;
            self.total_payouts += amount;
            self.updated_at = now;
            Ok(())
        } else {
            Err(SettlementError::InsufficientFunds {
                requested: amount,
                allocatable: self.available_balance,
            })
        }
    }

    /// Every reason `amount` cannot be paid out, collected rather than failing fast.
    pub fn payout_blockers(&self, amount: Money, minimum: Money) -> Vec<PayoutBlocker> {
        let mut blockers = Vec::new();
        if !self.kyc_verified {
            blockers.push(PayoutBlocker::KycNotVerified);
        }
        if amount < minimum {
            blockers.push(PayoutBlocker::BelowMinimum { minimum });
        }
        if amount > self.available_balance {
            blockers.push(PayoutBlocker::ExceedsAvailableBalance {
                available: self.available_balance,
            });
        }
        if self.status != AccountStatus::Active {
            blockers.push(PayoutBlocker::AccountNotActive(self.status));
        }
        blockers
    }

    /// Read-time check that net earnings equal gross minus commission.
    pub fn is_consistent(&self) -> bool {
        let expected = self.total_gross_earnings - self.total_commission_paid;
        (expected.value() - self.total_net_earnings.value()).abs() <= CONSISTENCY_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(gross: i64, commission: i64) -> EarningsCredit {
        EarningsCredit {
            gross: Money::from(gross),
            commission: Money::from(commission),
            net: Money::from(gross - commission),
        }
    }

    #[test]
    fn test_credit_available_bucket() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.credit(credit(100000, 10000), BalanceBucket::Available, now);

        assert_eq!(account.total_gross_earnings, Money::from(100000));
        assert_eq!(account.total_commission_paid, Money::from(10000));
        assert_eq!(account.total_net_earnings, Money::from(90000));
        assert_eq!(account.available_balance, Money::from(90000));
        assert_eq!(account.pending_balance, Money::ZERO);
        assert!(account.is_consistent());
    }

    #[test]
    fn test_credit_pending_bucket() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.credit(credit(5000, 500), BalanceBucket::Pending, now);

        assert_eq!(account.pending_balance, Money::from(4500));
        assert_eq!(account.available_balance, Money::ZERO);
    }

    #[test]
    fn test_settle_payout() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.credit(credit(100000, 10000), BalanceBucket::Available, now);

        account.settle_payout(Money::from(60000), now).unwrap();
        assert_eq!(account.available_balance, Money::from(30000));
        assert_eq!(account.total_payouts, Money::from(60000));

        let result = account.settle_payout(Money::from(30001), now);
        assert!(matches!(result, Err(SettlementError::InsufficientFunds { .. })));
        assert_eq!(account.available_balance, Money::from(30000));
    }

    #[test]
    fn test_payout_blockers_are_collected() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.status = AccountStatus::Suspended;

        let blockers = account.payout_blockers(Money::from(100), Money::from(5000));
        assert_eq!(
            blockers,
            vec![
                PayoutBlocker::KycNotVerified,
                PayoutBlocker::BelowMinimum {
                    minimum: Money::from(5000)
                },
                PayoutBlocker::ExceedsAvailableBalance {
                    available: Money::ZERO
                },
                PayoutBlocker::AccountNotActive(AccountStatus::Suspended),
            ]
        );
    }

    #[test]
    fn test_inconsistency_detected() {
        let now = Utc::now();
        let mut account = LandlordAccount::new("landlord-1", now);
        account.total_gross_earnings = Money::from(100);
        account.total_commission_paid = Money::from(10);
        account.total_net_earnings = Money::from(91);
        assert!(!account.is_consistent());
    }
}
