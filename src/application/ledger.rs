use crate::domain::account::{
    AccountStatus, BalanceBucket, CONSISTENCY_TOLERANCE, EarningsCredit, LandlordAccount,
    PayoutBlocker,
};
use crate::domain::collaborators::KycDirectoryRef;
use crate::domain::money::Money;
use crate::domain::payment::{EscrowStatus, PaymentStatus};
use crate::domain::ports::{AccountStoreRef, PaymentStoreRef};
use crate::error::{Result, SettlementError};
use chrono::Utc;

/// Released earnings recomputed from payments, compared against the cached totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub landlord_id: String,
    pub released_payments: usize,
    pub expected_net: Money,
    pub recorded_net: Money,
    pub drift: Money,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.drift.value().abs() <= CONSISTENCY_TOLERANCE
    }
}

/// Per-landlord running balances.
pub struct LedgerService {
    accounts: AccountStoreRef,
    payments: PaymentStoreRef,
    kyc: KycDirectoryRef,
    minimum_payout: Money,
}

impl LedgerService {
    pub fn new(
        accounts: AccountStoreRef,
        payments: PaymentStoreRef,
        kyc: KycDirectoryRef,
        minimum_payout: Money,
    ) -> Self {
        Self {
            accounts,
            payments,
            kyc,
            minimum_payout,
        }
    }

    pub fn minimum_payout(&self) -> Money {
        self.minimum_payout
    }

    /// Returns the landlord's account, creating it on first reference.
    ///
    /// The cached KYC flag is repaired from the KYC service on every read. A
    /// KYC lookup failure keeps the cached value rather than failing the read.
    pub async fn create_or_get_account(&self, landlord_id: &str) -> Result<LandlordAccount> {
        let account = self
            .accounts
            .get_or_create(LandlordAccount::new(landlord_id, Utc::now()))
            .await?;

        let verified = match self.kyc.is_verified(landlord_id).await {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!(landlord_id, error = %e, "KYC lookup failed, using cached flag");
                return Ok(account);
            }
        };
        if verified == account.kyc_verified {
            return Ok(account);
        }

        tracing::debug!(landlord_id, verified, "syncing cached KYC flag");
        self.accounts
            .modify(
                landlord_id,
                Box::new(move |account: &mut LandlordAccount| {
                    account.kyc_verified = verified;
                    Ok(())
                }),
            )
            .await
    }

    /// Atomically adds one released payment to the running totals.
    ///
    /// Not idempotent: the escrow release transition guarantees it runs
    /// exactly once per payment.
    pub async fn update_balance(
        &self,
        landlord_id: &str,
        credit: EarningsCredit,
        bucket: BalanceBucket,
    ) -> Result<LandlordAccount> {
        for (field, value) in [
            ("gross", credit.gross),
            ("commission", credit.commission),
            ("net", credit.net),
        ] {
            if value.is_negative() {
                return Err(SettlementError::invalid(field, "must not be negative"));
            }
        }

        self.accounts
            .get_or_create(LandlordAccount::new(landlord_id, Utc::now()))
            .await?;
        let account = self
            .accounts
            .modify(
                landlord_id,
                Box::new(move |account: &mut LandlordAccount| {
                    account.credit(credit, bucket, Utc::now());
                    Ok(())
                }),
            )
            .await?;

        tracing::info!(
            landlord_id,
            gross = %credit.gross,
            commission = %credit.commission,
            net = %credit.net,
            ?bucket,
            "ledger credited"
        );
        Ok(account)
    }

    /// Every reason the landlord cannot request `amount`; empty means allowed.
    pub async fn can_request_payout(
        &self,
        landlord_id: &str,
        amount: Money,
    ) -> Result<Vec<PayoutBlocker>> {
        let account = self.create_or_get_account(landlord_id).await?;
        Ok(account.payout_blockers(amount, self.minimum_payout))
    }

    /// Books a completed payout. Called once per completed request.
    pub async fn settle_payout(&self, landlord_id: &str, amount: Money) -> Result<LandlordAccount> {
        let account = self
            .accounts
            .modify(
                landlord_id,
                Box::new(move |account: &mut LandlordAccount| {
                    account.settle_payout(amount, Utc::now())
                }),
            )
            .await?;
        tracing::info!(landlord_id, amount = %amount, "payout booked against ledger");
        Ok(account)
    }

    pub async fn set_account_status(
        &self,
        landlord_id: &str,
        status: AccountStatus,
    ) -> Result<LandlordAccount> {
        self.create_or_get_account(landlord_id).await?;
        let account = self
            .accounts
            .modify(
                landlord_id,
                Box::new(move |account: &mut LandlordAccount| {
                    account.status = status;
                    account.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(landlord_id, %status, "account status changed");
        Ok(account)
    }

    /// Recomputes Σ(gross − commission) over released payments and reports
    /// the drift from `total_net_earnings`.
    pub async fn reconcile(&self, landlord_id: &str) -> Result<Reconciliation> {
        let account = self.create_or_get_account(landlord_id).await?;
        let released: Vec<_> = self
            .payments
            .for_landlord(landlord_id)
            .await?
            .into_iter()
            .filter(|p| {
                p.status == PaymentStatus::Completed && p.escrow_status == EscrowStatus::Released
            })
            .collect();

        let expected_net: Money = released
            .iter()
            .map(|p| p.amount - p.commission_amount)
            .sum();
        let reconciliation = Reconciliation {
            landlord_id: landlord_id.to_string(),
            released_payments: released.len(),
            expected_net,
            recorded_net: account.total_net_earnings,
            drift: account.total_net_earnings - expected_net,
        };
        if !reconciliation.is_balanced() {
            tracing::error!(
                landlord_id,
                expected = %reconciliation.expected_net,
                recorded = %reconciliation.recorded_net,
                "ledger drift detected"
            );
        }
        Ok(reconciliation)
    }

    pub async fn accounts(&self) -> Result<Vec<LandlordAccount>> {
        self.accounts.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::directory::InMemoryKycDirectory;
    use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryPaymentStore};
    use std::sync::Arc;

    fn ledger(kyc: InMemoryKycDirectory) -> LedgerService {
        LedgerService::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(kyc),
            Money::from(5000),
        )
    }

    fn credit(gross: i64, commission: i64) -> EarningsCredit {
        EarningsCredit {
            gross: Money::from(gross),
            commission: Money::from(commission),
            net: Money::from(gross - commission),
        }
    }

    #[tokio::test]
    async fn test_account_created_lazily_with_kyc_sync() {
        let kyc = InMemoryKycDirectory::new();
        let ledger = ledger(kyc.clone());

        let account = ledger.create_or_get_account("landlord-1").await.unwrap();
        assert!(!account.kyc_verified);

        kyc.set_verified("landlord-1", true).await;
        let account = ledger.create_or_get_account("landlord-1").await.unwrap();
        assert!(account.kyc_verified);
        assert_eq!(ledger.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_credits_are_not_lost() {
        let ledger = Arc::new(ledger(InMemoryKycDirectory::new()));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .update_balance("landlord-1", credit(1000, 100), BalanceBucket::Available)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let account = ledger.create_or_get_account("landlord-1").await.unwrap();
        assert_eq!(account.total_gross_earnings, Money::from(50000));
        assert_eq!(account.available_balance, Money::from(45000));
        assert!(account.is_consistent());
    }

    #[tokio::test]
    async fn test_negative_credit_rejected() {
        let ledger = ledger(InMemoryKycDirectory::new());
        let result = ledger
            .update_balance("landlord-1", credit(100, 200), BalanceBucket::Available)
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::InvalidArgument { field: "net", .. })
        ));
    }

    #[tokio::test]
    async fn test_can_request_payout_collects_all_reasons() {
        let ledger = ledger(InMemoryKycDirectory::new());
        ledger
            .set_account_status("landlord-1", AccountStatus::Suspended)
            .await
            .unwrap();

        let blockers = ledger
            .can_request_payout("landlord-1", Money::from(1000))
            .await
            .unwrap();
        assert_eq!(blockers.len(), 4);
        assert!(blockers.contains(&PayoutBlocker::KycNotVerified));
        assert!(blockers.contains(&PayoutBlocker::AccountNotActive(AccountStatus::Suspended)));
    }

    #[tokio::test]
    async fn test_can_request_payout_allowed() {
        let kyc = InMemoryKycDirectory::new();
        kyc.set_verified("landlord-1", true).await;
        let ledger = ledger(kyc);
        ledger
            .update_balance("landlord-1", credit(100000, 10000), BalanceBucket::Available)
            .await
            .unwrap();

        let blockers = ledger
            .can_request_payout("landlord-1", Money::from(90000))
            .await
            .unwrap();
        assert!(blockers.is_empty());
    }
}
