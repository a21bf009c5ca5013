use super::ledger::LedgerService;
use super::notify::dispatch;
use crate::domain::collaborators::{
    Notification, NotifierRef, TransferInstruction, TransferRailRef, TransferStatus,
};
use crate::domain::money::{Amount, Currency, Money};
use crate::domain::payment::{Payment, PayoutId};
use crate::domain::payout::{PayoutDetails, PayoutMethod, PayoutRequest, PayoutStatus};
use crate::domain::ports::{PaymentStoreRef, PayoutStoreRef};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Picks the oldest eligible payments until their net amounts cover `amount`.
///
/// Returns the chosen payments and their accumulated net total, which may
/// fall short of `amount` if the pool is too small.
pub fn select_fifo(eligible: &[Payment], amount: Money) -> (Vec<&Payment>, Money) {
    let mut selected = Vec::new();
    let mut total = Money::ZERO;
    for payment in eligible {
        if total >= amount {
            break;
        }
        if let Some(net) = payment.landlord_net_amount {
            total += net;
            selected.push(payment);
        }
    }
    (selected, total)
}

/// Reserves released payments against payout requests and drives the
/// external transfer through `pending -> approved -> processing -> completed`.
pub struct PayoutEngine {
    payments: PaymentStoreRef,
    payouts: PayoutStoreRef,
    ledger: Arc<LedgerService>,
    rail: TransferRailRef,
    notifier: NotifierRef,
    currency: Currency,
}

impl PayoutEngine {
    pub fn new(
        payments: PaymentStoreRef,
        payouts: PayoutStoreRef,
        ledger: Arc<LedgerService>,
        rail: TransferRailRef,
        notifier: NotifierRef,
        currency: Currency,
    ) -> Self {
        Self {
            payments,
            payouts,
            ledger,
            rail,
            notifier,
            currency,
        }
    }

    pub async fn create_payout_request(
        &self,
        landlord_id: &str,
        amount: Decimal,
        method: PayoutMethod,
        details: PayoutDetails,
    ) -> Result<PayoutRequest> {
        let amount = Money::from(Amount::new(amount)?);
        if details.destination.trim().is_empty() {
            return Err(SettlementError::invalid(
                "details.destination",
                "must not be empty",
            ));
        }

        let blockers = self.ledger.can_request_payout(landlord_id, amount).await?;
        if !blockers.is_empty() {
            return Err(SettlementError::PayoutNotAllowed(blockers));
        }

        // The cached balance only gates the request; allocation is decided by
        // the payments that are actually unclaimed.
        let eligible: Vec<Payment> = self
            .payments
            .for_landlord(landlord_id)
            .await?
            .into_iter()
            .filter(Payment::is_payout_eligible)
            .collect();
        let (selected, allocatable) = select_fifo(&eligible, amount);
        if allocatable < amount {
            tracing::error!(
                landlord_id,
                requested = %amount,
                allocatable = %allocatable,
                "unallocated payments do not cover the cached balance"
            );
            return Err(SettlementError::InsufficientFunds {
                requested: amount,
                allocatable,
            });
        }

        let payout_id = Uuid::new_v4();
        let payment_ids: Vec<_> = selected.iter().map(|p| p.id).collect();
        if !self.payments.allocate(&payment_ids, payout_id).await? {
            tracing::warn!(landlord_id, %payout_id, "allocation lost to a concurrent request");
            return Err(SettlementError::AllocationConflict);
        }

        let currency = selected
            .first()
            .map(|p| p.currency.clone())
            .unwrap_or_else(|| self.currency.clone());
        let request = PayoutRequest::new(
            payout_id,
            landlord_id,
            amount,
            currency,
            method,
            details,
            payment_ids,
            allocatable,
            Utc::now(),
        );
        if let Err(e) = self.payouts.insert(request.clone()).await {
            if let Err(undo) = self.payments.deallocate(payout_id).await {
                tracing::error!(%payout_id, error = %undo, "orphaned allocation left for reconciliation");
            }
            return Err(e);
        }

        tracing::info!(
            landlord_id,
            %payout_id,
            amount = %amount,
            payments = request.related_payments.len(),
            "payout requested"
        );
        self.announce(&request);
        Ok(request)
    }

    pub async fn approve(&self, payout_id: PayoutId, actor: &str) -> Result<PayoutRequest> {
        let actor = actor.to_string();
        let request = self
            .payouts
            .modify(
                payout_id,
                Box::new(move |r: &mut PayoutRequest| r.approve(&actor, Utc::now())),
            )
            .await?;
        tracing::info!(%payout_id, "payout approved");
        self.announce(&request);
        Ok(request)
    }

    pub async fn reject(&self, payout_id: PayoutId, reason: &str) -> Result<PayoutRequest> {
        let reason = reason.to_string();
        let request = self
            .payouts
            .modify(
                payout_id,
                Box::new(move |r: &mut PayoutRequest| r.reject(&reason, Utc::now())),
            )
            .await?;
        let released = self.payments.deallocate(payout_id).await?;
        tracing::info!(%payout_id, released, "payout rejected");
        self.announce(&request);
        Ok(request)
    }

    /// Moves an approved request to processing and initiates the transfer.
    ///
    /// The transfer carries the request's idempotency key. A refused or
    /// failed transfer marks the request failed; it is never retried here.
    pub async fn process(&self, payout_id: PayoutId) -> Result<PayoutRequest> {
        let request = self
            .payouts
            .modify(
                payout_id,
                Box::new(|r: &mut PayoutRequest| r.begin_processing(Utc::now())),
            )
            .await?;
        self.announce(&request);

        let instruction = TransferInstruction {
            destination: request.details.destination.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            idempotency_key: request.idempotency_key,
        };
        let transfer_id = match self.rail.initiate_transfer(instruction).await {
            Ok(transfer_id) => transfer_id,
            Err(e) => {
                tracing::error!(%payout_id, error = %e, "transfer initiation failed");
                return self.fail(payout_id, &e.to_string()).await;
            }
        };

        let reference = transfer_id.clone();
        self.payouts
            .modify(
                payout_id,
                Box::new(move |r: &mut PayoutRequest| r.record_transfer(&reference, Utc::now())),
            )
            .await?;
        tracing::info!(%payout_id, transfer_id = %transfer_id, "transfer initiated");
        self.resolve_transfer(payout_id, &transfer_id).await
    }

    /// Polls the provider for a request still in processing.
    pub async fn refresh_transfer(&self, payout_id: PayoutId) -> Result<PayoutRequest> {
        let request = self.get(payout_id).await?;
        match (request.status, request.transfer_reference.as_deref()) {
            (PayoutStatus::Processing, Some(transfer_id)) => {
                self.resolve_transfer(payout_id, transfer_id).await
            }
            _ => Ok(request),
        }
    }

    async fn resolve_transfer(&self, payout_id: PayoutId, transfer_id: &str) -> Result<PayoutRequest> {
        match self.rail.transfer_status(transfer_id).await? {
            TransferStatus::Pending => self.get(payout_id).await,
            TransferStatus::Succeeded => self.complete(payout_id).await,
            TransferStatus::Failed(reason) => {
                tracing::error!(%payout_id, transfer_id, reason = %reason, "transfer failed");
                self.fail(payout_id, &reason).await
            }
        }
    }

    /// `processing -> completed`, booking the payout against the ledger once.
    async fn complete(&self, payout_id: PayoutId) -> Result<PayoutRequest> {
        let request = self
            .payouts
            .modify(
                payout_id,
                Box::new(|r: &mut PayoutRequest| r.complete(Utc::now())),
            )
            .await?;
        self.ledger
            .settle_payout(&request.landlord_id, request.amount)
            .await?;
        tracing::info!(%payout_id, amount = %request.amount, "payout completed");
        self.announce(&request);
        Ok(request)
    }

    /// `processing -> failed`. Allocated payments go back to the pool; a new
    /// attempt needs a new payout request.
    pub async fn fail(&self, payout_id: PayoutId, reason: &str) -> Result<PayoutRequest> {
        let reason = reason.to_string();
        let request = self
            .payouts
            .modify(
                payout_id,
                Box::new(move |r: &mut PayoutRequest| r.fail(&reason, Utc::now())),
            )
            .await?;
        let released = self.payments.deallocate(payout_id).await?;
        tracing::warn!(%payout_id, released, "payout failed");
        self.announce(&request);
        Ok(request)
    }

    pub async fn get(&self, payout_id: PayoutId) -> Result<PayoutRequest> {
        self.payouts
            .get(payout_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payout request", payout_id))
    }

    pub async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<PayoutRequest>> {
        self.payouts.for_landlord(landlord_id).await
    }

    fn announce(&self, request: &PayoutRequest) {
        dispatch(
            &self.notifier,
            Notification::PayoutStatusChanged {
                payout_id: request.id,
                landlord_id: request.landlord_id.clone(),
                status: request.status,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::commission::{CommissionBreakdown, CommissionRate};
    use crate::domain::payment::{PaymentStatus, PaymentType, ReleaseConditions};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn released(gross: i64) -> Payment {
        let now = Utc::now();
        let mut payment = Payment::new(
            Money::from(gross),
            Currency::default(),
            PaymentType::Rent,
            PaymentStatus::Completed,
            now,
        );
        payment.hold_in_escrow(now, Duration::days(10)).unwrap();
        payment.release_conditions = ReleaseConditions {
            visit_confirmed: true,
            documents_received: true,
        };
        let breakdown =
            CommissionBreakdown::compute(payment.amount, CommissionRate::new(dec!(0.1)).unwrap())
                .unwrap();
        payment.release(&breakdown, now).unwrap();
        payment
    }

    #[test]
    fn test_fifo_stops_once_covered() {
        let pool = vec![released(10000), released(20000), released(30000)];
        let (selected, total) = select_fifo(&pool, Money::from(15000));
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, pool[0].id);
        assert_eq!(total, Money::from(27000));
    }

    #[test]
    fn test_fifo_reports_shortfall() {
        let pool = vec![released(10000)];
        let (selected, total) = select_fifo(&pool, Money::from(50000));
        assert_eq!(selected.len(), 1);
        assert_eq!(total, Money::from(9000));
    }
}
