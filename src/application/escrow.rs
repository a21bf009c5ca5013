use super::ledger::LedgerService;
use super::notify::dispatch;
use super::settings::SettingsService;
use crate::domain::account::{BalanceBucket, EarningsCredit};
use crate::domain::audit::AuditEntry;
use crate::domain::collaborators::{Notification, NotifierRef};
use crate::domain::commission::CommissionBreakdown;
use crate::domain::payment::{EscrowStatus, Payment, PaymentId, ReleaseCondition};
use crate::domain::ports::{AuditLogRef, PaymentStoreRef};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use std::sync::Arc;

/// Drives the `held -> released | refunded` lifecycle of escrow payments.
pub struct EscrowService {
    payments: PaymentStoreRef,
    ledger: Arc<LedgerService>,
    settings: Arc<SettingsService>,
    audit: AuditLogRef,
    notifier: NotifierRef,
}

impl EscrowService {
    pub fn new(
        payments: PaymentStoreRef,
        ledger: Arc<LedgerService>,
        settings: Arc<SettingsService>,
        audit: AuditLogRef,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            payments,
            ledger,
            settings,
            audit,
            notifier,
        }
    }

    /// Records one of the release preconditions on a held payment.
    pub async fn confirm_condition(
        &self,
        payment_id: PaymentId,
        condition: ReleaseCondition,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .modify(
                payment_id,
                Box::new(move |payment: &mut Payment| {
                    if payment.escrow_status != EscrowStatus::Held {
                        return Err(SettlementError::InvalidTransition {
                            entity: "escrow",
                            from: payment.escrow_status.to_string(),
                            to: "condition confirmed".to_string(),
                        });
                    }
                    payment.release_conditions.mark(condition);
                    payment.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(%payment_id, ?condition, "escrow condition confirmed");
        Ok(payment)
    }

    /// Releases a held payment to the landlord.
    ///
    /// Commission uses the rate in effect now, not the one at creation. Only
    /// the caller that wins the `held -> released` transition credits the
    /// ledger, so the credit happens exactly once.
    pub async fn release(&self, payment_id: PaymentId, actor: &str) -> Result<Payment> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payment", payment_id))?;
        let Some(landlord_id) = payment.landlord_id.clone() else {
            return Err(SettlementError::invalid(
                "landlord_id",
                "payment has no landlord to release to",
            ));
        };

        let rate = self.settings.current_rate().await?;
        let breakdown = CommissionBreakdown::compute(payment.amount, rate)?;
        let now = Utc::now();
        let released = self
            .payments
            .modify(
                payment_id,
                Box::new(move |payment: &mut Payment| payment.release(&breakdown, now)),
            )
            .await?;

        self.ledger
            .update_balance(
                &landlord_id,
                EarningsCredit {
                    gross: breakdown.gross,
                    commission: breakdown.commission,
                    net: breakdown.net,
                },
                BalanceBucket::Available,
            )
            .await?;

        self.audit
            .append(AuditEntry::CommissionCalculated {
                payment_id,
                gross: breakdown.gross,
                rate: breakdown.rate,
                commission: breakdown.commission,
                net: breakdown.net,
                actor: actor.to_string(),
                at: now,
            })
            .await?;

        tracing::info!(
            %payment_id,
            landlord_id = %landlord_id,
            rate = %breakdown.rate,
            commission = %breakdown.commission,
            net = %breakdown.net,
            actor,
            "escrow released"
        );
        dispatch(
            &self.notifier,
            Notification::EscrowReleased {
                payment_id,
                landlord_id: Some(landlord_id),
                net: breakdown.net,
            },
        );
        Ok(released)
    }

    /// Returns a held payment to the payer.
    pub async fn refund(&self, payment_id: PaymentId, actor: &str) -> Result<Payment> {
        let now = Utc::now();
        let refunded = self
            .payments
            .modify(
                payment_id,
                Box::new(move |payment: &mut Payment| payment.refund(now)),
            )
            .await?;

        tracing::info!(%payment_id, actor, "escrow refunded");
        dispatch(
            &self.notifier,
            Notification::EscrowRefunded {
                payment_id,
                payer_id: refunded.payer_id.clone(),
            },
        );
        Ok(refunded)
    }

    pub async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.payments.get(payment_id).await
    }

    pub async fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>> {
        self.payments.find_by_session(session_id).await
    }
}
