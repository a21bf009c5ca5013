use super::reader::JournalEntry;
use crate::application::engine::SettlementEngine;
use crate::domain::payment::{PaymentId, PayoutId};
use crate::error::{Result, SettlementError};
use std::collections::HashMap;

/// Replays journal entries against an engine.
///
/// Keeps the mapping from journal payout references to the ids the engine
/// generated, so later entries can address the same request.
pub struct JournalRunner<'a> {
    engine: &'a SettlementEngine,
    payouts: HashMap<String, PayoutId>,
}

impl<'a> JournalRunner<'a> {
    pub fn new(engine: &'a SettlementEngine) -> Self {
        Self {
            engine,
            payouts: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, entry: JournalEntry) -> Result<()> {
        match entry {
            JournalEntry::Webhook { event } => {
                self.engine.webhooks.handle(&event).await?;
            }
            JournalEntry::ConfirmCondition {
                session_id,
                condition,
            } => {
                let id = self.payment(&session_id).await?;
                self.engine.escrow.confirm_condition(id, condition).await?;
            }
            JournalEntry::Release { session_id, actor } => {
                let id = self.payment(&session_id).await?;
                self.engine.escrow.release(id, &actor).await?;
            }
            JournalEntry::Refund { session_id, actor } => {
                let id = self.payment(&session_id).await?;
                self.engine.escrow.refund(id, &actor).await?;
            }
            JournalEntry::SetRate {
                rate,
                reason,
                actor,
            } => {
                self.engine
                    .settings
                    .update_commission_rate(rate, &reason, &actor)
                    .await?;
            }
            JournalEntry::SetAccountStatus {
                landlord_id,
                status,
            } => {
                self.engine
                    .ledger
                    .set_account_status(&landlord_id, status)
                    .await?;
            }
            JournalEntry::PayoutRequest {
                reference,
                landlord_id,
                amount,
                method,
                details,
            } => {
                if self.payouts.contains_key(&reference) {
                    return Err(SettlementError::invalid(
                        "reference",
                        format!("'{reference}' already used in this journal"),
                    ));
                }
                let request = self
                    .engine
                    .payouts
                    .create_payout_request(&landlord_id, amount, method, details)
                    .await?;
                self.payouts.insert(reference, request.id);
            }
            JournalEntry::PayoutApprove { reference, actor } => {
                let id = self.payout(&reference)?;
                self.engine.payouts.approve(id, &actor).await?;
            }
            JournalEntry::PayoutReject { reference, reason } => {
                let id = self.payout(&reference)?;
                self.engine.payouts.reject(id, &reason).await?;
            }
            JournalEntry::PayoutProcess { reference } => {
                let id = self.payout(&reference)?;
                self.engine.payouts.process(id).await?;
            }
        }
        Ok(())
    }

    async fn payment(&self, session_id: &str) -> Result<PaymentId> {
        self.engine
            .escrow
            .payment_by_session(session_id)
            .await?
            .map(|p| p.id)
            .ok_or_else(|| SettlementError::not_found("payment for session", session_id))
    }

    fn payout(&self, reference: &str) -> Result<PayoutId> {
        self.payouts
            .get(reference)
            .copied()
            .ok_or_else(|| SettlementError::not_found("payout reference", reference))
    }
}
