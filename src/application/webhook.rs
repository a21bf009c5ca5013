use super::notify::dispatch;
use crate::domain::collaborators::{
    ApplicationDirectoryRef, ApplicationSnapshot, Notification, NotifierRef,
};
use crate::domain::event::{EventKind, EventMetadata, ProviderEvent};
use crate::domain::money::{Currency, Money};
use crate::domain::payment::{Payment, PaymentStatus, PaymentType, RentPeriod};
use crate::domain::ports::{Insertion, PaymentStoreRef};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Days, Duration, Months, Utc};

/// What ingesting one provider event did.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created(Payment),
    /// The event was already ingested; the stored payment is returned unchanged.
    Duplicate(Payment),
    StatusUpdated(Payment),
    /// The reported status does not apply (same status, or a stale event).
    StatusUnchanged(Payment),
    /// No payment matches the payment intent yet.
    Unmatched,
    Ignored,
}

impl IngestOutcome {
    pub fn payment(&self) -> Option<&Payment> {
        match self {
            IngestOutcome::Created(p)
            | IngestOutcome::Duplicate(p)
            | IngestOutcome::StatusUpdated(p)
            | IngestOutcome::StatusUnchanged(p) => Some(p),
            IngestOutcome::Unmatched | IngestOutcome::Ignored => None,
        }
    }
}

/// Explicit classification: the declared intent wins, otherwise an approved
/// application means rent and anything else with an application is its fee.
pub fn classify(
    metadata: &EventMetadata,
    application: Option<&ApplicationSnapshot>,
) -> Result<PaymentType> {
    if let Some(declared) = metadata.declared_type()? {
        return Ok(declared);
    }
    Ok(match (metadata.application_id.as_ref(), application) {
        (_, Some(application)) if application.status.is_approved() => PaymentType::Rent,
        (Some(_), _) => PaymentType::ApplicationFee,
        (None, _) => PaymentType::Other,
    })
}

/// Idempotent ingestion of payment-provider webhooks.
pub struct WebhookIngestor {
    payments: PaymentStoreRef,
    applications: ApplicationDirectoryRef,
    notifier: NotifierRef,
    hold_window: Duration,
    default_lease_months: u32,
    default_currency: Currency,
}

impl WebhookIngestor {
    pub fn new(
        payments: PaymentStoreRef,
        applications: ApplicationDirectoryRef,
        notifier: NotifierRef,
        hold_window: Duration,
        default_lease_months: u32,
        default_currency: Currency,
    ) -> Self {
        Self {
            payments,
            applications,
            notifier,
            hold_window,
            default_lease_months,
            default_currency,
        }
    }

    pub async fn handle(&self, event: &ProviderEvent) -> Result<IngestOutcome> {
        match event.kind() {
            EventKind::CheckoutCompleted => self.checkout_completed(event).await,
            EventKind::PaymentSucceeded => {
                self.update_status(event, PaymentStatus::Completed).await
            }
            EventKind::PaymentFailed => self.update_status(event, PaymentStatus::Failed).await,
            EventKind::Unrecognized => {
                tracing::debug!(event_id = %event.id, event_type = %event.event_type, "ignoring event");
                Ok(IngestOutcome::Ignored)
            }
        }
    }

    async fn checkout_completed(&self, event: &ProviderEvent) -> Result<IngestOutcome> {
        let session = event.object();

        // Cheap pre-check; the atomic insert below is what closes the race.
        if let Some(existing) = self.existing(&session.id, session.payment_intent.as_deref()).await? {
            tracing::warn!(event_id = %event.id, session_id = %session.id, "duplicate checkout event");
            return Ok(IngestOutcome::Duplicate(existing));
        }

        let amount = session.gross_amount()?;
        let currency = session
            .currency
            .as_deref()
            .map(Currency::new)
            .unwrap_or_else(|| self.default_currency.clone());
        let metadata = &session.metadata;
        let application = match metadata.application_id.as_deref() {
            Some(id) => self.applications.application(id).await?,
            None => None,
        };
        let payment_type = classify(metadata, application.as_ref())?;

        let now = Utc::now();
        let mut payment = Payment::new(
            Money::from(amount),
            currency,
            payment_type,
            PaymentStatus::Completed,
            now,
        );
        payment.application_id = metadata.application_id.clone();
        payment.payer_id = metadata.user_id.clone();
        payment.landlord_id = application.as_ref().map(|a| a.landlord_id.clone());
        payment.provider_session_id = Some(session.id.clone());
        payment.provider_payment_intent_id = session.payment_intent.clone();

        if payment_type == PaymentType::Rent {
            payment.hold_in_escrow(now, self.hold_window)?;
            if let Some(application_id) = metadata.application_id.as_deref() {
                payment.rent_period = Some(
                    self.rent_period(application_id, application.as_ref(), now)
                        .await?,
                );
            }
        }

        let payment = match self.payments.insert_if_absent(payment).await? {
            Insertion::Existing(existing) => {
                tracing::warn!(session_id = %session.id, "concurrent duplicate checkout event");
                return Ok(IngestOutcome::Duplicate(existing));
            }
            Insertion::Inserted(payment) => payment,
        };
        tracing::info!(
            payment_id = %payment.id,
            session_id = %session.id,
            payment_type = ?payment.payment_type,
            amount = %payment.amount,
            escrow = payment.is_escrow,
            "payment recorded"
        );

        self.after_commit(&payment).await;
        Ok(IngestOutcome::Created(payment))
    }

    /// Side effects that must never undo or retry the committed payment.
    async fn after_commit(&self, payment: &Payment) {
        if payment.payment_type == PaymentType::ApplicationFee {
            if let Some(application_id) = payment.application_id.as_deref() {
                match self.applications.mark_application_fee_paid(application_id).await {
                    Ok(true) => dispatch(
                        &self.notifier,
                        Notification::ApplicationFeePaid {
                            application_id: application_id.to_string(),
                        },
                    ),
                    Ok(false) => {
                        tracing::debug!(application_id, "application fee already marked paid")
                    }
                    Err(e) => tracing::error!(
                        application_id,
                        error = %e,
                        "failed to mark application fee paid"
                    ),
                }
            }
        }
        dispatch(
            &self.notifier,
            Notification::PaymentCompleted {
                payment_id: payment.id,
                payment_type: payment.payment_type,
                payer_id: payment.payer_id.clone(),
            },
        );
    }

    async fn existing(&self, session_id: &str, intent_id: Option<&str>) -> Result<Option<Payment>> {
        if let Some(payment) = self.payments.find_by_session(session_id).await? {
            return Ok(Some(payment));
        }
        match intent_id {
            Some(intent_id) => self.payments.find_by_payment_intent(intent_id).await,
            None => Ok(None),
        }
    }

    /// Chains from the day after the previous completed rent period, or starts
    /// at the lease start / move-in date, spanning the lease length.
    async fn rent_period(
        &self,
        application_id: &str,
        application: Option<&ApplicationSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<RentPeriod> {
        let months = application
            .and_then(|a| a.lease_months)
            .filter(|months| *months > 0)
            .unwrap_or(self.default_lease_months);

        let previous_end = self
            .payments
            .latest_completed_rent(application_id)
            .await?
            .and_then(|p| p.rent_period)
            .map(|period| period.end);
        let start = match previous_end {
            Some(end) => end.checked_add_days(Days::new(1)),
            None => Some(
                application
                    .and_then(|a| a.lease_start.or(a.move_in_date))
                    .unwrap_or_else(|| now.date_naive()),
            ),
        };
        let start =
            start.ok_or_else(|| SettlementError::invalid("rent_period", "start out of range"))?;
        let end = start
            .checked_add_months(Months::new(months))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| SettlementError::invalid("rent_period", "end out of range"))?;
        Ok(RentPeriod { start, end })
    }

    /// Applies a payment-intent status event. A missing payment is not an
    /// error: the checkout event may simply not have arrived yet.
    async fn update_status(
        &self,
        event: &ProviderEvent,
        status: PaymentStatus,
    ) -> Result<IngestOutcome> {
        let intent_id = &event.object().id;
        let Some(payment) = self.payments.find_by_payment_intent(intent_id).await? else {
            tracing::debug!(event_id = %event.id, intent_id = %intent_id, "no payment for intent yet");
            return Ok(IngestOutcome::Unmatched);
        };
        if payment.status == status {
            return Ok(IngestOutcome::StatusUnchanged(payment));
        }

        let now = Utc::now();
        let updated = match self
            .payments
            .modify(
                payment.id,
                Box::new(move |p: &mut Payment| p.apply_provider_status(status, now)),
            )
            .await
        {
            Ok(updated) => updated,
            Err(SettlementError::InvalidTransition { from, to, .. }) => {
                tracing::warn!(payment_id = %payment.id, %from, %to, "stale status event ignored");
                return Ok(IngestOutcome::StatusUnchanged(payment));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(payment_id = %updated.id, status = ?updated.status, "payment status updated");
        let notification = match status {
            PaymentStatus::Failed => Notification::PaymentFailed {
                payment_id: updated.id,
                payer_id: updated.payer_id.clone(),
            },
            _ => Notification::PaymentCompleted {
                payment_id: updated.id,
                payment_type: updated.payment_type,
                payer_id: updated.payer_id.clone(),
            },
        };
        dispatch(&self.notifier, notification);
        Ok(IngestOutcome::StatusUpdated(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collaborators::ApplicationStatus;

    fn application(status: ApplicationStatus) -> ApplicationSnapshot {
        ApplicationSnapshot {
            id: "app-1".to_string(),
            landlord_id: "landlord-1".to_string(),
            status,
            lease_start: None,
            move_in_date: None,
            lease_months: None,
            application_fee_paid: false,
        }
    }

    fn metadata(intent: Option<&str>) -> EventMetadata {
        EventMetadata {
            application_id: Some("app-1".to_string()),
            user_id: Some("tenant-1".to_string()),
            intent_type: intent.map(str::to_string),
        }
    }

    #[test]
    fn test_declared_intent_is_authoritative() {
        let approved = application(ApplicationStatus::Approved);
        assert_eq!(
            classify(&metadata(Some("application_fee")), Some(&approved)).unwrap(),
            PaymentType::ApplicationFee
        );
    }

    #[test]
    fn test_inferred_from_application_status() {
        for status in [ApplicationStatus::Approved, ApplicationStatus::Accepted] {
            assert_eq!(
                classify(&metadata(None), Some(&application(status))).unwrap(),
                PaymentType::Rent
            );
        }
        assert_eq!(
            classify(&metadata(None), Some(&application(ApplicationStatus::Pending))).unwrap(),
            PaymentType::ApplicationFee
        );
        // Application id given but unknown to the directory.
        assert_eq!(
            classify(&metadata(None), None).unwrap(),
            PaymentType::ApplicationFee
        );
    }

    #[test]
    fn test_no_application_context_is_other() {
        assert_eq!(
            classify(&EventMetadata::default(), None).unwrap(),
            PaymentType::Other
        );
    }
}
