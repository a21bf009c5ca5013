//! Payment-provider webhook payloads.
//!
//! Only the fields the settlement core reads are modelled; everything else in
//! the provider's JSON is ignored.

use crate::domain::payment::PaymentType;
use crate::error::{Result, SettlementError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    PaymentFailed,
    /// Acknowledged and ignored.
    Unrecognized,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EventData {
    pub object: EventObject,
}

/// A checkout session or payment intent, depending on the event type.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EventObject {
    /// Session id (`cs_...`) or payment-intent id (`pi_...`).
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub intent_type: Option<String>,
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "checkout.session.completed" => EventKind::CheckoutCompleted,
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => EventKind::PaymentFailed,
            _ => EventKind::Unrecognized,
        }
    }

    pub fn object(&self) -> &EventObject {
        &self.data.object
    }
}

impl EventObject {
    /// Gross amount in minor units.
    pub fn gross_amount(&self) -> Result<i64> {
        let amount = self
            .amount_total
            .or(self.amount)
            .ok_or_else(|| SettlementError::invalid("amount", "missing from event"))?;
        if amount < 0 {
            return Err(SettlementError::invalid("amount", "must not be negative"));
        }
        Ok(amount)
    }
}

impl EventMetadata {
    /// The payer's declared intent, if any. Unknown values are rejected.
    pub fn declared_type(&self) -> Result<Option<PaymentType>> {
        let Some(declared) = self.intent_type.as_deref() else {
            return Ok(None);
        };
        match declared.trim().to_ascii_lowercase().as_str() {
            "rent" => Ok(Some(PaymentType::Rent)),
            "application_fee" | "applicationfee" | "application-fee" => {
                Ok(Some(PaymentType::ApplicationFee))
            }
            "other" => Ok(Some(PaymentType::Other)),
            _ => Err(SettlementError::invalid(
                "metadata.intentType",
                format!("unknown intent type '{declared}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_event_deserialization() {
        let json = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "payment_intent": "pi_1",
                "amount_total": 5000,
                "currency": "usd",
                "metadata": {"applicationId": "app-1", "userId": "tenant-1", "intentType": "application_fee"},
                "customer_email": "ignored@example.com"
            }}
        }"#;
        let event: ProviderEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind(), EventKind::CheckoutCompleted);
        assert_eq!(event.object().gross_amount().unwrap(), 5000);
        assert_eq!(event.object().metadata.application_id.as_deref(), Some("app-1"));
        assert_eq!(
            event.object().metadata.declared_type().unwrap(),
            Some(PaymentType::ApplicationFee)
        );
    }

    #[test]
    fn test_intent_event_without_metadata() {
        let json = r#"{"id": "evt_2", "type": "payment_intent.payment_failed",
            "data": {"object": {"id": "pi_9", "amount": 100}}}"#;
        let event: ProviderEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind(), EventKind::PaymentFailed);
        assert_eq!(event.object().metadata, EventMetadata::default());
        assert_eq!(event.object().metadata.declared_type().unwrap(), None);
    }

    #[test]
    fn test_unknown_event_type() {
        let json = r#"{"id": "evt_3", "type": "customer.created", "data": {"object": {"id": "cus_1"}}}"#;
        let event: ProviderEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), EventKind::Unrecognized);
    }

    #[test]
    fn test_unknown_intent_type_rejected() {
        let metadata = EventMetadata {
            intent_type: Some("deposit".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            metadata.declared_type(),
            Err(SettlementError::InvalidArgument { field: "metadata.intentType", .. })
        ));
    }
}
