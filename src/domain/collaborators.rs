//! Services the settlement core consumes but does not own.

use super::money::{Currency, Money};
use super::payment::{PaymentId, PaymentType, PayoutId};
use super::payout::PayoutStatus;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Accepted)
    }
}

/// What the settlement core needs to know about a rental application.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ApplicationSnapshot {
    pub id: String,
    pub landlord_id: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub lease_start: Option<NaiveDate>,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(default)]
    pub lease_months: Option<u32>,
    #[serde(default)]
    pub application_fee_paid: bool,
}

#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    async fn application(&self, id: &str) -> Result<Option<ApplicationSnapshot>>;
    /// Returns `true` only for the call that flipped the flag.
    async fn mark_application_fee_paid(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait KycDirectory: Send + Sync {
    async fn is_verified(&self, landlord_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PaymentCompleted {
        payment_id: PaymentId,
        payment_type: PaymentType,
        payer_id: Option<String>,
    },
    PaymentFailed {
        payment_id: PaymentId,
        payer_id: Option<String>,
    },
    ApplicationFeePaid {
        application_id: String,
    },
    EscrowReleased {
        payment_id: PaymentId,
        landlord_id: Option<String>,
        net: Money,
    },
    EscrowRefunded {
        payment_id: PaymentId,
        payer_id: Option<String>,
    },
    PayoutStatusChanged {
        payout_id: PayoutId,
        landlord_id: String,
        status: PayoutStatus,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferInstruction {
    pub destination: String,
    pub amount: Money,
    pub currency: Currency,
    /// Unique per payout attempt; replaying it must never move funds twice.
    pub idempotency_key: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Succeeded,
    Failed(String),
}

/// The external payment rail that moves money to landlords.
#[async_trait]
pub trait TransferRail: Send + Sync {
    /// Returns the provider's transfer id.
    async fn initiate_transfer(&self, instruction: TransferInstruction) -> Result<String>;
    async fn transfer_status(&self, transfer_id: &str) -> Result<TransferStatus>;
}

pub type ApplicationDirectoryRef = Arc<dyn ApplicationDirectory>;
pub type KycDirectoryRef = Arc<dyn KycDirectory>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type TransferRailRef = Arc<dyn TransferRail>;
