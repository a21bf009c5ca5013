use super::account::LandlordAccount;
use super::audit::AuditEntry;
use super::payment::{Payment, PaymentId, PayoutId};
use super::payout::PayoutRequest;
use super::settings::PlatformSettings;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A read-modify-write applied atomically by the store. If the closure fails
/// the record is left untouched.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion<T> {
    Inserted(T),
    /// A record with the same idempotency key already existed; it is returned unchanged.
    Existing(T),
}

impl<T> Insertion<T> {
    pub fn into_inner(self) -> T {
        match self {
            Insertion::Inserted(value) | Insertion::Existing(value) => value,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Insertion::Inserted(_))
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Atomically inserts unless a payment with the same provider session id
    /// or payment-intent id exists.
    async fn insert_if_absent(&self, payment: Payment) -> Result<Insertion<Payment>>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_by_session(&self, session_id: &str) -> Result<Option<Payment>>;
    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Payment>>;
    async fn modify(&self, id: PaymentId, mutation: Mutation<Payment>) -> Result<Payment>;
    /// Most recently created completed rent payment for an application.
    async fn latest_completed_rent(&self, application_id: &str) -> Result<Option<Payment>>;
    /// All of a landlord's payments, oldest first.
    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<Payment>>;
    /// Flags every payment as allocated to `payout`, but only if each one is
    /// still payout-eligible. All or nothing; `false` means nothing changed.
    async fn allocate(&self, ids: &[PaymentId], payout: PayoutId) -> Result<bool>;
    /// Returns every payment allocated to `payout` to the eligible pool.
    async fn deallocate(&self, payout: PayoutId) -> Result<usize>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, landlord_id: &str) -> Result<Option<LandlordAccount>>;
    /// Inserts `account` unless one exists for the landlord; returns the stored one.
    async fn get_or_create(&self, account: LandlordAccount) -> Result<LandlordAccount>;
    async fn modify(
        &self,
        landlord_id: &str,
        mutation: Mutation<LandlordAccount>,
    ) -> Result<LandlordAccount>;
    async fn get_all(&self) -> Result<Vec<LandlordAccount>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn insert(&self, request: PayoutRequest) -> Result<()>;
    async fn get(&self, id: PayoutId) -> Result<Option<PayoutRequest>>;
    async fn modify(&self, id: PayoutId, mutation: Mutation<PayoutRequest>)
    -> Result<PayoutRequest>;
    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<PayoutRequest>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The version with the latest effective date.
    async fn current(&self) -> Result<Option<PlatformSettings>>;
    /// Stores `initial` only if no version exists yet; returns the current version.
    async fn initialize(&self, initial: PlatformSettings) -> Result<PlatformSettings>;
    /// Appends `next` if it directly follows the current version.
    async fn append(&self, next: PlatformSettings) -> Result<()>;
    async fn history(&self) -> Result<Vec<PlatformSettings>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
    async fn entries(&self) -> Result<Vec<AuditEntry>>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type PayoutStoreRef = Arc<dyn PayoutStore>;
pub type SettingsStoreRef = Arc<dyn SettingsStore>;
pub type AuditLogRef = Arc<dyn AuditLog>;
