use crate::domain::account::LandlordAccount;
use crate::domain::audit::AuditEntry;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus, PaymentType, PayoutId};
use crate::domain::payout::PayoutRequest;
use crate::domain::ports::{
    AccountStore, AuditLog, Insertion, Mutation, PaymentStore, PayoutStore, SettingsStore,
};
use crate::domain::settings::PlatformSettings;
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct PaymentTable {
    rows: HashMap<PaymentId, Payment>,
    by_session: HashMap<String, PaymentId>,
    by_intent: HashMap<String, PaymentId>,
}

impl PaymentTable {
    fn existing_for(&self, payment: &Payment) -> Option<&Payment> {
        let by_session = payment
            .provider_session_id
            .as_ref()
            .and_then(|id| self.by_session.get(id));
        let by_intent = payment
            .provider_payment_intent_id
            .as_ref()
            .and_then(|id| self.by_intent.get(id));
        by_session.or(by_intent).and_then(|id| self.rows.get(id))
    }

    fn index(&mut self, payment: &Payment) {
        if let Some(session) = &payment.provider_session_id {
            self.by_session.insert(session.clone(), payment.id);
        }
        if let Some(intent) = &payment.provider_payment_intent_id {
            self.by_intent.insert(intent.clone(), payment.id);
        }
    }
}

/// A thread-safe in-memory payment store.
///
/// Every compound operation runs under a single write guard, which is what
/// makes insert-if-absent and guarded allocation atomic here.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    table: Arc<RwLock<PaymentTable>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_if_absent(&self, payment: Payment) -> Result<Insertion<Payment>> {
        let mut table = self.table.write().await;
        if let Some(existing) = table.existing_for(&payment) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        table.index(&payment);
        table.rows.insert(payment.id, payment.clone());
        Ok(Insertion::Inserted(payment))
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .by_session
            .get(session_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .by_intent
            .get(intent_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn modify(&self, id: PaymentId, mutation: Mutation<Payment>) -> Result<Payment> {
        let mut table = self.table.write().await;
        let current = table
            .rows
            .get(&id)
            .ok_or_else(|| SettlementError::not_found("payment", id))?;
        let mut updated = current.clone();
        mutation(&mut updated)?;
        table.index(&updated);
        table.rows.insert(id, updated.clone());
        Ok(updated)
    }

    async fn latest_completed_rent(&self, application_id: &str) -> Result<Option<Payment>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|p| {
                p.payment_type == PaymentType::Rent
                    && p.status == PaymentStatus::Completed
                    && p.application_id.as_deref() == Some(application_id)
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<Payment>> {
        let table = self.table.read().await;
        let mut payments: Vec<Payment> = table
            .rows
            .values()
            .filter(|p| p.landlord_id.as_deref() == Some(landlord_id))
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn allocate(&self, ids: &[PaymentId], payout: PayoutId) -> Result<bool> {
        let mut table = self.table.write().await;
        let all_eligible = ids
            .iter()
            .all(|id| table.rows.get(id).is_some_and(Payment::is_payout_eligible));
        if !all_eligible {
            return Ok(false);
        }
        let now = Utc::now();
        for id in ids {
            if let Some(payment) = table.rows.get_mut(id) {
                payment.allocate(payout, now);
            }
        }
        Ok(true)
    }

    async fn deallocate(&self, payout: PayoutId) -> Result<usize> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let mut released = 0;
        for payment in table.rows.values_mut() {
            if payment.payout_request == Some(payout) {
                payment.deallocate(now);
                released += 1;
            }
        }
        Ok(released)
    }
}

/// A thread-safe in-memory store for landlord accounts.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, LandlordAccount>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, landlord_id: &str) -> Result<Option<LandlordAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(landlord_id).cloned())
    }

    async fn get_or_create(&self, account: LandlordAccount) -> Result<LandlordAccount> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts
            .entry(account.landlord_id.clone())
            .or_insert(account)
            .clone())
    }

    async fn modify(
        &self,
        landlord_id: &str,
        mutation: Mutation<LandlordAccount>,
    ) -> Result<LandlordAccount> {
        let mut accounts = self.accounts.write().await;
        let current = accounts
            .get(landlord_id)
            .ok_or_else(|| SettlementError::not_found("landlord account", landlord_id))?;
        let mut updated = current.clone();
        mutation(&mut updated)?;
        accounts.insert(landlord_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn get_all(&self) -> Result<Vec<LandlordAccount>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<LandlordAccount> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.landlord_id.cmp(&b.landlord_id));
        Ok(all)
    }
}

/// A thread-safe in-memory store for payout requests.
#[derive(Default, Clone)]
pub struct InMemoryPayoutStore {
    requests: Arc<RwLock<HashMap<PayoutId, PayoutRequest>>>,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn insert(&self, request: PayoutRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<PayoutRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn modify(
        &self,
        id: PayoutId,
        mutation: Mutation<PayoutRequest>,
    ) -> Result<PayoutRequest> {
        let mut requests = self.requests.write().await;
        let current = requests
            .get(&id)
            .ok_or_else(|| SettlementError::not_found("payout request", id))?;
        let mut updated = current.clone();
        mutation(&mut updated)?;
        requests.insert(id, updated.clone());
        Ok(updated)
    }

    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<PayoutRequest>> {
        let requests = self.requests.read().await;
        let mut found: Vec<PayoutRequest> = requests
            .values()
            .filter(|r| r.landlord_id == landlord_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.requested_at);
        Ok(found)
    }
}

/// Versioned platform settings kept in memory.
#[derive(Default, Clone)]
pub struct InMemorySettingsStore {
    versions: Arc<RwLock<Vec<PlatformSettings>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn latest(versions: &[PlatformSettings]) -> Option<&PlatformSettings> {
    versions
        .iter()
        .max_by_key(|s| (s.effective_from, s.version))
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn current(&self) -> Result<Option<PlatformSettings>> {
        let versions = self.versions.read().await;
        Ok(latest(&versions).cloned())
    }

    async fn initialize(&self, initial: PlatformSettings) -> Result<PlatformSettings> {
        let mut versions = self.versions.write().await;
        if let Some(current) = latest(&versions) {
            return Ok(current.clone());
        }
        versions.push(initial.clone());
        Ok(initial)
    }

    async fn append(&self, next: PlatformSettings) -> Result<()> {
        let mut versions = self.versions.write().await;
        let expected = latest(&versions).map_or(1, |s| s.version + 1);
        if next.version != expected {
            return Err(SettlementError::InvalidTransition {
                entity: "platform settings",
                from: format!("version {}", expected - 1),
                to: format!("version {}", next.version),
            });
        }
        versions.push(next);
        Ok(())
    }

    async fn history(&self) -> Result<Vec<PlatformSettings>> {
        let versions = self.versions.read().await;
        Ok(versions.clone())
    }
}

/// Append-only audit trail kept in memory.
#[derive(Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }
}
