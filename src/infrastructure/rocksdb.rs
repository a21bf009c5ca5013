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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Payment records keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// `session:<id>` / `intent:<id>` to payment id.
pub const CF_PAYMENT_KEYS: &str = "payment_keys";
/// Landlord accounts keyed by landlord id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Payout requests keyed by payout id.
pub const CF_PAYOUTS: &str = "payouts";
/// Platform settings keyed by big-endian version.
pub const CF_SETTINGS: &str = "settings";
/// Audit entries keyed by big-endian sequence number.
pub const CF_AUDIT: &str = "audit";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_PAYMENTS,
    CF_PAYMENT_KEYS,
    CF_ACCOUNTS,
    CF_PAYOUTS,
    CF_SETTINGS,
    CF_AUDIT,
];

fn session_key(session_id: &str) -> Vec<u8> {
    format!("session:{session_id}").into_bytes()
}

fn intent_key(intent_id: &str) -> Vec<u8> {
    format!("intent:{intent_id}").into_bytes()
}

/// A persistent store implementing every settlement port over one RocksDB
/// instance, one column family per record kind.
///
/// Reads go straight to the database. Compound writes (insert-if-absent,
/// read-modify-write, guarded allocation) hold `write_lock` and commit
/// through a single `WriteBatch`, so an index entry and its record land
/// together. Clones share the database and the lock.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &'static str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn payment_by_key(&self, key: &[u8]) -> Result<Option<Payment>> {
        match self.db.get_pinned_cf(self.cf(CF_PAYMENT_KEYS)?, key)? {
            Some(id) => self.read(CF_PAYMENTS, &id),
            None => Ok(None),
        }
    }

    fn put_payment(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        let id = payment.id.as_bytes();
        self.put(batch, CF_PAYMENTS, id, payment)?;
        let keys = self.cf(CF_PAYMENT_KEYS)?;
        if let Some(session) = &payment.provider_session_id {
            batch.put_cf(keys, session_key(session), id);
        }
        if let Some(intent) = &payment.provider_payment_intent_id {
            batch.put_cf(keys, intent_key(intent), id);
        }
        Ok(())
    }

    fn last_key(&self, cf: &'static str) -> Result<Option<u64>> {
        match self.db.iterator_cf(self.cf(cf)?, IteratorMode::End).next() {
            Some(item) => {
                let (key, _value) = item?;
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    SettlementError::InternalError(Box::new(std::io::Error::other(format!(
                        "malformed key in {cf}"
                    ))))
                })?;
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentStore for RocksDbStore {
    async fn insert_if_absent(&self, payment: Payment) -> Result<Insertion<Payment>> {
        let _guard = self.write_lock.lock().await;
        for key in [
            payment.provider_session_id.as_deref().map(session_key),
            payment.provider_payment_intent_id.as_deref().map(intent_key),
        ]
        .into_iter()
        .flatten()
        {
            if let Some(existing) = self.payment_by_key(&key)? {
                return Ok(Insertion::Existing(existing));
            }
        }

        let mut batch = WriteBatch::default();
        self.put_payment(&mut batch, &payment)?;
        self.db.write(batch)?;
        Ok(Insertion::Inserted(payment))
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Option<Payment>> {
        self.payment_by_key(&session_key(session_id))
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        self.payment_by_key(&intent_key(intent_id))
    }

    async fn modify(&self, id: PaymentId, mutation: Mutation<Payment>) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;
        let mut payment: Payment = self
            .read(CF_PAYMENTS, id.as_bytes())?
            .ok_or_else(|| SettlementError::not_found("payment", id))?;
        mutation(&mut payment)?;

        let mut batch = WriteBatch::default();
        self.put_payment(&mut batch, &payment)?;
        self.db.write(batch)?;
        Ok(payment)
    }

    async fn latest_completed_rent(&self, application_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| {
                p.payment_type == PaymentType::Rent
                    && p.status == PaymentStatus::Completed
                    && p.application_id.as_deref() == Some(application_id)
            })
            .max_by_key(|p| p.created_at))
    }

    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.landlord_id.as_deref() == Some(landlord_id))
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id));
        Ok(payments)
    }

    async fn allocate(&self, ids: &[PaymentId], payout: PayoutId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut payments = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read::<Payment>(CF_PAYMENTS, id.as_bytes())? {
                Some(payment) if payment.is_payout_eligible() => payments.push(payment),
                _ => return Ok(false),
            }
        }

        let now = Utc::now();
        let mut batch = WriteBatch::default();
        for payment in &mut payments {
            payment.allocate(payout, now);
            self.put(&mut batch, CF_PAYMENTS, payment.id.as_bytes(), payment)?;
        }
        self.db.write(batch)?;
        Ok(true)
    }

    async fn deallocate(&self, payout: PayoutId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut released = 0;
        for mut payment in self.scan::<Payment>(CF_PAYMENTS)? {
            if payment.payout_request == Some(payout) {
                payment.deallocate(now);
                self.put(&mut batch, CF_PAYMENTS, payment.id.as_bytes(), &payment)?;
                released += 1;
            }
        }
        self.db.write(batch)?;
        Ok(released)
    }
}

#[async_trait]
impl AccountStore for RocksDbStore {
    async fn get(&self, landlord_id: &str) -> Result<Option<LandlordAccount>> {
        self.read(CF_ACCOUNTS, landlord_id.as_bytes())
    }

    async fn get_or_create(&self, account: LandlordAccount) -> Result<LandlordAccount> {
        let _guard = self.write_lock.lock().await;
        let key = account.landlord_id.as_bytes();
        if let Some(existing) = self.read(CF_ACCOUNTS, key)? {
            return Ok(existing);
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, key, &account)?;
        self.db.write(batch)?;
        Ok(account)
    }

    async fn modify(
        &self,
        landlord_id: &str,
        mutation: Mutation<LandlordAccount>,
    ) -> Result<LandlordAccount> {
        let _guard = self.write_lock.lock().await;
        let key = landlord_id.as_bytes();
        let mut account: LandlordAccount = self
            .read(CF_ACCOUNTS, key)?
            .ok_or_else(|| SettlementError::not_found("landlord account", landlord_id))?;
        mutation(&mut account)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, key, &account)?;
        self.db.write(batch)?;
        Ok(account)
    }

    async fn get_all(&self) -> Result<Vec<LandlordAccount>> {
        // Keys are landlord ids, so iteration order is already sorted.
        self.scan(CF_ACCOUNTS)
    }
}

#[async_trait]
impl PayoutStore for RocksDbStore {
    async fn insert(&self, request: PayoutRequest) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_PAYOUTS, request.id.as_bytes(), &request)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: PayoutId) -> Result<Option<PayoutRequest>> {
        self.read(CF_PAYOUTS, id.as_bytes())
    }

    async fn modify(
        &self,
        id: PayoutId,
        mutation: Mutation<PayoutRequest>,
    ) -> Result<PayoutRequest> {
        let _guard = self.write_lock.lock().await;
        let mut request: PayoutRequest = self
            .read(CF_PAYOUTS, id.as_bytes())?
            .ok_or_else(|| SettlementError::not_found("payout request", id))?;
        mutation(&mut request)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_PAYOUTS, id.as_bytes(), &request)?;
        self.db.write(batch)?;
        Ok(request)
    }

    async fn for_landlord(&self, landlord_id: &str) -> Result<Vec<PayoutRequest>> {
        let mut found: Vec<PayoutRequest> = self
            .scan::<PayoutRequest>(CF_PAYOUTS)?
            .into_iter()
            .filter(|r| r.landlord_id == landlord_id)
            .collect();
        found.sort_by_key(|r| r.requested_at);
        Ok(found)
    }
}

impl RocksDbStore {
    fn current_settings(&self) -> Result<Option<PlatformSettings>> {
        Ok(self
            .scan::<PlatformSettings>(CF_SETTINGS)?
            .into_iter()
            .max_by_key(|s| (s.effective_from, s.version)))
    }
}

#[async_trait]
impl SettingsStore for RocksDbStore {
    async fn current(&self) -> Result<Option<PlatformSettings>> {
        self.current_settings()
    }

    async fn initialize(&self, initial: PlatformSettings) -> Result<PlatformSettings> {
        let _guard = self.write_lock.lock().await;
        if let Some(current) = self.current_settings()? {
            return Ok(current);
        }
        let mut batch = WriteBatch::default();
        self.put(
            &mut batch,
            CF_SETTINGS,
            &initial.version.to_be_bytes(),
            &initial,
        )?;
        self.db.write(batch)?;
        Ok(initial)
    }

    async fn append(&self, next: PlatformSettings) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let expected = self.current_settings()?.map_or(1, |s| s.version + 1);
        if next.version != expected {
            return Err(SettlementError::InvalidTransition {
                entity: "platform settings",
                from: format!("version {}", expected - 1),
                to: format!("version {}", next.version),
            });
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_SETTINGS, &next.version.to_be_bytes(), &next)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn history(&self) -> Result<Vec<PlatformSettings>> {
        self.scan(CF_SETTINGS)
    }
}

#[async_trait]
impl AuditLog for RocksDbStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let sequence = self.last_key(CF_AUDIT)?.map_or(0, |last| last + 1);
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_AUDIT, &sequence.to_be_bytes(), &entry)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>> {
        self.scan(CF_AUDIT)
    }
}
