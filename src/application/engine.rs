use super::escrow::EscrowService;
use super::ledger::LedgerService;
use super::payout::PayoutEngine;
use super::settings::SettingsService;
use super::webhook::WebhookIngestor;
use crate::config::SettlementConfig;
use crate::domain::account::LandlordAccount;
use crate::domain::collaborators::{
    ApplicationDirectoryRef, KycDirectoryRef, NotifierRef, TransferRailRef,
};
use crate::domain::ports::{
    AccountStore, AccountStoreRef, AuditLog, AuditLogRef, PaymentStore, PaymentStoreRef,
    PayoutStore, PayoutStoreRef, SettingsStore, SettingsStoreRef,
};
use crate::error::Result;
use crate::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryAuditLog, InMemoryPaymentStore, InMemoryPayoutStore,
    InMemorySettingsStore,
};
use std::sync::Arc;

/// The durable state every service works against.
#[derive(Clone)]
pub struct Stores {
    pub payments: PaymentStoreRef,
    pub accounts: AccountStoreRef,
    pub payouts: PayoutStoreRef,
    pub settings: SettingsStoreRef,
    pub audit: AuditLogRef,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            payments: Arc::new(InMemoryPaymentStore::new()),
            accounts: Arc::new(InMemoryAccountStore::new()),
            payouts: Arc::new(InMemoryPayoutStore::new()),
            settings: Arc::new(InMemorySettingsStore::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
        }
    }

    /// Backs every port with clones of one adapter, e.g. a single database handle.
    pub fn shared<S>(store: S) -> Self
    where
        S: PaymentStore + AccountStore + PayoutStore + SettingsStore + AuditLog + Clone + 'static,
    {
        Self {
            payments: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            payouts: Arc::new(store.clone()),
            settings: Arc::new(store.clone()),
            audit: Arc::new(store),
        }
    }
}

/// External services the settlement core talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub applications: ApplicationDirectoryRef,
    pub kyc: KycDirectoryRef,
    pub notifier: NotifierRef,
    pub rail: TransferRailRef,
}

/// Entry point wiring the settlement services over one set of stores.
///
/// Services hold no authoritative state of their own, so any number of
/// engines (or concurrent calls into one) can share the same stores.
pub struct SettlementEngine {
    pub webhooks: WebhookIngestor,
    pub escrow: EscrowService,
    pub ledger: Arc<LedgerService>,
    pub payouts: PayoutEngine,
    pub settings: Arc<SettingsService>,
}

impl SettlementEngine {
    pub fn new(stores: Stores, collaborators: Collaborators, config: &SettlementConfig) -> Self {
        let settings = Arc::new(SettingsService::new(
            Arc::clone(&stores.settings),
            Arc::clone(&stores.audit),
            config.default_commission_rate,
        ));
        let ledger = Arc::new(LedgerService::new(
            Arc::clone(&stores.accounts),
            Arc::clone(&stores.payments),
            Arc::clone(&collaborators.kyc),
            config.minimum_payout,
        ));
        let webhooks = WebhookIngestor::new(
            Arc::clone(&stores.payments),
            Arc::clone(&collaborators.applications),
            Arc::clone(&collaborators.notifier),
            config.escrow_hold_window(),
            config.default_lease_months,
            config.default_currency.clone(),
        );
        let escrow = EscrowService::new(
            Arc::clone(&stores.payments),
            Arc::clone(&ledger),
            Arc::clone(&settings),
            Arc::clone(&stores.audit),
            Arc::clone(&collaborators.notifier),
        );
        let payouts = PayoutEngine::new(
            Arc::clone(&stores.payments),
            Arc::clone(&stores.payouts),
            Arc::clone(&ledger),
            Arc::clone(&collaborators.rail),
            Arc::clone(&collaborators.notifier),
            config.default_currency.clone(),
        );

        Self {
            webhooks,
            escrow,
            ledger,
            payouts,
            settings,
        }
    }

    /// Consumes the engine and returns the final state of all landlord accounts.
    pub async fn into_results(self) -> Result<Vec<LandlordAccount>> {
        self.ledger.accounts().await
    }
}
