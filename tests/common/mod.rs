#![allow(dead_code)]

use async_trait::async_trait;
use escrowd::application::engine::{Collaborators, SettlementEngine, Stores};
use escrowd::config::SettlementConfig;
use escrowd::domain::collaborators::{
    ApplicationSnapshot, ApplicationStatus, Notification, Notifier, NotifierRef,
};
use escrowd::domain::event::ProviderEvent;
use escrowd::domain::payment::{Payment, ReleaseCondition};
use escrowd::error::{Result, SettlementError};
use escrowd::infrastructure::directory::{InMemoryApplicationDirectory, InMemoryKycDirectory};
use escrowd::infrastructure::outbound::{ChannelNotifier, RailBehavior, SimulatedRail};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub const LANDLORD: &str = "landlord-1";

/// An engine over in-memory stores with handles on every collaborator.
pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub stores: Stores,
    pub applications: InMemoryApplicationDirectory,
    pub kyc: InMemoryKycDirectory,
    pub rail: SimulatedRail,
    pub notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rail(RailBehavior::Succeed)
    }

    pub fn with_rail(behavior: RailBehavior) -> Self {
        let (notifier, notifications) = ChannelNotifier::new();
        Self::build(
            behavior,
            Arc::new(notifier),
            notifications,
            SettlementConfig::default(),
        )
    }

    /// A harness whose escrow holds last `days`, bypassing the loader's bounds.
    pub fn with_hold_days(days: i64) -> Self {
        let (notifier, notifications) = ChannelNotifier::new();
        let config = SettlementConfig {
            escrow_hold_days: days,
            ..SettlementConfig::default()
        };
        Self::build(RailBehavior::Succeed, Arc::new(notifier), notifications, config)
    }

    /// A harness whose notifier always fails.
    pub fn with_failing_notifier() -> Self {
        let (_unused, notifications) = ChannelNotifier::new();
        Self::build(
            RailBehavior::Succeed,
            Arc::new(FailingNotifier),
            notifications,
            SettlementConfig::default(),
        )
    }

    fn build(
        behavior: RailBehavior,
        notifier: NotifierRef,
        notifications: UnboundedReceiver<Notification>,
        config: SettlementConfig,
    ) -> Self {
        let stores = Stores::in_memory();
        let applications = InMemoryApplicationDirectory::new();
        let kyc = InMemoryKycDirectory::new();
        let rail = SimulatedRail::new(behavior);
        let engine = Arc::new(SettlementEngine::new(
            stores.clone(),
            Collaborators {
                applications: Arc::new(applications.clone()),
                kyc: Arc::new(kyc.clone()),
                notifier,
                rail: Arc::new(rail.clone()),
            },
            &config,
        ));
        Self {
            engine,
            stores,
            applications,
            kyc,
            rail,
            notifications,
        }
    }

    pub async fn add_application(&self, id: &str, status: ApplicationStatus) {
        self.applications
            .upsert(application(id, LANDLORD, status))
            .await;
    }

    /// Ingests a rent checkout, confirms both conditions and releases it.
    pub async fn released_rent(&self, application_id: &str, session: &str, amount: i64) -> Payment {
        let event = checkout(session, amount, Some(application_id), Some("rent"));
        let payment = self
            .engine
            .webhooks
            .handle(&event)
            .await
            .unwrap()
            .payment()
            .cloned()
            .unwrap();
        self.confirm_all(&payment).await;
        self.engine.escrow.release(payment.id, "admin").await.unwrap()
    }

    pub async fn confirm_all(&self, payment: &Payment) {
        for condition in [
            ReleaseCondition::VisitConfirmed,
            ReleaseCondition::DocumentsReceived,
        ] {
            self.engine
                .escrow
                .confirm_condition(payment.id, condition)
                .await
                .unwrap();
        }
    }

    /// Collects notifications dispatched so far, waiting briefly for spawned tasks.
    pub async fn drain_notifications(&mut self) -> Vec<Notification> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut received = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            received.push(notification);
        }
        received
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: Notification) -> Result<()> {
        Err(SettlementError::Provider("mail relay unavailable".to_string()))
    }
}

pub fn application(id: &str, landlord: &str, status: ApplicationStatus) -> ApplicationSnapshot {
    ApplicationSnapshot {
        id: id.to_string(),
        landlord_id: landlord.to_string(),
        status,
        lease_start: None,
        move_in_date: None,
        lease_months: None,
        application_fee_paid: false,
    }
}

pub fn checkout_json(
    session: &str,
    amount: i64,
    application_id: Option<&str>,
    intent_type: Option<&str>,
) -> Value {
    let mut metadata = json!({"userId": "tenant-1"});
    if let Some(application_id) = application_id {
        metadata["applicationId"] = json!(application_id);
    }
    if let Some(intent_type) = intent_type {
        metadata["intentType"] = json!(intent_type);
    }
    json!({
        "id": format!("evt_{session}"),
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": session,
            "payment_intent": format!("pi_{session}"),
            "amount_total": amount,
            "currency": "usd",
            "metadata": metadata
        }}
    })
}

pub fn checkout(
    session: &str,
    amount: i64,
    application_id: Option<&str>,
    intent_type: Option<&str>,
) -> ProviderEvent {
    serde_json::from_value(checkout_json(session, amount, application_id, intent_type)).unwrap()
}

pub fn intent_event(event_type: &str, intent_id: &str) -> ProviderEvent {
    serde_json::from_value(json!({
        "id": format!("evt_{event_type}_{intent_id}"),
        "type": event_type,
        "data": {"object": {"id": intent_id, "amount": 5000}}
    }))
    .unwrap()
}
