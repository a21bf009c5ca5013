//! Notification sinks and a simulated payment rail.

use crate::domain::collaborators::{
    Notification, Notifier, TransferInstruction, TransferRail, TransferStatus,
};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Writes notifications to the log. Used by the CLI.
#[derive(Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        tracing::info!(?notification, "notification dispatched");
        Ok(())
    }
}

/// Forwards notifications into a channel so tests can observe them.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sender
            .send(notification)
            .map_err(|e| SettlementError::InternalError(Box::new(e)))
    }
}

/// How the simulated rail answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RailBehavior {
    /// Transfers settle immediately.
    Succeed,
    /// Transfers are accepted but stay pending until `settle` is called.
    Hold,
    /// Transfers are accepted, then reported failed.
    FailTransfer(String),
    /// The provider refuses to create the transfer.
    Refuse(String),
}

#[derive(Default)]
struct RailLedger {
    by_key: HashMap<Uuid, String>,
    statuses: HashMap<String, TransferStatus>,
    instructions: Vec<TransferInstruction>,
}

/// An in-process payment rail that honours idempotency keys the way real
/// providers do: a repeated key returns the original transfer.
#[derive(Clone)]
pub struct SimulatedRail {
    behavior: RailBehavior,
    ledger: Arc<Mutex<RailLedger>>,
}

impl SimulatedRail {
    pub fn new(behavior: RailBehavior) -> Self {
        Self {
            behavior,
            ledger: Arc::new(Mutex::new(RailLedger::default())),
        }
    }

    /// Instructions that created a new transfer, in order.
    pub async fn instructions(&self) -> Vec<TransferInstruction> {
        self.ledger.lock().await.instructions.clone()
    }

    pub async fn settle(&self, transfer_id: &str, status: TransferStatus) {
        let mut ledger = self.ledger.lock().await;
        ledger.statuses.insert(transfer_id.to_string(), status);
    }
}

#[async_trait]
impl TransferRail for SimulatedRail {
    async fn initiate_transfer(&self, instruction: TransferInstruction) -> Result<String> {
        if let RailBehavior::Refuse(reason) = &self.behavior {
            return Err(SettlementError::Provider(reason.clone()));
        }
        let mut ledger = self.ledger.lock().await;
        if let Some(existing) = ledger.by_key.get(&instruction.idempotency_key) {
            return Ok(existing.clone());
        }

        let transfer_id = format!("tr_{}", ledger.instructions.len() + 1);
        let status = match &self.behavior {
            RailBehavior::Succeed => TransferStatus::Succeeded,
            RailBehavior::FailTransfer(reason) => TransferStatus::Failed(reason.clone()),
            RailBehavior::Hold | RailBehavior::Refuse(_) => TransferStatus::Pending,
        };
        ledger
            .by_key
            .insert(instruction.idempotency_key, transfer_id.clone());
        ledger.statuses.insert(transfer_id.clone(), status);
        ledger.instructions.push(instruction);
        Ok(transfer_id)
    }

    async fn transfer_status(&self, transfer_id: &str) -> Result<TransferStatus> {
        let ledger = self.ledger.lock().await;
        ledger
            .statuses
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| SettlementError::not_found("transfer", transfer_id))
    }
}
