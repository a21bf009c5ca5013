use crate::domain::account::PayoutBlocker;
use crate::domain::money::Money;
use crate::domain::payment::ReleaseCondition;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("escrow release blocked, unmet conditions: {}", join(.0))]
    EscrowConditionsUnmet(Vec<ReleaseCondition>),
    #[error("payout not allowed: {}", join(.0))]
    PayoutNotAllowed(Vec<PayoutBlocker>),
    #[error("insufficient funds: requested {requested}, allocatable {allocatable}")]
    InsufficientFunds { requested: Money, allocatable: Money },
    #[error("payments were claimed by a concurrent payout request")]
    AllocationConflict,
    #[error("payment provider error: {0}")]
    Provider(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SettlementError>;
