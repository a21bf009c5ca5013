use crate::domain::commission::CommissionRate;
use crate::domain::money::Money;
use crate::domain::payment::PaymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of money-relevant decisions.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    RateChanged {
        old_rate: CommissionRate,
        new_rate: CommissionRate,
        reason: String,
        actor: String,
        at: DateTime<Utc>,
    },
    CommissionCalculated {
        payment_id: PaymentId,
        gross: Money,
        rate: CommissionRate,
        commission: Money,
        net: Money,
        actor: String,
        at: DateTime<Utc>,
    },
}

impl AuditEntry {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::RateChanged { at, .. } | AuditEntry::CommissionCalculated { at, .. } => *at,
        }
    }
}
