use crate::domain::commission::CommissionRate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One version of the platform's settings. The current version is the one
/// with the latest `effective_from`; older versions are kept, never edited.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PlatformSettings {
    pub version: u64,
    pub commission_rate: CommissionRate,
    pub effective_from: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub change_reason: Option<String>,
}

impl PlatformSettings {
    pub fn initial(commission_rate: CommissionRate, now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            commission_rate,
            effective_from: now,
            changed_by: None,
            change_reason: None,
        }
    }

    pub fn next(
        &self,
        commission_rate: CommissionRate,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: self.version + 1,
            commission_rate,
            effective_from: now,
            changed_by: Some(actor.to_string()),
            change_reason: Some(reason.to_string()),
        }
    }
}
