use crate::domain::audit::AuditEntry;
use crate::domain::commission::CommissionRate;
use crate::domain::ports::{AuditLogRef, SettingsStoreRef};
use crate::domain::settings::PlatformSettings;
use crate::error::{Result, SettlementError};
use chrono::Utc;
use rust_decimal::Decimal;

/// Platform settings with an audited change history.
pub struct SettingsService {
    store: SettingsStoreRef,
    audit: AuditLogRef,
    default_rate: CommissionRate,
}

impl SettingsService {
    pub fn new(store: SettingsStoreRef, audit: AuditLogRef, default_rate: CommissionRate) -> Self {
        Self {
            store,
            audit,
            default_rate,
        }
    }

    /// The latest version, seeding version 1 from the configured default.
    pub async fn current(&self) -> Result<PlatformSettings> {
        if let Some(current) = self.store.current().await? {
            return Ok(current);
        }
        self.store
            .initialize(PlatformSettings::initial(self.default_rate, Utc::now()))
            .await
    }

    pub async fn current_rate(&self) -> Result<CommissionRate> {
        Ok(self.current().await?.commission_rate)
    }

    pub async fn update_commission_rate(
        &self,
        rate: Decimal,
        reason: &str,
        actor: &str,
    ) -> Result<PlatformSettings> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SettlementError::invalid("reason", "a rate change needs a reason"));
        }
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(SettlementError::invalid("actor", "must not be empty"));
        }
        let new_rate = CommissionRate::new(rate)?;

        let current = self.current().await?;
        let now = Utc::now();
        let next = current.next(new_rate, actor, reason, now);
        self.store.append(next.clone()).await?;
        self.audit
            .append(AuditEntry::RateChanged {
                old_rate: current.commission_rate,
                new_rate,
                reason: reason.to_string(),
                actor: actor.to_string(),
                at: now,
            })
            .await?;

        tracing::info!(
            old_rate = %current.commission_rate,
            new_rate = %new_rate,
            version = next.version,
            actor,
            "commission rate changed"
        );
        Ok(next)
    }

    pub async fn audit_trail(&self) -> Result<Vec<AuditEntry>> {
        self.audit.entries().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{InMemoryAuditLog, InMemorySettingsStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service() -> SettingsService {
        SettingsService::new(
            Arc::new(InMemorySettingsStore::new()),
            Arc::new(InMemoryAuditLog::new()),
            CommissionRate::new(dec!(0.10)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_current_is_seeded_once() {
        let service = service();
        let first = service.current().await.unwrap();
        let second = service.current().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.version, 1);
        assert_eq!(first.commission_rate.value(), dec!(0.10));
    }

    #[tokio::test]
    async fn test_rate_change_is_audited() {
        let service = service();
        let next = service
            .update_commission_rate(dec!(0.12), "annual review", "admin-1")
            .await
            .unwrap();
        assert_eq!(next.version, 2);
        assert_eq!(service.current_rate().await.unwrap().value(), dec!(0.12));

        let trail = service.audit_trail().await.unwrap();
        assert_eq!(trail.len(), 1);
        assert!(matches!(
            &trail[0],
            AuditEntry::RateChanged { old_rate, new_rate, reason, actor, .. }
                if old_rate.value() == dec!(0.10)
                    && new_rate.value() == dec!(0.12)
                    && reason == "annual review"
                    && actor == "admin-1"
        ));
    }

    #[tokio::test]
    async fn test_rate_change_validation() {
        let service = service();
        assert!(matches!(
            service.update_commission_rate(dec!(0.12), " ", "admin").await,
            Err(SettlementError::InvalidArgument { field: "reason", .. })
        ));
        assert!(matches!(
            service.update_commission_rate(dec!(1.2), "typo", "admin").await,
            Err(SettlementError::InvalidArgument {
                field: "commission_rate",
                ..
            })
        ));
        assert!(service.audit_trail().await.unwrap().is_empty());
        assert_eq!(service.current_rate().await.unwrap().value(), dec!(0.10));
    }
}
