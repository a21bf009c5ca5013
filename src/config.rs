use crate::domain::commission::CommissionRate;
use crate::domain::money::{Currency, Money};
use chrono::Duration;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Longest escrow hold the loader accepts.
pub const MAX_ESCROW_HOLD_DAYS: i64 = 3650;

/// Knobs of the settlement core.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// How long rent stays in escrow before the hold is considered expired.
    pub escrow_hold_days: i64,
    /// Lease length used for rent periods when the application declares none.
    pub default_lease_months: u32,
    /// Smallest payout a landlord may request, in minor units.
    pub minimum_payout: Money,
    /// Seeds the first platform settings version.
    pub default_commission_rate: CommissionRate,
    pub default_currency: Currency,
    pub log_level: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            escrow_hold_days: 10,
            default_lease_months: 12,
            minimum_payout: Money::from(5000),
            default_commission_rate: CommissionRate::DEFAULT,
            default_currency: Currency::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl SettlementConfig {
    /// Reads overrides from the environment (and `.env`, if present).
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let escrow_hold_days = parse_var("ESCROW_HOLD_DAYS", "between 0 and 3650 days")?
            .unwrap_or(defaults.escrow_hold_days);
        if !(0..=MAX_ESCROW_HOLD_DAYS).contains(&escrow_hold_days) {
            return Err(ConfigError::Invalid {
                name: "ESCROW_HOLD_DAYS",
                value: escrow_hold_days.to_string(),
                expected: "between 0 and 3650 days",
            });
        }

        let default_lease_months =
            match parse_var::<u32>("DEFAULT_LEASE_MONTHS", "a positive month count")? {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        name: "DEFAULT_LEASE_MONTHS",
                        value: "0".to_string(),
                        expected: "a positive month count",
                    });
                }
                Some(months) => months,
                None => defaults.default_lease_months,
            };

        let minimum_payout =
            match parse_var::<Decimal>("MINIMUM_PAYOUT", "a whole, non-negative amount in minor units")? {
                Some(amount) if amount < Decimal::ZERO || !amount.fract().is_zero() => {
                    return Err(ConfigError::Invalid {
                        name: "MINIMUM_PAYOUT",
                        value: amount.to_string(),
                        expected: "a whole, non-negative amount in minor units",
                    });
                }
                Some(amount) => Money::new(amount),
                None => defaults.minimum_payout,
            };

        let default_commission_rate =
            match parse_var::<Decimal>("DEFAULT_COMMISSION_RATE", "a rate between 0 and 1")? {
                Some(rate) => CommissionRate::new(rate).map_err(|_| ConfigError::Invalid {
                    name: "DEFAULT_COMMISSION_RATE",
                    value: rate.to_string(),
                    expected: "a rate between 0 and 1",
                })?,
                None => defaults.default_commission_rate,
            };

        let default_currency = env::var("DEFAULT_CURRENCY")
            .map(Currency::new)
            .unwrap_or(defaults.default_currency);
        let log_level = env::var("LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            escrow_hold_days,
            default_lease_months,
            minimum_payout,
            default_commission_rate,
            default_currency,
            log_level,
        })
    }

    /// Out-of-range day counts map to `Duration::MAX`, which escrow holds reject.
    pub fn escrow_hold_window(&self) -> Duration {
        Duration::try_days(self.escrow_hold_days).unwrap_or(Duration::MAX)
    }
}

fn parse_var<T: FromStr>(name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                name,
                value,
                expected,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "ESCROW_HOLD_DAYS",
            "DEFAULT_LEASE_MONTHS",
            "MINIMUM_PAYOUT",
            "DEFAULT_COMMISSION_RATE",
            "DEFAULT_CURRENCY",
            "LOG_LEVEL",
        ] {
            // SAFETY: env mutation is serialized by `env_guard`.
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn test_load_uses_defaults() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = SettlementConfig::load().expect("config loads with defaults");
        assert_eq!(config.escrow_hold_days, 10);
        assert_eq!(config.default_lease_months, 12);
        assert_eq!(config.minimum_payout, Money::from(5000));
        assert_eq!(config.default_commission_rate.value(), dec!(0.10));
        assert_eq!(config.escrow_hold_window(), Duration::days(10));
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        unsafe { env::set_var("DEFAULT_COMMISSION_RATE", "1.5") };
        let result = SettlementConfig::load();
        reset_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "DEFAULT_COMMISSION_RATE",
                ..
            })
        ));
    }

    #[test]
    fn test_escrow_hold_days_are_bounded() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        unsafe { env::set_var("ESCROW_HOLD_DAYS", "100000000") };
        let result = SettlementConfig::load();
        reset_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "ESCROW_HOLD_DAYS",
                ..
            })
        ));
    }

    #[test]
    fn test_fractional_minimum_payout_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        unsafe { env::set_var("MINIMUM_PAYOUT", "2500.5") };
        let result = SettlementConfig::load();
        reset_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "MINIMUM_PAYOUT",
                ..
            })
        ));
    }

    #[test]
    fn test_hold_window_saturates_instead_of_panicking() {
        let config = SettlementConfig {
            escrow_hold_days: i64::MAX,
            ..SettlementConfig::default()
        };
        assert_eq!(config.escrow_hold_window(), Duration::MAX);
    }

    #[test]
    fn test_overrides_are_read() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        unsafe {
            env::set_var("ESCROW_HOLD_DAYS", "14");
            env::set_var("MINIMUM_PAYOUT", "2500");
        }
        let config = SettlementConfig::load().expect("config loads");
        reset_env();
        assert_eq!(config.escrow_hold_days, 14);
        assert_eq!(config.minimum_payout, Money::from(2500));
    }
}
