//! Pure commission arithmetic.
//!
//! Amounts are minor currency units, so "rounded to the currency's minor-unit
//! precision" means rounded to a whole number, half away from zero. Both
//! functions are deterministic, which lets historical audit entries be
//! recomputed exactly.

use crate::domain::money::Money;
use crate::error::{Result, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A commission rate validated to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    pub const ZERO: Self = Self(Decimal::ZERO);
    /// Platform rate used until an administrator sets another one.
    pub const DEFAULT: Self = Self(Decimal::from_parts(10, 0, 0, false, 2));

    pub fn new(rate: Decimal) -> Result<Self> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(SettlementError::invalid(
                "commission_rate",
                format!("{rate} is outside [0, 1]"),
            ));
        }
        Ok(Self(rate))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for CommissionRate {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CommissionRate> for Decimal {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Commission owed to the platform on `gross` at `rate`.
pub fn calculate_commission(gross: Decimal, rate: Decimal) -> Result<Decimal> {
    if gross < Decimal::ZERO {
        return Err(SettlementError::invalid("gross", "must not be negative"));
    }
    let rate = CommissionRate::new(rate)?;
    Ok(Money::new(gross * rate.value()).round_minor().value())
}

/// Landlord's share after commission and interest, floored at zero.
pub fn calculate_net_amount(gross: Decimal, rate: Decimal, interest: Decimal) -> Result<Decimal> {
    if interest < Decimal::ZERO {
        return Err(SettlementError::invalid("interest", "must not be negative"));
    }
    let commission = calculate_commission(gross, rate)?;
    Ok((gross - commission - interest).max(Decimal::ZERO))
}

/// The figures fixed on a payment at escrow release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub gross: Money,
    pub rate: CommissionRate,
    pub commission: Money,
    pub net: Money,
}

impl CommissionBreakdown {
    pub fn compute(gross: Money, rate: CommissionRate) -> Result<Self> {
        let commission = calculate_commission(gross.value(), rate.value())?;
        let net = calculate_net_amount(gross.value(), rate.value(), Decimal::ZERO)?;
        Ok(Self {
            gross,
            rate,
            commission: Money::new(commission),
            net: Money::new(net),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_commission_on_round_amount() {
        assert_eq!(calculate_commission(dec!(100000), dec!(0.10)).unwrap(), dec!(10000));
        assert_eq!(
            calculate_net_amount(dec!(100000), dec!(0.10), Decimal::ZERO).unwrap(),
            dec!(90000)
        );
    }

    #[test]
    fn test_commission_rounds_half_away_from_zero() {
        // 125 * 0.02 = 2.5
        assert_eq!(calculate_commission(dec!(125), dec!(0.02)).unwrap(), dec!(3));
        // 124 * 0.02 = 2.48
        assert_eq!(calculate_commission(dec!(124), dec!(0.02)).unwrap(), dec!(2));
    }

    #[test]
    fn test_net_is_floored_at_zero() {
        assert_eq!(
            calculate_net_amount(dec!(100), dec!(0.10), dec!(95)).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_default_rate_is_ten_percent() {
        assert_eq!(CommissionRate::DEFAULT.value(), dec!(0.10));
        assert_eq!(CommissionRate::new(dec!(0.10)).unwrap(), CommissionRate::DEFAULT);
    }

    #[test]
    fn test_rate_bounds() {
        assert!(calculate_commission(dec!(100), dec!(0)).is_ok());
        assert!(calculate_commission(dec!(100), dec!(1)).is_ok());
        assert!(matches!(
            calculate_commission(dec!(100), dec!(1.01)),
            Err(SettlementError::InvalidArgument {
                field: "commission_rate",
                ..
            })
        ));
        assert!(calculate_commission(dec!(100), dec!(-0.1)).is_err());
    }

    #[test]
    fn test_negative_inputs_rejected() {
        assert!(matches!(
            calculate_commission(dec!(-1), dec!(0.1)),
            Err(SettlementError::InvalidArgument { field: "gross", .. })
        ));
        assert!(matches!(
            calculate_net_amount(dec!(100), dec!(0.1), dec!(-1)),
            Err(SettlementError::InvalidArgument {
                field: "interest",
                ..
            })
        ));
    }

    #[test]
    fn test_breakdown_adds_up() {
        let breakdown =
            CommissionBreakdown::compute(Money::from(123457), CommissionRate::new(dec!(0.085)).unwrap())
                .unwrap();
        assert_eq!(breakdown.commission, Money::from(10494));
        assert_eq!(breakdown.commission + breakdown.net, breakdown.gross);
    }

    #[test]
    fn test_rate_deserialization_is_validated() {
        let ok: CommissionRate = serde_json::from_str("\"0.15\"").unwrap();
        assert_eq!(ok.value(), dec!(0.15));
        assert!(serde_json::from_str::<CommissionRate>("\"1.5\"").is_err());
    }
}
