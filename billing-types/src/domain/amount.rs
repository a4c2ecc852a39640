//! Currency-checked monetary amount in minor units.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// ISO-4217 currencies accepted by the billing gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    UZS,
    USD,
    EUR,
    RUB,
    KZT,
    GBP,
}

impl Currency {
    /// Returns the number of decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::UZS
            | Currency::USD
            | Currency::EUR
            | Currency::RUB
            | Currency::KZT
            | Currency::GBP => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::UZS => "UZS",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::RUB => "RUB",
            Currency::KZT => "KZT",
            Currency::GBP => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UZS" => Ok(Currency::UZS),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "RUB" => Ok(Currency::RUB),
            "KZT" => Ok(Currency::KZT),
            "GBP" => Ok(Currency::GBP),
            other => Err(DomainError::Validation(format!("unknown currency: {other}"))),
        }
    }
}

/// Immutable amount: integer quantity of minor units plus currency.
///
/// Quantities are never negative. All arithmetic refuses to mix currencies
/// and reports overflow instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Amount {
    quantity: i64,
    currency: Currency,
}

impl Amount {
    pub fn new(quantity: i64, currency: Currency) -> Result<Self, DomainError> {
        if quantity < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { quantity, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            quantity: 0,
            currency,
        }
    }

    /// Quantity in minor units.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.quantity == 0
    }

    fn same_currency(&self, other: &Amount) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: Amount) -> Result<Amount, DomainError> {
        self.same_currency(&other)?;
        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Amount {
            quantity,
            currency: self.currency,
        })
    }

    /// Subtraction that never goes below zero.
    pub fn checked_sub(&self, other: Amount) -> Result<Amount, DomainError> {
        self.same_currency(&other)?;
        if other.quantity > self.quantity {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Amount {
            quantity: self.quantity - other.quantity,
            currency: self.currency,
        })
    }

    pub fn checked_mul(&self, factor: i64) -> Result<Amount, DomainError> {
        if factor < 0 {
            return Err(DomainError::NegativeAmount);
        }
        let quantity = self
            .quantity
            .checked_mul(factor)
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Amount {
            quantity,
            currency: self.currency,
        })
    }

    /// Renders the quantity in major units, e.g. `10000` UZS as `"100.00"`.
    pub fn to_major_string(&self) -> String {
        let places = self.currency.decimal_places();
        let divisor = 10_i64.pow(places);
        format!(
            "{}.{:0width$}",
            self.quantity / divisor,
            self.quantity % divisor,
            width = places as usize
        )
    }

    /// Parses a major-unit decimal such as `"100"`, `"100.5"` or `"100.50"`.
    /// More fraction digits than the currency has are rejected.
    pub fn from_major_str(s: &str, currency: Currency) -> Result<Amount, DomainError> {
        let invalid = || DomainError::Validation(format!("invalid amount: {s:?}"));
        let places = currency.decimal_places() as usize;
        let (whole, fraction) = s.trim().split_once('.').unwrap_or((s.trim(), ""));
        if whole.is_empty()
            || fraction.len() > places
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<places$}").parse().map_err(|_| invalid())?
        };
        let quantity = whole
            .checked_mul(10_i64.pow(places as u32))
            .and_then(|q| q.checked_add(fraction))
            .ok_or(DomainError::AmountOverflow)?;
        Amount::new(quantity, currency)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_creation() {
        let amount = Amount::new(10_000, Currency::UZS).unwrap();
        assert_eq!(amount.quantity(), 10_000);
        assert_eq!(amount.currency(), Currency::UZS);
    }

    #[test]
    fn test_negative_amount_fails() {
        let result = Amount::new(-100, Currency::USD);
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::new(100, Currency::USD).unwrap();
        let b = Amount::new(40, Currency::USD).unwrap();
        assert_eq!(a.checked_add(b).unwrap().quantity(), 140);
        assert_eq!(a.checked_sub(b).unwrap().quantity(), 60);
        assert_eq!(b.checked_mul(3).unwrap().quantity(), 120);
        assert!(matches!(b.checked_sub(a), Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Amount::new(100, Currency::USD).unwrap();
        let eur = Amount::new(50, Currency::EUR).unwrap();
        assert!(matches!(
            usd.checked_add(eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            usd.checked_sub(eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = Amount::new(i64::MAX, Currency::USD).unwrap();
        let one = Amount::new(1, Currency::USD).unwrap();
        assert!(matches!(
            big.checked_add(one),
            Err(DomainError::AmountOverflow)
        ));
        assert!(matches!(big.checked_mul(2), Err(DomainError::AmountOverflow)));
    }

    #[test]
    fn test_major_string() {
        assert_eq!(
            Amount::new(10_000, Currency::UZS).unwrap().to_major_string(),
            "100.00"
        );
        assert_eq!(
            Amount::new(1_050, Currency::USD).unwrap().to_major_string(),
            "10.50"
        );
        assert_eq!(
            Amount::new(7, Currency::EUR).unwrap().to_major_string(),
            "0.07"
        );
    }

    #[test]
    fn test_from_major_str() {
        let parse = |s| Amount::from_major_str(s, Currency::UZS).map(|a| a.quantity());
        assert_eq!(parse("100.00").unwrap(), 10_000);
        assert_eq!(parse("100.5").unwrap(), 10_050);
        assert_eq!(parse("1500").unwrap(), 150_000);
        assert!(parse("1.005").is_err());
        assert!(parse("-1.00").is_err());
        assert!(parse("abc").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("uzs".parse::<Currency>().unwrap(), Currency::UZS);
        assert!("XYZ".parse::<Currency>().is_err());
    }
}
