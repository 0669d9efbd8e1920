use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Amount plus ISO-like currency code, captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMoney", into = "RawMoney")]
pub struct Money {
    amount: Decimal,
    currency: String,
}

#[derive(Serialize, Deserialize)]
struct RawMoney {
    amount: Decimal,
    currency: String,
}

impl TryFrom<RawMoney> for Money {
    type Error = DomainError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::new(raw.amount, raw.currency)
    }
}

impl From<Money> for RawMoney {
    fn from(m: Money) -> Self {
        Self {
            amount: m.amount,
            currency: m.currency,
        }
    }
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Result<Self, DomainError> {
        let currency = currency.into().trim().to_uppercase();
        if amount < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "Amount must be non-negative, got {amount}"
            )));
        }
        if currency.is_empty() {
            return Err(DomainError::invariant("Currency is required"));
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::invariant(format!(
                "Cannot add {} to {}",
                other.currency, self.currency
            )));
        }
        Ok(Self {
            amount: self.amount + other.amount,
            currency: self.currency.clone(),
        })
    }

    pub fn times(&self, quantity: Quantity) -> Money {
        Self {
            amount: self.amount * Decimal::from(quantity.get()),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value < 1 {
            return Err(DomainError::invariant("Quantity must be at least 1"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Quantity {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}
