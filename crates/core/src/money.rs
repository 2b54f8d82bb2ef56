use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::transaction::TransactionError;

/// Unsigned transaction magnitude. Direction lives on `TransactionType`, never in the number.
///
/// The value is kept normalized (`4.50` → `4.5`, `10.0` → `10`, `-0` → `0`) so `Display`
/// reproduces the plain numeric form the recognition service reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, TransactionError> {
        let value = value.normalize();
        if value < Decimal::ZERO {
            return Err(TransactionError::NegativeAmount(value));
        }
        Ok(Amount(value))
    }

    /// Parse the textual form of a JSON number (`"4.5"`, `"10"`, `"10.0"`).
    pub fn parse(text: &str) -> Result<Self, TransactionError> {
        let text = text.trim();
        let value = Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map_err(|_| TransactionError::InvalidAmount(text.to_string()))?;
        Amount::new(value)
    }

    pub fn zero() -> Self {
        Amount(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// Two-decimal rendering for on-screen tables. Exports use `Display` instead.
    pub fn to_fixed_2(self) -> String {
        format!("{:.2}", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = TransactionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
