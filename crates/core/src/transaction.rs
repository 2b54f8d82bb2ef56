use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::money::Amount;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Negative amount: {0}")]
    NegativeAmount(Decimal),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid date (expected DD/MM/YYYY): {0}")]
    InvalidDate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Money in: refunds, deposits.
    Income,
    /// Money out: purchases, withdrawals.
    Expense,
}

impl TransactionType {
    pub const ALL: [TransactionType; 2] = [TransactionType::Income, TransactionType::Expense];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOME" => Ok(TransactionType::Income),
            "EXPENSE" => Ok(TransactionType::Expense),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

// ── Ledger date ───────────────────────────────────────────────────────────────

fn re_ledger_date() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("invalid regex"))
}

const LEDGER_DATE_FORMAT: &str = "%d/%m/%Y";

/// A calendar date that always renders as `DD/MM/YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerDate(NaiveDate);

impl LedgerDate {
    /// Accepts only zero-padded `DD/MM/YYYY` naming a real calendar day.
    pub fn parse(s: &str) -> Result<Self, TransactionError> {
        let s = s.trim();
        if !re_ledger_date().is_match(s) {
            return Err(TransactionError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, LEDGER_DATE_FORMAT)
            .map(LedgerDate)
            .map_err(|_| TransactionError::InvalidDate(s.to_string()))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(LedgerDate)
    }

    pub fn naive(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for LedgerDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(LEDGER_DATE_FORMAT))
    }
}

impl TryFrom<String> for LedgerDate {
    type Error = TransactionError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        LedgerDate::parse(&value)
    }
}

impl From<LedgerDate> for String {
    fn from(date: LedgerDate) -> Self {
        date.to_string()
    }
}

// ── Transactions ──────────────────────────────────────────────────────────────

/// One row as the recognition service reports it, before any invariant is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub date: String,
    pub description: String,
    pub amount: serde_json::Number,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: LedgerDate,
    /// Stored as recognized. Delimiter-safety is an export concern.
    pub description: String,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

impl Transaction {
    pub fn new(
        date: LedgerDate,
        description: impl Into<String>,
        amount: Amount,
        kind: TransactionType,
    ) -> Self {
        Transaction {
            date,
            description: description.into(),
            amount,
            kind,
        }
    }

    pub fn validate(raw: RawTransaction) -> Result<Transaction, TransactionError> {
        let date = LedgerDate::parse(&raw.date)?;
        let amount = Amount::parse(&raw.amount.to_string())?;

        Ok(Transaction {
            date,
            description: raw.description,
            amount,
            kind: raw.kind,
        })
    }

    pub fn is_income(&self) -> bool {
        self.kind == TransactionType::Income
    }

    /// `+12.30` / `-4.50`, two decimals, for screen tables.
    pub fn signed_display(&self) -> String {
        match self.kind {
            TransactionType::Income => format!("+{}", self.amount.to_fixed_2()),
            TransactionType::Expense => format!("-{}", self.amount.to_fixed_2()),
        }
    }
}
