use thiserror::Error;

use super::transaction::Transaction;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("No transaction at position {index} (store holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// The ordered working set of one session, in document reading order.
///
/// Records are only ever installed wholesale or removed whole. There is no
/// field-level editing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionStore {
    transactions: Vec<Transaction>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the current collection and install `transactions` in the given order.
    pub fn replace_all(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
    }

    /// Remove the record currently at `index`. Positions after it shift down by one.
    pub fn remove_at(&mut self, index: usize) -> Result<Transaction, StoreError> {
        if index >= self.transactions.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.transactions.len(),
            });
        }
        Ok(self.transactions.remove(index))
    }

    pub fn count(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.transactions.iter()
    }
}

impl<'a> IntoIterator for &'a TransactionStore {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
