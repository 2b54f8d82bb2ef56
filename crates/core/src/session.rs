use thiserror::Error;

use super::store::{StoreError, TransactionStore};
use super::transaction::Transaction;

pub const NO_TRANSACTIONS_MESSAGE: &str =
    "未能從圖片中識別出任何交易。請確保圖片清晰並包含可讀的文字。(No transactions found)";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("An extraction is already in progress")]
    Busy,
    #[error("Extraction ticket is no longer current")]
    StaleTicket,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// User-visible message attached to a session after an extraction settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Extraction succeeded but recognized nothing. Informational, not an error.
    NoTransactions,
    /// Extraction failed; carries the user-facing message only.
    ExtractionFailed(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::NoTransactions => NO_TRANSACTIONS_MESSAGE,
            Notice::ExtractionFailed(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::ExtractionFailed(_))
    }
}

/// Proof that the holder started the extraction currently in flight.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an extraction ticket must be completed, failed or abandoned"]
pub struct ExtractionTicket {
    generation: u64,
}

impl ExtractionTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// State owned by a single user session: the working store, the busy signal, the last notice.
///
/// At most one extraction runs at a time. Starting one clears previous results so a
/// failed re-extraction never leaves stale rows behind. Results are installed only
/// by the ticket of the extraction currently in flight.
#[derive(Debug, Default)]
pub struct Session {
    store: TransactionStore,
    generation: u64,
    in_flight: Option<u64>,
    notice: Option<Notice>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.store.as_slice()
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }

    /// Reject (never queue) when another extraction is pending.
    pub fn begin_extraction(&mut self) -> Result<ExtractionTicket, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.store.replace_all(Vec::new());
        self.notice = None;
        tracing::debug!(generation = self.generation, "extraction started");
        Ok(ExtractionTicket {
            generation: self.generation,
        })
    }

    pub fn complete_extraction(
        &mut self,
        ticket: ExtractionTicket,
        transactions: Vec<Transaction>,
    ) -> Result<Option<Notice>, SessionError> {
        self.settle(&ticket)?;
        self.notice = transactions.is_empty().then_some(Notice::NoTransactions);
        tracing::debug!(
            generation = ticket.generation,
            count = transactions.len(),
            "extraction completed"
        );
        self.store.replace_all(transactions);
        Ok(self.notice.clone())
    }

    pub fn fail_extraction(
        &mut self,
        ticket: ExtractionTicket,
        user_message: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.settle(&ticket)?;
        self.notice = Some(Notice::ExtractionFailed(user_message.into()));
        tracing::debug!(generation = ticket.generation, "extraction failed");
        Ok(())
    }

    /// Cancellation path. Clears the busy signal and leaves the store untouched.
    pub fn abandon_extraction(&mut self, ticket: ExtractionTicket) {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
            tracing::debug!(generation = ticket.generation, "extraction abandoned");
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Transaction, SessionError> {
        Ok(self.store.remove_at(index)?)
    }

    /// Clear all rows and the notice. Does not cancel an extraction in flight.
    pub fn reset(&mut self) {
        self.store.replace_all(Vec::new());
        self.notice = None;
    }

    fn settle(&mut self, ticket: &ExtractionTicket) -> Result<(), SessionError> {
        if self.in_flight != Some(ticket.generation) {
            return Err(SessionError::StaleTicket);
        }
        self.in_flight = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Amount, LedgerDate, TransactionType};

    fn tx(description: &str) -> Transaction {
        Transaction::new(
            LedgerDate::from_ymd(2025, 12, 15).unwrap(),
            description,
            Amount::parse("4.5").unwrap(),
            TransactionType::Expense,
        )
    }

    #[test]
    fn begin_sets_busy_and_rejects_second_request() {
        let mut session = Session::new();
        let _ticket = session.begin_extraction().unwrap();
        assert!(session.is_busy());
        assert_eq!(session.begin_extraction(), Err(SessionError::Busy));
    }

    #[test]
    fn begin_clears_previous_results() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        session.complete_extraction(ticket, vec![tx("a")]).unwrap();
        assert_eq!(session.count(), 1);

        let _ticket = session.begin_extraction().unwrap();
        assert_eq!(session.count(), 0);
    }

    #[test]
    fn complete_installs_results_and_clears_busy() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        let notice = session
            .complete_extraction(ticket, vec![tx("a"), tx("b")])
            .unwrap();
        assert_eq!(notice, None);
        assert!(!session.is_busy());
        assert_eq!(session.count(), 2);
    }

    #[test]
    fn empty_result_is_a_notice_not_an_error() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        let notice = session.complete_extraction(ticket, vec![]).unwrap();
        assert_eq!(notice, Some(Notice::NoTransactions));
        assert!(!notice.unwrap().is_error());
    }

    #[test]
    fn failure_leaves_store_empty() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        session.complete_extraction(ticket, vec![tx("old")]).unwrap();

        let ticket = session.begin_extraction().unwrap();
        session.fail_extraction(ticket, "boom").unwrap();

        assert_eq!(session.count(), 0);
        assert!(!session.is_busy());
        assert_eq!(session.notice().map(Notice::message), Some("boom"));
    }

    #[test]
    fn abandon_clears_busy_without_touching_store() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        session.abandon_extraction(ticket);
        assert!(!session.is_busy());
        assert_eq!(session.count(), 0);
        assert!(session.begin_extraction().is_ok());
    }

    #[test]
    fn stale_ticket_cannot_install_results() {
        let mut session = Session::new();
        let first = session.begin_extraction().unwrap();
        let stale = ExtractionTicket {
            generation: first.generation(),
        };
        session.abandon_extraction(first);
        let _second = session.begin_extraction().unwrap();

        assert_eq!(
            session.complete_extraction(stale, vec![tx("late")]),
            Err(SessionError::StaleTicket)
        );
        assert_eq!(session.count(), 0);
        assert!(session.is_busy());
    }

    #[test]
    fn reset_clears_rows_and_notice() {
        let mut session = Session::new();
        let ticket = session.begin_extraction().unwrap();
        session.complete_extraction(ticket, vec![]).unwrap();
        assert!(session.notice().is_some());

        session.reset();
        assert_eq!(session.count(), 0);
        assert!(session.notice().is_none());
    }

    #[test]
    fn remove_at_out_of_range_surfaces_store_error() {
        let mut session = Session::new();
        assert!(matches!(
            session.remove_at(0),
            Err(SessionError::Store(StoreError::IndexOutOfRange { index: 0, len: 0 }))
        ));
    }
}
