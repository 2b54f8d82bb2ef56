pub mod money;
pub mod session;
pub mod store;
pub mod transaction;

pub use money::Amount;
pub use session::{ExtractionTicket, Notice, Session, SessionError, NO_TRANSACTIONS_MESSAGE};
pub use store::{StoreError, TransactionStore};
pub use transaction::{LedgerDate, RawTransaction, Transaction, TransactionError, TransactionType};
