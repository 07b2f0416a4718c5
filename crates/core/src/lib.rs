pub mod ledger;
pub mod money;
pub mod statement;

pub use ledger::{LedgerAccount, LedgerClient, LedgerError, LedgerTransaction, MemoryLedger};
pub use money::Money;
pub use statement::StatementTransaction;
