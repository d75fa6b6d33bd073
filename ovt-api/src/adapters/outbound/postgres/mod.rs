mod ledger;
mod statistics;
mod users;

pub use ledger::PostgresLedgerStore;
pub use statistics::PostgresStatisticsStore;
pub use users::PostgresUserDirectory;
