mod ledger_store;
mod mailer;
pub mod mock;
mod statistics_store;
mod user_directory;

pub use ledger_store::LedgerStore;
pub use mailer::Mailer;
pub use statistics_store::StatisticsStore;
pub use user_directory::UserDirectory;
