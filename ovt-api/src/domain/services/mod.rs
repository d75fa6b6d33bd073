mod balance;
mod ledger;
mod report_scheduler;
mod statistics;

pub use balance::*;
pub use ledger::*;
pub use report_scheduler::*;
pub use statistics::*;
