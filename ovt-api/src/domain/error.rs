use thiserror::Error;

use super::models::{ScopeKind, TimeRecordId};

/// Errors that can occur during ledger and statistics operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("time record {0} not found")]
    RecordNotFound(TimeRecordId),
    #[error("no {kind} statistics for period {period}/{year}")]
    StatisticsNotFound {
        kind: ScopeKind,
        period: u8,
        year: i32,
    },
    #[error("invalid {kind} period {period}/{year}")]
    InvalidPeriod {
        kind: ScopeKind,
        period: u8,
        year: i32,
    },
    #[error("duration must be a positive number of minutes, got {0}")]
    InvalidDuration(i32),
    #[error("write rejected by subscriber '{subscriber}': {reason}")]
    WriteVetoed {
        subscriber: &'static str,
        reason: String,
    },
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("data integrity violation: {0}")]
    Integrity(String),
    #[error("mail transport error: {0}")]
    Mail(String),
    #[error("mail transport timed out")]
    MailTimeout,
}
