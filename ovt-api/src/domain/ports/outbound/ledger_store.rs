//! Ledger store port (outbound).

use async_trait::async_trait;
use time::Date;

use crate::domain::{
    models::{NewTimeRecord, SortOrder, TimeRecord, TimeRecordId, UserId},
    LedgerError,
};

/// Outbound port owning the persisted ledger entries.
///
/// Writes must go through [`crate::domain::services::LedgerService`] so the
/// mutation bus sees every lifecycle event; nothing else may call the write
/// methods directly.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Persist a new entry and return it with its generated id.
    async fn insert(
        &self,
        owner: UserId,
        record: &NewTimeRecord,
    ) -> Result<TimeRecord, LedgerError>;

    /// Replace the mutable fields of an existing entry.
    async fn update(&self, record: &TimeRecord) -> Result<TimeRecord, LedgerError>;

    async fn delete_one(&self, id: TimeRecordId, owner: UserId) -> Result<(), LedgerError>;

    /// Delete every entry of the owner, returning how many were removed.
    async fn delete_all_for_owner(&self, owner: UserId) -> Result<u64, LedgerError>;

    async fn find_by_id(
        &self,
        id: TimeRecordId,
        owner: UserId,
    ) -> Result<Option<TimeRecord>, LedgerError>;

    /// Entries of the owner with `start <= date < end`.
    async fn find_by_owner_and_date_range(
        &self,
        owner: UserId,
        start: Date,
        end: Date,
    ) -> Result<Vec<TimeRecord>, LedgerError>;

    /// Entries of the owner, optionally window-bounded, ordered by date.
    async fn find_all(
        &self,
        owner: UserId,
        from: Option<Date>,
        to: Option<Date>,
        order: SortOrder,
    ) -> Result<Vec<TimeRecord>, LedgerError>;
}
