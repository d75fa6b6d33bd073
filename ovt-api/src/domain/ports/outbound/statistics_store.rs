//! Aggregate store port (outbound).

use async_trait::async_trait;

use crate::domain::{
    models::{ScopeKey, ScopeKind, ScopeStatistics, UserId},
    LedgerError,
};

/// Outbound port owning the two aggregate tables (month and week scopes).
///
/// At most one row exists per [`ScopeKey`]; only the aggregation engine
/// writes through this port.
#[async_trait]
pub trait StatisticsStore: Send + Sync + 'static {
    async fn find(&self, key: &ScopeKey) -> Result<Option<ScopeStatistics>, LedgerError>;

    /// Atomically delete any existing row for the key and insert the new one.
    ///
    /// Full replacement, not a merge; stale columns from a previous shape
    /// must not survive.
    async fn replace(&self, statistics: &ScopeStatistics) -> Result<(), LedgerError>;

    /// Remove the row for the key, if any.
    async fn delete(&self, key: &ScopeKey) -> Result<(), LedgerError>;

    /// Remove every aggregate row of the owner, across both scope kinds.
    async fn delete_all_for_owner(&self, owner: UserId) -> Result<(), LedgerError>;

    /// All rows of one scope kind for (owner, year), in period order.
    async fn find_for_year(
        &self,
        kind: ScopeKind,
        owner: UserId,
        year: i32,
    ) -> Result<Vec<ScopeStatistics>, LedgerError>;
}
