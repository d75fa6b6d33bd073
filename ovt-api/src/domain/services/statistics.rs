use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::instrument;

use crate::domain::{
    models::{
        iso_week_of, month_of, ScopeKey, ScopeKind, ScopeStatistics, TimeRecord, UserId,
    },
    mutation_bus::RecordMutationSubscriber,
    ports::outbound::{LedgerStore, StatisticsStore},
    LedgerError,
};

/// The aggregation engine: maintains the per-scope statistics rows.
///
/// Recomputation is always a full rebuild: it re-reads every ledger record in
/// the scope's window and replaces the aggregate row wholesale. An empty
/// window deletes the row instead of writing zeros, so absence stays the
/// canonical encoding of "no activity".
///
/// Recomputations of the same [`ScopeKey`] are serialized through a per-key
/// lock; concurrent writes to one scope cannot interleave their rebuilds.
pub struct StatisticsService<L, S> {
    ledger: Arc<L>,
    stats: Arc<S>,
    scope_locks: Mutex<HashMap<ScopeKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<L: LedgerStore, S: StatisticsStore> StatisticsService<L, S> {
    pub fn new(ledger: Arc<L>, stats: Arc<S>) -> Self {
        Self {
            ledger,
            stats,
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Point lookup; `StatisticsNotFound` when no row exists.
    ///
    /// Readers wanting a "no activity yet" view substitute zeros themselves
    /// (or use [`Self::get_or_zero`]); the internal contract stays Not-Found.
    pub async fn get(
        &self,
        kind: ScopeKind,
        owner: UserId,
        period: u8,
        year: i32,
    ) -> Result<ScopeStatistics, LedgerError> {
        let key = ScopeKey::new(kind, owner, period, year)?;
        self.stats
            .find(&key)
            .await?
            .ok_or(LedgerError::StatisticsNotFound { kind, period, year })
    }

    /// Lookup with zero substitution, for report-style read paths.
    pub async fn get_or_zero(
        &self,
        kind: ScopeKind,
        owner: UserId,
        period: u8,
        year: i32,
    ) -> Result<ScopeStatistics, LedgerError> {
        let key = ScopeKey::new(kind, owner, period, year)?;
        Ok(self
            .stats
            .find(&key)
            .await?
            .unwrap_or_else(|| ScopeStatistics::zero(key, OffsetDateTime::now_utc())))
    }

    #[instrument(name = "StatisticsService::recompute_month", skip(self), fields(owner = %owner))]
    pub async fn recompute_month(
        &self,
        owner: UserId,
        month: u8,
        year: i32,
    ) -> Result<(), LedgerError> {
        self.recompute(ScopeKey::month(owner, month, year)?).await
    }

    #[instrument(name = "StatisticsService::recompute_week", skip(self), fields(owner = %owner))]
    pub async fn recompute_week(
        &self,
        owner: UserId,
        week: u8,
        year: i32,
    ) -> Result<(), LedgerError> {
        self.recompute(ScopeKey::week(owner, week, year)?).await
    }

    /// Full rebuild of one scope from the current ledger contents.
    async fn recompute(&self, key: ScopeKey) -> Result<(), LedgerError> {
        let guard = self.scope_lock(&key).await;
        let result = self.rebuild(key).await;
        drop(guard);
        self.release_scope_lock(&key);

        result
    }

    async fn rebuild(&self, key: ScopeKey) -> Result<(), LedgerError> {
        let (start, end) = key.window()?;
        let records = self
            .ledger
            .find_by_owner_and_date_range(key.owner, start, end)
            .await?;

        if records.is_empty() {
            tracing::debug!(kind = %key.kind, period = key.period, year = key.year, "window empty, removing aggregate row");
            self.stats.delete(&key).await
        } else {
            let statistics =
                ScopeStatistics::from_records(key, &records, OffsetDateTime::now_utc());
            self.stats.replace(&statistics).await
        }
    }

    async fn scope_lock(&self, key: &ScopeKey) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.scope_locks.lock().unwrap();
            locks
                .entry(*key)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops the key's lock entry once no rebuild holds or waits on it, so
    /// the map does not grow with every scope ever touched.
    fn release_scope_lock(&self, key: &ScopeKey) {
        let mut locks = self.scope_locks.lock().unwrap();
        if let Some(lock) = locks.get(key) {
            // The map holds one reference; queued waiters hold the rest.
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }

    /// Recomputes the month and week scopes containing `date`.
    async fn recompute_scopes_of(&self, owner: UserId, record: &TimeRecord) -> Result<(), LedgerError> {
        let (month, month_year) = month_of(record.date);
        let (week, week_year) = iso_week_of(record.date);

        self.recompute_month(owner, month, month_year).await?;
        self.recompute_week(owner, week, week_year).await
    }
}

#[async_trait]
impl<L: LedgerStore, S: StatisticsStore> RecordMutationSubscriber for StatisticsService<L, S> {
    fn name(&self) -> &'static str {
        "statistics-aggregation"
    }

    async fn after_record_insert(
        &self,
        record: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        self.recompute_scopes_of(owner, record).await
    }

    async fn after_record_update(
        &self,
        prev: &TimeRecord,
        next: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        // The new scope is always rebuilt; the previous one only when the
        // record actually left it.
        self.recompute_scopes_of(owner, next).await?;

        if month_of(prev.date) != month_of(next.date) {
            let (month, year) = month_of(prev.date);
            self.recompute_month(owner, month, year).await?;
        }
        if iso_week_of(prev.date) != iso_week_of(next.date) {
            let (week, year) = iso_week_of(prev.date);
            self.recompute_week(owner, week, year).await?;
        }

        Ok(())
    }

    async fn after_record_delete(
        &self,
        record: &TimeRecord,
        owner: UserId,
    ) -> Result<(), LedgerError> {
        self.recompute_scopes_of(owner, record).await
    }

    async fn after_delete_all(&self, owner: UserId) -> Result<(), LedgerError> {
        self.stats.delete_all_for_owner(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        NewTimeRecord, RecordKind, SortOrder, TimeRecordId, UpdateTimeRecord,
    };
    use crate::domain::mutation_bus::MutationBus;
    use crate::domain::ports::outbound::mock::{InMemoryLedgerStore, InMemoryStatisticsStore};
    use crate::domain::services::LedgerService;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::date;
    use time::Date;

    struct Fixture {
        ledger_service: LedgerService<InMemoryLedgerStore>,
        statistics: Arc<StatisticsService<InMemoryLedgerStore, InMemoryStatisticsStore>>,
        stats_store: Arc<InMemoryStatisticsStore>,
    }

    /// Wires the aggregation engine as an awaited subscriber so tests see
    /// recomputation synchronously.
    fn fixture() -> Fixture {
        let ledger_store = Arc::new(InMemoryLedgerStore::new());
        let stats_store = Arc::new(InMemoryStatisticsStore::new());
        let statistics = Arc::new(StatisticsService::new(
            ledger_store.clone(),
            stats_store.clone(),
        ));

        let mut bus = MutationBus::new();
        bus.subscribe_awaited(statistics.clone());

        Fixture {
            ledger_service: LedgerService::new(ledger_store, Arc::new(bus)),
            statistics,
            stats_store,
        }
    }

    fn entry(kind: RecordKind, minutes: i32, date: Date) -> NewTimeRecord {
        NewTimeRecord {
            duration_minutes: minutes,
            kind,
            date,
            note: None,
        }
    }

    #[tokio::test]
    async fn insert_triggers_month_and_week_recomputation() {
        let fx = fixture();
        let owner = UserId::new(1);

        fx.ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 120, date!(2024 - 01 - 15)))
            .await
            .unwrap();

        let month = fx.statistics.get(ScopeKind::Month, owner, 1, 2024).await.unwrap();
        assert_eq!(month.total_duration, 120);
        let week = fx.statistics.get(ScopeKind::Week, owner, 3, 2024).await.unwrap();
        assert_eq!(week.total_duration, 120);
    }

    #[tokio::test]
    async fn recomputation_is_idempotent() {
        let fx = fixture();
        let owner = UserId::new(1);
        fx.ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 120, date!(2024 - 03 - 05)))
            .await
            .unwrap();
        fx.ledger_service
            .create_one(owner, entry(RecordKind::Recovery, 30, date!(2024 - 03 - 20)))
            .await
            .unwrap();

        fx.statistics.recompute_month(owner, 3, 2024).await.unwrap();
        let first = fx.statistics.get(ScopeKind::Month, owner, 3, 2024).await.unwrap();

        fx.statistics.recompute_month(owner, 3, 2024).await.unwrap();
        let second = fx.statistics.get(ScopeKind::Month, owner, 3, 2024).await.unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.totals(), second.totals());
        assert_eq!(second.totals(), (1, 120, 1, 30, 2, 90));
    }

    #[tokio::test]
    async fn emptied_scope_loses_its_aggregate_row() {
        let fx = fixture();
        let owner = UserId::new(1);
        let record = fx
            .ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 60, date!(2024 - 05 - 10)))
            .await
            .unwrap();
        assert!(fx.statistics.get(ScopeKind::Month, owner, 5, 2024).await.is_ok());

        fx.ledger_service.delete_one(record.id, owner).await.unwrap();

        let result = fx.statistics.get(ScopeKind::Month, owner, 5, 2024).await;
        assert!(matches!(result, Err(LedgerError::StatisticsNotFound { .. })));
        assert_eq!(fx.stats_store.row_count(), 0);
    }

    #[tokio::test]
    async fn date_change_recomputes_both_old_and_new_scope() {
        let fx = fixture();
        let owner = UserId::new(1);
        let record = fx
            .ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 90, date!(2024 - 01 - 15)))
            .await
            .unwrap();

        fx.ledger_service
            .update_one(
                owner,
                UpdateTimeRecord {
                    id: record.id,
                    duration_minutes: 90,
                    kind: RecordKind::Overtime,
                    date: date!(2024 - 02 - 03),
                    note: None,
                },
            )
            .await
            .unwrap();

        // January no longer holds the record, February does.
        assert!(fx.statistics.get(ScopeKind::Month, owner, 1, 2024).await.is_err());
        let february = fx.statistics.get(ScopeKind::Month, owner, 2, 2024).await.unwrap();
        assert_eq!(february.total_duration, 90);

        // The record moved from ISO week 3 to ISO week 5.
        assert!(fx.statistics.get(ScopeKind::Week, owner, 3, 2024).await.is_err());
        assert!(fx.statistics.get(ScopeKind::Week, owner, 5, 2024).await.is_ok());
    }

    #[tokio::test]
    async fn delete_all_removes_every_aggregate_row_of_the_owner() {
        let fx = fixture();
        let owner = UserId::new(1);
        let other = UserId::new(2);
        fx.ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 60, date!(2024 - 01 - 10)))
            .await
            .unwrap();
        fx.ledger_service
            .create_one(owner, entry(RecordKind::Overtime, 60, date!(2024 - 06 - 10)))
            .await
            .unwrap();
        fx.ledger_service
            .create_one(other, entry(RecordKind::Overtime, 45, date!(2024 - 01 - 10)))
            .await
            .unwrap();

        fx.ledger_service.delete_all(owner).await.unwrap();

        let remaining = fx.stats_store.all_rows();
        assert!(!remaining.is_empty());
        assert!(remaining.iter().all(|row| row.key.owner == other));
    }

    #[tokio::test]
    async fn get_or_zero_substitutes_the_zero_view() {
        let fx = fixture();
        let owner = UserId::new(1);

        let stats = fx
            .statistics
            .get_or_zero(ScopeKind::Month, owner, 11, 2024)
            .await
            .unwrap();

        assert_eq!(stats.totals(), (0, 0, 0, 0, 0, 0));
        assert_eq!(stats.key.period, 11);
    }

    #[tokio::test]
    async fn invalid_period_is_rejected_before_any_store_access() {
        let fx = fixture();

        let result = fx.statistics.recompute_month(UserId::new(1), 13, 2024).await;
        assert!(matches!(result, Err(LedgerError::InvalidPeriod { .. })));
    }

    /// Ledger store that tracks how many window reads run at the same time.
    struct GatedLedgerStore {
        inner: InMemoryLedgerStore,
        active_reads: AtomicUsize,
        max_concurrent_reads: AtomicUsize,
    }

    impl GatedLedgerStore {
        fn new(inner: InMemoryLedgerStore) -> Self {
            Self {
                inner,
                active_reads: AtomicUsize::new(0),
                max_concurrent_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for GatedLedgerStore {
        async fn insert(
            &self,
            owner: UserId,
            record: &NewTimeRecord,
        ) -> Result<TimeRecord, LedgerError> {
            self.inner.insert(owner, record).await
        }

        async fn update(&self, record: &TimeRecord) -> Result<TimeRecord, LedgerError> {
            self.inner.update(record).await
        }

        async fn delete_one(&self, id: TimeRecordId, owner: UserId) -> Result<(), LedgerError> {
            self.inner.delete_one(id, owner).await
        }

        async fn delete_all_for_owner(&self, owner: UserId) -> Result<u64, LedgerError> {
            self.inner.delete_all_for_owner(owner).await
        }

        async fn find_by_id(
            &self,
            id: TimeRecordId,
            owner: UserId,
        ) -> Result<Option<TimeRecord>, LedgerError> {
            self.inner.find_by_id(id, owner).await
        }

        async fn find_by_owner_and_date_range(
            &self,
            owner: UserId,
            start: Date,
            end: Date,
        ) -> Result<Vec<TimeRecord>, LedgerError> {
            let active = self.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_reads.fetch_max(active, Ordering::SeqCst);
            // Hold the read open long enough for an unserialized racer to
            // overlap it.
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            self.active_reads.fetch_sub(1, Ordering::SeqCst);
            self.inner.find_by_owner_and_date_range(owner, start, end).await
        }

        async fn find_all(
            &self,
            owner: UserId,
            from: Option<Date>,
            to: Option<Date>,
            order: SortOrder,
        ) -> Result<Vec<TimeRecord>, LedgerError> {
            self.inner.find_all(owner, from, to, order).await
        }
    }

    #[tokio::test]
    async fn concurrent_recomputations_of_one_scope_are_serialized() {
        let owner = UserId::new(1);
        let ledger = Arc::new(GatedLedgerStore::new(InMemoryLedgerStore::new().with_records(
            vec![TimeRecord {
                id: TimeRecordId::new(1),
                owner,
                duration_minutes: 60,
                kind: RecordKind::Overtime,
                date: date!(2024 - 01 - 15),
                note: None,
                created_at: OffsetDateTime::now_utc(),
            }],
        )));
        let stats_store = Arc::new(InMemoryStatisticsStore::new());
        let statistics = Arc::new(StatisticsService::new(ledger.clone(), stats_store));

        let first = statistics.clone();
        let second = statistics.clone();
        let (a, b) = tokio::join!(
            async move { first.recompute_month(owner, 1, 2024).await },
            async move { second.recompute_month(owner, 1, 2024).await },
        );
        a.unwrap();
        b.unwrap();

        // The per-key lock kept the two window reads from overlapping.
        assert_eq!(ledger.max_concurrent_reads.load(Ordering::SeqCst), 1);
        // Both rebuilds released the key, so its lock entry is gone.
        assert!(statistics.scope_locks.lock().unwrap().is_empty());
    }
}
