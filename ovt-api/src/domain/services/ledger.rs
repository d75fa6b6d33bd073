use std::sync::Arc;

use time::Date;
use tracing::instrument;

use crate::domain::{
    models::{NewTimeRecord, SortOrder, TimeRecord, TimeRecordId, UpdateTimeRecord, UserId},
    mutation_bus::MutationBus,
    ports::outbound::LedgerStore,
    LedgerError,
};

/// Write and read entry point for ledger records.
///
/// Every mutation flows through the [`MutationBus`], so interested parties
/// (the aggregation engine in particular) observe all lifecycle events.
/// Callers must never write to the [`LedgerStore`] directly.
pub struct LedgerService<S> {
    store: Arc<S>,
    bus: Arc<MutationBus>,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: Arc<S>, bus: Arc<MutationBus>) -> Self {
        Self { store, bus }
    }

    #[instrument(name = "LedgerService::create_one", skip(self, record), fields(owner = %owner))]
    pub async fn create_one(
        &self,
        owner: UserId,
        record: NewTimeRecord,
    ) -> Result<TimeRecord, LedgerError> {
        if record.duration_minutes <= 0 {
            return Err(LedgerError::InvalidDuration(record.duration_minutes));
        }

        self.bus.before_insert(&record, owner).await?;
        let stored = self.store.insert(owner, &record).await?;
        self.bus.after_insert(&stored, owner).await?;

        Ok(stored)
    }

    pub async fn find_one(
        &self,
        id: TimeRecordId,
        owner: UserId,
    ) -> Result<TimeRecord, LedgerError> {
        self.store
            .find_by_id(id, owner)
            .await?
            .ok_or(LedgerError::RecordNotFound(id))
    }

    pub async fn find_all(
        &self,
        owner: UserId,
        from: Option<Date>,
        to: Option<Date>,
        order: SortOrder,
    ) -> Result<Vec<TimeRecord>, LedgerError> {
        self.store.find_all(owner, from, to, order).await
    }

    #[instrument(name = "LedgerService::update_one", skip(self, update), fields(owner = %owner, id = %update.id))]
    pub async fn update_one(
        &self,
        owner: UserId,
        update: UpdateTimeRecord,
    ) -> Result<TimeRecord, LedgerError> {
        if update.duration_minutes <= 0 {
            return Err(LedgerError::InvalidDuration(update.duration_minutes));
        }

        let prev = self.find_one(update.id, owner).await?;
        let next = TimeRecord {
            id: prev.id,
            owner: prev.owner,
            duration_minutes: update.duration_minutes,
            kind: update.kind,
            date: update.date,
            note: update.note,
            created_at: prev.created_at,
        };

        self.bus.before_update(&prev, &next, owner).await?;
        let stored = self.store.update(&next).await?;
        self.bus.after_update(&prev, &stored, owner).await?;

        Ok(stored)
    }

    #[instrument(name = "LedgerService::delete_one", skip(self), fields(owner = %owner, id = %id))]
    pub async fn delete_one(&self, id: TimeRecordId, owner: UserId) -> Result<(), LedgerError> {
        let record = self.find_one(id, owner).await?;

        self.bus.before_delete(&record, owner).await?;
        self.store.delete_one(id, owner).await?;
        self.bus.after_delete(&record, owner).await?;

        Ok(())
    }

    #[instrument(name = "LedgerService::delete_all", skip(self), fields(owner = %owner))]
    pub async fn delete_all(&self, owner: UserId) -> Result<u64, LedgerError> {
        self.bus.before_delete_all(owner).await?;
        let deleted = self.store.delete_all_for_owner(owner).await?;
        self.bus.after_delete_all(owner).await?;

        Ok(deleted)
    }
}
