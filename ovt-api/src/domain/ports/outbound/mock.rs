//! In-memory port implementations for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};
use time::{Date, OffsetDateTime};

use crate::domain::{
    models::{
        NewTimeRecord, PeriodReport, ReportKind, ReportRecipient, ScopeKey, ScopeKind,
        ScopeStatistics, SortOrder, TimeRecord, TimeRecordId, UserId,
    },
    LedgerError,
};

use super::{LedgerStore, Mailer, StatisticsStore, UserDirectory};

/// Mock ledger store backed by an in-memory HashMap.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    records: Arc<RwLock<HashMap<TimeRecordId, TimeRecord>>>,
    next_id: Arc<AtomicI32>,
}

#[allow(dead_code)]
impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI32::new(1)),
        }
    }

    /// Seed the store with existing records (ids must be unique).
    pub fn with_records(self, records: Vec<TimeRecord>) -> Self {
        {
            let mut map = self.records.write().unwrap();
            let mut max_id = 0;
            for record in records {
                max_id = max_id.max(record.id.as_i32());
                map.insert(record.id, record);
            }
            self.next_id.store(max_id + 1, Ordering::SeqCst);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert(
        &self,
        owner: UserId,
        record: &NewTimeRecord,
    ) -> Result<TimeRecord, LedgerError> {
        let id = TimeRecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = TimeRecord {
            id,
            owner,
            duration_minutes: record.duration_minutes,
            kind: record.kind,
            date: record.date,
            note: record.note.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.write().unwrap().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &TimeRecord) -> Result<TimeRecord, LedgerError> {
        let mut records = self.records.write().unwrap();
        match records.get(&record.id) {
            Some(existing) if existing.owner == record.owner => {
                records.insert(record.id, record.clone());
                Ok(record.clone())
            }
            _ => Err(LedgerError::RecordNotFound(record.id)),
        }
    }

    async fn delete_one(&self, id: TimeRecordId, owner: UserId) -> Result<(), LedgerError> {
        let mut records = self.records.write().unwrap();
        match records.get(&id) {
            Some(existing) if existing.owner == owner => {
                records.remove(&id);
                Ok(())
            }
            _ => Err(LedgerError::RecordNotFound(id)),
        }
    }

    async fn delete_all_for_owner(&self, owner: UserId) -> Result<u64, LedgerError> {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, r| r.owner != owner);
        Ok((before - records.len()) as u64)
    }

    async fn find_by_id(
        &self,
        id: TimeRecordId,
        owner: UserId,
    ) -> Result<Option<TimeRecord>, LedgerError> {
        let records = self.records.read().unwrap();
        Ok(records.get(&id).filter(|r| r.owner == owner).cloned())
    }

    async fn find_by_owner_and_date_range(
        &self,
        owner: UserId,
        start: Date,
        end: Date,
    ) -> Result<Vec<TimeRecord>, LedgerError> {
        let records = self.records.read().unwrap();
        let mut found: Vec<_> = records
            .values()
            .filter(|r| r.owner == owner && r.date >= start && r.date < end)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.id.as_i32()));
        Ok(found)
    }

    async fn find_all(
        &self,
        owner: UserId,
        from: Option<Date>,
        to: Option<Date>,
        order: SortOrder,
    ) -> Result<Vec<TimeRecord>, LedgerError> {
        let records = self.records.read().unwrap();
        let mut found: Vec<_> = records
            .values()
            .filter(|r| {
                r.owner == owner
                    && from.map_or(true, |f| r.date >= f)
                    && to.map_or(true, |t| r.date < t)
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.date, r.id.as_i32()));
        if order == SortOrder::Descending {
            found.reverse();
        }
        Ok(found)
    }
}

/// Mock aggregate store backed by an in-memory HashMap.
#[derive(Clone, Default)]
pub struct InMemoryStatisticsStore {
    rows: Arc<RwLock<HashMap<ScopeKey, ScopeStatistics>>>,
}

#[allow(dead_code)]
impl InMemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing aggregate rows.
    pub fn with_rows(self, rows: Vec<ScopeStatistics>) -> Self {
        {
            let mut map = self.rows.write().unwrap();
            for row in rows {
                map.insert(row.key, row);
            }
        }
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn all_rows(&self) -> Vec<ScopeStatistics> {
        self.rows.read().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl StatisticsStore for InMemoryStatisticsStore {
    async fn find(&self, key: &ScopeKey) -> Result<Option<ScopeStatistics>, LedgerError> {
        Ok(self.rows.read().unwrap().get(key).cloned())
    }

    async fn replace(&self, statistics: &ScopeStatistics) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().unwrap();
        rows.remove(&statistics.key);
        rows.insert(statistics.key, statistics.clone());
        Ok(())
    }

    async fn delete(&self, key: &ScopeKey) -> Result<(), LedgerError> {
        self.rows.write().unwrap().remove(key);
        Ok(())
    }

    async fn delete_all_for_owner(&self, owner: UserId) -> Result<(), LedgerError> {
        self.rows.write().unwrap().retain(|k, _| k.owner != owner);
        Ok(())
    }

    async fn find_for_year(
        &self,
        kind: ScopeKind,
        owner: UserId,
        year: i32,
    ) -> Result<Vec<ScopeStatistics>, LedgerError> {
        let rows = self.rows.read().unwrap();
        let mut found: Vec<_> = rows
            .values()
            .filter(|s| s.key.kind == kind && s.key.owner == owner && s.key.year == year)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.key.period);
        Ok(found)
    }
}

/// Mock user directory with a fixed set of users.
///
/// Recipient lookups can be configured to fail per report kind, for
/// dispatch-isolation tests.
#[derive(Clone, Default)]
pub struct StaticUserDirectory {
    users: Arc<RwLock<Vec<DirectoryUser>>>,
    failing_kinds: Arc<RwLock<HashSet<ReportKind>>>,
}

#[derive(Clone)]
struct DirectoryUser {
    recipient: ReportRecipient,
    time_zone: String,
    opt_ins: HashSet<ReportKind>,
}

#[allow(dead_code)]
impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(
        self,
        recipient: ReportRecipient,
        time_zone: &str,
        opt_ins: &[ReportKind],
    ) -> Self {
        self.users.write().unwrap().push(DirectoryUser {
            recipient,
            time_zone: time_zone.to_string(),
            opt_ins: opt_ins.iter().copied().collect(),
        });
        self
    }

    /// Make every recipient lookup for this report kind fail.
    pub fn failing_recipients_for(self, kind: ReportKind) -> Self {
        self.failing_kinds.write().unwrap().insert(kind);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn all_time_zone_names(&self) -> Result<Vec<String>, LedgerError> {
        let users = self.users.read().unwrap();
        let mut zones: Vec<String> = users
            .iter()
            .map(|u| u.time_zone.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        zones.sort();
        Ok(zones)
    }

    async fn report_recipients(
        &self,
        kind: ReportKind,
        zones: &[String],
    ) -> Result<Vec<ReportRecipient>, LedgerError> {
        if self.failing_kinds.read().unwrap().contains(&kind) {
            return Err(LedgerError::Store(sqlx::Error::PoolTimedOut));
        }
        let users = self.users.read().unwrap();
        Ok(users
            .iter()
            .filter(|u| zones.contains(&u.time_zone) && u.opt_ins.contains(&kind))
            .map(|u| u.recipient.clone())
            .collect())
    }
}

/// Mock mail transport that records every send.
///
/// Specific recipients can be configured to fail, for dispatch-isolation
/// tests.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<RwLock<Vec<(ReportRecipient, PeriodReport)>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

#[allow(dead_code)]
impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to this address fail.
    pub fn failing_for(self, email: &str) -> Self {
        self.failing.write().unwrap().insert(email.to_string());
        self
    }

    pub fn sent(&self) -> Vec<(ReportRecipient, PeriodReport)> {
        self.sent.read().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.read().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        recipient: &ReportRecipient,
        report: &PeriodReport,
    ) -> Result<(), LedgerError> {
        if self.failing.read().unwrap().contains(recipient.email.as_str()) {
            return Err(LedgerError::Mail(format!(
                "transport refused {}",
                recipient.email
            )));
        }
        self.sent
            .write()
            .unwrap()
            .push((recipient.clone(), report.clone()));
        Ok(())
    }
}
