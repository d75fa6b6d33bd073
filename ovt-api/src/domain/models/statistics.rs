use serde::Serialize;
use time::OffsetDateTime;

use super::ids::UserId;
use super::scope::ScopeKey;
use super::time_record::{RecordKind, TimeRecord};

/// Derived, fully replaceable aggregate for one [`ScopeKey`].
///
/// A row is a pure function of the ledger records inside the key's window at
/// computation time; it never references a record by id. Absence of a row
/// means "no activity in that scope", not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeStatistics {
    #[serde(flatten)]
    pub key: ScopeKey,
    pub overtime_count: i64,
    pub overtime_duration: i64,
    pub recovery_count: i64,
    pub recovery_duration: i64,
    pub total_count: i64,
    /// Net duration: overtime minus recovery, in minutes.
    pub total_duration: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ScopeStatistics {
    pub fn zero(key: ScopeKey, now: OffsetDateTime) -> Self {
        Self {
            key,
            overtime_count: 0,
            overtime_duration: 0,
            recovery_count: 0,
            recovery_duration: 0,
            total_count: 0,
            total_duration: 0,
            updated_at: now,
        }
    }

    /// Computes the aggregate in a single pass over the window's records.
    ///
    /// A record with a non-positive duration violates the ledger invariant;
    /// it is skipped (and reported) rather than poisoning the whole scope.
    pub fn from_records(key: ScopeKey, records: &[TimeRecord], now: OffsetDateTime) -> Self {
        let mut stats = Self::zero(key, now);

        for record in records {
            if record.duration_minutes <= 0 {
                debug_assert!(
                    false,
                    "record {} has non-positive duration {}",
                    record.id, record.duration_minutes
                );
                tracing::error!(
                    record_id = %record.id,
                    duration = record.duration_minutes,
                    "skipping record with non-positive duration"
                );
                continue;
            }

            let duration = i64::from(record.duration_minutes);
            match record.kind {
                RecordKind::Overtime => {
                    stats.overtime_count += 1;
                    stats.overtime_duration += duration;
                }
                RecordKind::Recovery => {
                    stats.recovery_count += 1;
                    stats.recovery_duration += duration;
                }
            }
            stats.total_count += 1;
            stats.total_duration += record.signed_duration();
        }

        stats
    }

    /// Aggregate fields without the computation timestamp, for comparisons.
    pub fn totals(&self) -> (i64, i64, i64, i64, i64, i64) {
        (
            self.overtime_count,
            self.overtime_duration,
            self.recovery_count,
            self.recovery_duration,
            self.total_count,
            self.total_duration,
        )
    }
}

/// On-demand projection over a whole year; never persisted.
///
/// Sums the year's month aggregates and adds a ledger-derived balance plus
/// two averages whose denominators follow the as-of cutoff policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStatistics {
    pub owner: UserId,
    pub year: i32,
    pub overtime_count: i64,
    pub overtime_duration: i64,
    pub recovery_count: i64,
    pub recovery_duration: i64,
    pub total_count: i64,
    pub total_duration: i64,
    /// Overtime minus recovery over the calendar year, from raw records.
    pub balance: i64,
    /// Average net weekly duration up to the cutoff week, floored to 2 decimals.
    pub week_avg_duration: f64,
    /// Average net monthly duration up to the cutoff month, floored to 2 decimals.
    pub month_avg_duration: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ScopeKind, TimeRecordId};
    use time::macros::date;

    fn key() -> ScopeKey {
        ScopeKey {
            kind: ScopeKind::Month,
            period: 1,
            year: 2024,
            owner: UserId::new(1),
        }
    }

    fn record(kind: RecordKind, minutes: i32) -> TimeRecord {
        TimeRecord {
            id: TimeRecordId::new(1),
            owner: UserId::new(1),
            duration_minutes: minutes,
            kind,
            date: date!(2024 - 01 - 10),
            note: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn aggregates_overtime_and_recovery_in_one_pass() {
        let records = vec![
            record(RecordKind::Overtime, 120),
            record(RecordKind::Overtime, 60),
            record(RecordKind::Recovery, 30),
        ];

        let stats = ScopeStatistics::from_records(key(), &records, OffsetDateTime::now_utc());

        assert_eq!(stats.overtime_count, 2);
        assert_eq!(stats.overtime_duration, 180);
        assert_eq!(stats.recovery_count, 1);
        assert_eq!(stats.recovery_duration, 30);
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.total_duration, 150);
    }

    #[test]
    fn empty_window_yields_the_zero_aggregate() {
        let stats = ScopeStatistics::from_records(key(), &[], OffsetDateTime::now_utc());
        assert_eq!(stats.totals(), (0, 0, 0, 0, 0, 0));
    }

    #[test]
    fn recovery_can_drive_the_net_duration_negative() {
        let records = vec![
            record(RecordKind::Overtime, 30),
            record(RecordKind::Recovery, 90),
        ];

        let stats = ScopeStatistics::from_records(key(), &records, OffsetDateTime::now_utc());
        assert_eq!(stats.total_duration, -60);
    }
}
