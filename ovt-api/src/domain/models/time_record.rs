use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::{Date, OffsetDateTime};

use super::ids::{TimeRecordId, UserId};

/// Whether a ledger entry adds to or consumes the overtime balance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Overtime,
    Recovery,
}

/// One ledger entry: a dated duration, owned by a single user.
///
/// The duration is in minutes and must be strictly positive; the sign is
/// carried by [`RecordKind`], not the duration itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecord {
    pub id: TimeRecordId,
    pub owner: UserId,
    pub duration_minutes: i32,
    pub kind: RecordKind,
    pub date: Date,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TimeRecord {
    /// Duration signed by kind: positive for overtime, negative for recovery.
    pub fn signed_duration(&self) -> i64 {
        match self.kind {
            RecordKind::Overtime => i64::from(self.duration_minutes),
            RecordKind::Recovery => -i64::from(self.duration_minutes),
        }
    }
}

/// Payload for creating a ledger entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeRecord {
    pub duration_minutes: i32,
    pub kind: RecordKind,
    pub date: Date,
    pub note: Option<String>,
}

/// Payload for replacing the mutable fields of an existing entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeRecord {
    pub id: TimeRecordId,
    pub duration_minutes: i32,
    pub kind: RecordKind,
    pub date: Date,
    pub note: Option<String>,
}

/// Sort direction for ledger range reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}
