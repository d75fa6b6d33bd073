use serde::Serialize;
use strum::{Display, EnumString};
use time::{Date, Month};

use super::email::Email;
use super::ids::UserId;
use super::scope::ScopeKind;
use super::statistics::ScopeStatistics;
use super::time_record::TimeRecord;

/// The two periodic statistics reports a user can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Monthly,
    Weekly,
}

impl ReportKind {
    pub const ALL: [ReportKind; 2] = [ReportKind::Monthly, ReportKind::Weekly];

    pub fn scope_kind(&self) -> ScopeKind {
        match self {
            ReportKind::Monthly => ScopeKind::Month,
            ReportKind::Weekly => ScopeKind::Week,
        }
    }

    /// Settings key of the per-user opt-in flag for this report.
    pub fn opt_in_code(&self) -> &'static str {
        match self {
            ReportKind::Monthly => "MONTHLY_TIMES_STATS_EMAIL",
            ReportKind::Weekly => "WEEKLY_TIMES_STATS_EMAIL",
        }
    }
}

/// A user eligible to receive a report at the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecipient {
    pub user: UserId,
    pub username: String,
    pub email: Email,
}

/// Everything the mail transport needs for one (owner, period) report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub kind: ReportKind,
    pub period_start: Date,
    pub period_end: Date,
    pub statistics: ScopeStatistics,
    pub records: Vec<TimeRecord>,
    /// Overtime minus recovery from the start of the year through the period end.
    pub balance: i64,
}

impl PeriodReport {
    pub fn subject(&self) -> String {
        format!(
            "⏱️ {} - Overtime report ({})",
            self.period_label(),
            format_signed_minutes(self.statistics.total_duration)
        )
    }

    fn period_label(&self) -> String {
        match self.kind {
            ReportKind::Monthly => {
                format!("{} {}", month_name(self.period_start.month()), self.period_start.year())
            }
            ReportKind::Weekly => {
                let (year, week, _) = self.period_start.to_iso_week_date();
                format!("Week {week} {year}")
            }
        }
    }
}

fn month_name(month: Month) -> &'static str {
    match month {
        Month::January => "January",
        Month::February => "February",
        Month::March => "March",
        Month::April => "April",
        Month::May => "May",
        Month::June => "June",
        Month::July => "July",
        Month::August => "August",
        Month::September => "September",
        Month::October => "October",
        Month::November => "November",
        Month::December => "December",
    }
}

/// Renders minutes as a signed hours/minutes string, e.g. `+2h 30m`.
pub fn format_signed_minutes(minutes: i64) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{}{}h {:02}m", sign, abs / 60, abs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ScopeKey, UserId};
    use time::macros::date;
    use time::OffsetDateTime;

    #[test]
    fn signed_minutes_formatting() {
        assert_eq!(format_signed_minutes(150), "+2h 30m");
        assert_eq!(format_signed_minutes(-90), "-1h 30m");
        assert_eq!(format_signed_minutes(0), "+0h 00m");
    }

    #[test]
    fn monthly_subject_carries_the_period_and_net_total() {
        let key = ScopeKey::month(UserId::new(1), 5, 2025).unwrap();
        let mut statistics =
            ScopeStatistics::zero(key, OffsetDateTime::now_utc());
        statistics.total_duration = 150;

        let report = PeriodReport {
            kind: ReportKind::Monthly,
            period_start: date!(2025 - 05 - 01),
            period_end: date!(2025 - 06 - 01),
            statistics,
            records: Vec::new(),
            balance: 150,
        };

        assert_eq!(report.subject(), "⏱️ May 2025 - Overtime report (+2h 30m)");
    }

    #[test]
    fn weekly_subject_uses_the_iso_week_number() {
        let key = ScopeKey::week(UserId::new(1), 3, 2024).unwrap();
        let report = PeriodReport {
            kind: ReportKind::Weekly,
            period_start: date!(2024 - 01 - 15),
            period_end: date!(2024 - 01 - 22),
            statistics: ScopeStatistics::zero(key, OffsetDateTime::now_utc()),
            records: Vec::new(),
            balance: 0,
        };

        assert_eq!(report.subject(), "⏱️ Week 3 2024 - Overtime report (+0h 00m)");
    }
}
