use std::sync::Arc;

use time::{Date, Month, OffsetDateTime};
use tracing::instrument;

use crate::domain::{
    models::{iso_week_of, ScopeKey, ScopeKind, UserId, YearStatistics},
    ports::outbound::{LedgerStore, StatisticsStore},
    LedgerError,
};

/// Period-crossing balances and multi-scope averages.
///
/// Balances are computed straight from the ledger because their windows are
/// arbitrary and rarely align with a single scope; the year view reads the
/// cached aggregates instead. Failures here propagate to the caller — these
/// are interactive read paths.
pub struct BalanceService<L, S> {
    ledger: Arc<L>,
    stats: Arc<S>,
}

impl<L: LedgerStore, S: StatisticsStore> BalanceService<L, S> {
    pub fn new(ledger: Arc<L>, stats: Arc<S>) -> Self {
        Self { ledger, stats }
    }

    /// Overtime minus recovery, in minutes, over `[start, end)`.
    pub async fn period_balance(
        &self,
        owner: UserId,
        start: Date,
        end: Date,
    ) -> Result<i64, LedgerError> {
        let records = self
            .ledger
            .find_by_owner_and_date_range(owner, start, end)
            .await?;

        Ok(records.iter().map(|r| r.signed_duration()).sum())
    }

    /// Balance from the start of the year through the end of the given month.
    pub async fn month_balance(
        &self,
        owner: UserId,
        month: u8,
        year: i32,
    ) -> Result<i64, LedgerError> {
        let (_, end) = ScopeKey::month(owner, month, year)?.window()?;
        self.period_balance(owner, year_start(year)?, end).await
    }

    /// Balance from the start of the week's calendar year through the end of
    /// the given ISO week.
    pub async fn week_balance(
        &self,
        owner: UserId,
        week: u8,
        year: i32,
    ) -> Result<i64, LedgerError> {
        let (start, end) = ScopeKey::week(owner, week, year)?.window()?;
        self.period_balance(owner, year_start(start.year())?, end).await
    }

    /// Balance over the whole calendar year.
    pub async fn year_balance(&self, owner: UserId, year: i32) -> Result<i64, LedgerError> {
        self.period_balance(owner, year_start(year)?, year_start(year + 1)?)
            .await
    }

    /// Year projection: summed month aggregates, year balance, and the two
    /// as-of averages.
    ///
    /// Cutoff resolution: an explicit `as_of` date wins; a past year uses the
    /// full 12/52 denominators; the current (or a future) year is capped at
    /// the latest populated period so two months of data are not averaged
    /// over twelve.
    #[instrument(name = "BalanceService::year_view", skip(self), fields(owner = %owner))]
    pub async fn year_view(
        &self,
        owner: UserId,
        year: i32,
        as_of: Option<Date>,
    ) -> Result<YearStatistics, LedgerError> {
        let now = OffsetDateTime::now_utc();

        let months = self
            .stats
            .find_for_year(ScopeKind::Month, owner, year)
            .await?;
        let weeks = self
            .stats
            .find_for_year(ScopeKind::Week, owner, year)
            .await?;

        let month_cutoff = match as_of {
            Some(date) => u8::from(date.month()),
            None if year < now.year() => 12,
            None => latest_populated(&months).unwrap_or(1),
        };
        let week_cutoff = match as_of {
            Some(date) => iso_week_of(date).0,
            None if year < now.year() => 52,
            None => latest_populated(&weeks).unwrap_or(1),
        };

        let month_total: i64 = months
            .iter()
            .filter(|s| s.key.period <= month_cutoff && s.total_count > 0)
            .map(|s| s.total_duration)
            .sum();
        let week_total: i64 = weeks
            .iter()
            .filter(|s| s.key.period <= week_cutoff && s.total_count > 0)
            .map(|s| s.total_duration)
            .sum();

        let balance = self.year_balance(owner, year).await?;

        let mut view = YearStatistics {
            owner,
            year,
            overtime_count: 0,
            overtime_duration: 0,
            recovery_count: 0,
            recovery_duration: 0,
            total_count: 0,
            total_duration: 0,
            balance,
            week_avg_duration: floor_2(week_total as f64 / f64::from(week_cutoff)),
            month_avg_duration: floor_2(month_total as f64 / f64::from(month_cutoff)),
            updated_at: now,
        };

        for month in &months {
            view.overtime_count += month.overtime_count;
            view.overtime_duration += month.overtime_duration;
            view.recovery_count += month.recovery_count;
            view.recovery_duration += month.recovery_duration;
            view.total_count += month.total_count;
            view.total_duration += month.total_duration;
        }

        Ok(view)
    }
}

fn year_start(year: i32) -> Result<Date, LedgerError> {
    Date::from_calendar_date(year, Month::January, 1).map_err(|_| LedgerError::InvalidPeriod {
        kind: ScopeKind::Month,
        period: 1,
        year,
    })
}

/// Highest period number among rows with at least one record.
fn latest_populated(rows: &[crate::domain::models::ScopeStatistics]) -> Option<u8> {
    rows.iter()
        .filter(|s| s.total_count > 0)
        .map(|s| s.key.period)
        .max()
}

/// Floors to two decimal places, like the report UI expects.
fn floor_2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}
