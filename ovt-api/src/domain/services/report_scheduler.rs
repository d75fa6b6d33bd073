use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::instrument;

use crate::domain::{
    models::{PeriodReport, ReportKind, ReportRecipient, ScopeKey},
    ports::outbound::{LedgerStore, Mailer, StatisticsStore, UserDirectory},
    LedgerError,
};

use super::{BalanceService, StatisticsService};

/// Tuning knobs for the report scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often eligibility is re-evaluated. Hourly in production; the job
    /// is a no-op on almost every tick.
    pub tick_interval: Duration,
    /// Local hour at which reports go out (0-23).
    pub send_hour: u8,
    /// Upper bound on one mail-transport call.
    pub send_timeout: Duration,
    /// Fan-out cap so a large batch cannot overwhelm the transport.
    pub max_concurrent_sends: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3600),
            send_hour: 9,
            send_timeout: Duration::from_secs(30),
            max_concurrent_sends: 8,
        }
    }
}

/// The report period a tick resolved to: previous month or previous ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub period: u8,
    pub year: i32,
}

/// Periodic, timezone-aware report fan-out.
///
/// Stateless across ticks: eligibility is re-derived from wall-clock time on
/// every tick, so a missed tick silently skips its send window (at-most-once
/// delivery, by design).
pub struct ReportScheduler<L, S, U, M> {
    ledger: Arc<L>,
    statistics: Arc<StatisticsService<L, S>>,
    balance: Arc<BalanceService<L, S>>,
    users: Arc<U>,
    mailer: Arc<M>,
    config: SchedulerConfig,
}

impl<L, S, U, M> ReportScheduler<L, S, U, M>
where
    L: LedgerStore,
    S: StatisticsStore,
    U: UserDirectory,
    M: Mailer,
{
    pub fn new(
        ledger: Arc<L>,
        statistics: Arc<StatisticsService<L, S>>,
        balance: Arc<BalanceService<L, S>>,
        users: Arc<U>,
        mailer: Arc<M>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ledger,
            statistics,
            balance,
            users,
            mailer,
            config,
        }
    }

    /// Runs until the shutdown signal flips; ticks are best-effort.
    #[instrument(name = "ReportScheduler::run", skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        tracing::error!(error = %err, "report tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("report scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One eligibility pass for both report kinds at the given instant.
    #[instrument(name = "ReportScheduler::tick", skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let zones = self.users.all_time_zone_names().await?;

        for kind in ReportKind::ALL {
            let eligible = eligible_zones(&zones, now, self.config.send_hour, kind);
            if eligible.is_empty() {
                tracing::debug!(kind = %kind, "no timezone eligible this tick");
                continue;
            }

            // All eligible zones share the same local date by construction;
            // the first one serves as the reference for period numbering.
            let Some(period) = resolve_previous_period(kind, now, &eligible[0]) else {
                tracing::warn!(kind = %kind, zone = %eligible[0], "could not resolve report period");
                continue;
            };

            // One kind's failed dispatch must not keep the other kind from
            // being evaluated this tick.
            if let Err(err) = self.dispatch(kind, period, &eligible).await {
                tracing::error!(kind = %kind, error = %err, "report dispatch failed");
            }
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        kind: ReportKind,
        period: ReportPeriod,
        zones: &[String],
    ) -> Result<(), LedgerError> {
        let recipients = self.users.report_recipients(kind, zones).await?;
        tracing::info!(
            kind = %kind,
            period = period.period,
            year = period.year,
            recipients = recipients.len(),
            "dispatching statistics reports"
        );

        stream::iter(recipients)
            .for_each_concurrent(self.config.max_concurrent_sends, |recipient| async move {
                // Per-recipient isolation: one failed delivery never stops
                // the rest of the batch.
                if let Err(err) = self.send_report(kind, period, &recipient).await {
                    tracing::error!(
                        user = %recipient.user,
                        username = %recipient.username,
                        error = %err,
                        "failed to deliver report"
                    );
                }
            })
            .await;

        Ok(())
    }

    async fn send_report(
        &self,
        kind: ReportKind,
        period: ReportPeriod,
        recipient: &ReportRecipient,
    ) -> Result<(), LedgerError> {
        let scope = kind.scope_kind();
        let key = ScopeKey::new(scope, recipient.user, period.period, period.year)?;
        let (start, end) = key.window()?;

        let statistics = self
            .statistics
            .get_or_zero(scope, recipient.user, period.period, period.year)
            .await?;
        let records = self
            .ledger
            .find_by_owner_and_date_range(recipient.user, start, end)
            .await?;
        let balance = match kind {
            ReportKind::Monthly => {
                self.balance
                    .month_balance(recipient.user, period.period, period.year)
                    .await?
            }
            ReportKind::Weekly => {
                self.balance
                    .week_balance(recipient.user, period.period, period.year)
                    .await?
            }
        };

        let report = PeriodReport {
            kind,
            period_start: start,
            period_end: end,
            statistics,
            records,
            balance,
        };

        match tokio::time::timeout(self.config.send_timeout, self.mailer.send(recipient, &report))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LedgerError::MailTimeout),
        }
    }
}

/// Zones whose local time is at the send hour on the first day of the
/// report period (day 1 for monthly, Monday for weekly).
pub fn eligible_zones(
    zones: &[String],
    now: DateTime<Utc>,
    send_hour: u8,
    kind: ReportKind,
) -> Vec<String> {
    zones
        .iter()
        .filter(|name| {
            let tz: Tz = match name.parse() {
                Ok(tz) => tz,
                Err(_) => {
                    tracing::warn!(zone = %name, "skipping unknown IANA timezone");
                    return false;
                }
            };

            let local = now.with_timezone(&tz);
            if local.hour() != u32::from(send_hour) {
                return false;
            }
            match kind {
                ReportKind::Monthly => local.day() == 1,
                ReportKind::Weekly => local.weekday() == chrono::Weekday::Mon,
            }
        })
        .cloned()
        .collect()
}

/// The previous month or previous ISO week, as seen from the reference zone.
fn resolve_previous_period(
    kind: ReportKind,
    now: DateTime<Utc>,
    reference_zone: &str,
) -> Option<ReportPeriod> {
    let tz: Tz = reference_zone.parse().ok()?;
    let local = now.with_timezone(&tz).date_naive();

    match kind {
        ReportKind::Monthly => previous_month(local),
        ReportKind::Weekly => Some(previous_iso_week(local)),
    }
}

fn previous_month(local: NaiveDate) -> Option<ReportPeriod> {
    let last_of_previous = local.with_day(1)?.pred_opt()?;
    Some(ReportPeriod {
        period: last_of_previous.month() as u8,
        year: last_of_previous.year(),
    })
}

fn previous_iso_week(local: NaiveDate) -> ReportPeriod {
    let week = (local - chrono::Duration::days(7)).iso_week();
    ReportPeriod {
        period: week.week() as u8,
        year: week.year(),
    }
}
