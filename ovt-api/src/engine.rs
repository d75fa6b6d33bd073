use std::sync::Arc;

use sqlx::PgPool;

use crate::adapters::outbound::{
    mail::HttpMailer,
    postgres::{PostgresLedgerStore, PostgresStatisticsStore, PostgresUserDirectory},
};
use crate::config::Settings;
use crate::domain::{
    services::{BalanceService, LedgerService, ReportScheduler, StatisticsService},
    MutationBus,
};

type Ledger = LedgerService<PostgresLedgerStore>;
type Statistics = StatisticsService<PostgresLedgerStore, PostgresStatisticsStore>;
type Balance = BalanceService<PostgresLedgerStore, PostgresStatisticsStore>;
type Scheduler =
    ReportScheduler<PostgresLedgerStore, PostgresStatisticsStore, PostgresUserDirectory, HttpMailer>;

/// The fully wired engine over the Postgres adapters.
///
/// Aggregate recomputation is registered as a detached subscriber, so a write
/// returns as soon as the ledger row is persisted and the rebuild runs in the
/// background.
pub struct Engine {
    pub ledger: Arc<Ledger>,
    pub statistics: Arc<Statistics>,
    pub balance: Arc<Balance>,
    pub scheduler: Arc<Scheduler>,
}

impl Engine {
    pub fn new(pool: PgPool, config: &Settings) -> Self {
        let ledger_store = Arc::new(PostgresLedgerStore::new(pool.clone()));
        let statistics_store = Arc::new(PostgresStatisticsStore::new(pool.clone()));
        let user_directory = Arc::new(PostgresUserDirectory::new(pool.clone()));
        let mailer = Arc::new(HttpMailer::new(&config.mail));

        let statistics = Arc::new(StatisticsService::new(
            ledger_store.clone(),
            statistics_store.clone(),
        ));
        let balance = Arc::new(BalanceService::new(
            ledger_store.clone(),
            statistics_store,
        ));

        let mut bus = MutationBus::new();
        bus.subscribe_detached(statistics.clone());
        let ledger = Arc::new(LedgerService::new(ledger_store.clone(), Arc::new(bus)));

        let scheduler = Arc::new(ReportScheduler::new(
            ledger_store,
            statistics.clone(),
            balance.clone(),
            user_directory,
            mailer,
            config.scheduler_config(),
        ));

        Self {
            ledger,
            statistics,
            balance,
            scheduler,
        }
    }
}
