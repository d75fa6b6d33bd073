use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::{
    models::{ScopeKey, ScopeKind, ScopeStatistics, UserId},
    ports::outbound::StatisticsStore,
    LedgerError,
};

/// Aggregate persistence on top of the `month_statistics` and
/// `week_statistics` tables.
pub struct PostgresStatisticsStore {
    pool: PgPool,
}

impl PostgresStatisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Table and period column for a scope kind. Both tables share the remaining
/// column layout.
fn table_for(kind: ScopeKind) -> (&'static str, &'static str) {
    match kind {
        ScopeKind::Month => ("month_statistics", "month"),
        ScopeKind::Week => ("week_statistics", "week"),
    }
}

#[derive(sqlx::FromRow)]
struct StatisticsRow {
    user_id: i32,
    period: i32,
    year: i32,
    overtime_count: i64,
    overtime_duration: i64,
    recovery_count: i64,
    recovery_duration: i64,
    total_count: i64,
    total_duration: i64,
    updated_at: OffsetDateTime,
}

impl StatisticsRow {
    fn into_statistics(self, kind: ScopeKind) -> Result<ScopeStatistics, LedgerError> {
        let period = u8::try_from(self.period).map_err(|_| {
            LedgerError::Integrity(format!("stored period {} out of range", self.period))
        })?;
        let key = ScopeKey::new(kind, UserId::new(self.user_id), period, self.year)?;

        Ok(ScopeStatistics {
            key,
            overtime_count: self.overtime_count,
            overtime_duration: self.overtime_duration,
            recovery_count: self.recovery_count,
            recovery_duration: self.recovery_duration,
            total_count: self.total_count,
            total_duration: self.total_duration,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl StatisticsStore for PostgresStatisticsStore {
    async fn find(&self, key: &ScopeKey) -> Result<Option<ScopeStatistics>, LedgerError> {
        let (table, period_column) = table_for(key.kind);
        let row = sqlx::query_as::<_, StatisticsRow>(&format!(
            r#"
            SELECT user_id, {period_column} AS period, year,
                   overtime_count, overtime_duration,
                   recovery_count, recovery_duration,
                   total_count, total_duration, updated_at
            FROM {table}
            WHERE user_id = $1 AND {period_column} = $2 AND year = $3
            "#
        ))
        .bind(key.owner.as_i32())
        .bind(i32::from(key.period))
        .bind(key.year)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_statistics(key.kind)).transpose()
    }

    async fn replace(&self, statistics: &ScopeStatistics) -> Result<(), LedgerError> {
        let key = statistics.key;
        let (table, period_column) = table_for(key.kind);

        // Full replacement: the old row never survives, even partially.
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            r#"
            DELETE FROM {table}
            WHERE user_id = $1 AND {period_column} = $2 AND year = $3
            "#
        ))
        .bind(key.owner.as_i32())
        .bind(i32::from(key.period))
        .bind(key.year)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (user_id, {period_column}, year,
                                 overtime_count, overtime_duration,
                                 recovery_count, recovery_duration,
                                 total_count, total_duration, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#
        ))
        .bind(key.owner.as_i32())
        .bind(i32::from(key.period))
        .bind(key.year)
        .bind(statistics.overtime_count)
        .bind(statistics.overtime_duration)
        .bind(statistics.recovery_count)
        .bind(statistics.recovery_duration)
        .bind(statistics.total_count)
        .bind(statistics.total_duration)
        .bind(statistics.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, key: &ScopeKey) -> Result<(), LedgerError> {
        let (table, period_column) = table_for(key.kind);
        sqlx::query(&format!(
            r#"
            DELETE FROM {table}
            WHERE user_id = $1 AND {period_column} = $2 AND year = $3
            "#
        ))
        .bind(key.owner.as_i32())
        .bind(i32::from(key.period))
        .bind(key.year)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_all_for_owner(&self, owner: UserId) -> Result<(), LedgerError> {
        for kind in [ScopeKind::Month, ScopeKind::Week] {
            let (table, _) = table_for(kind);
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id = $1"))
                .bind(owner.as_i32())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn find_for_year(
        &self,
        kind: ScopeKind,
        owner: UserId,
        year: i32,
    ) -> Result<Vec<ScopeStatistics>, LedgerError> {
        let (table, period_column) = table_for(kind);
        let rows = sqlx::query_as::<_, StatisticsRow>(&format!(
            r#"
            SELECT user_id, {period_column} AS period, year,
                   overtime_count, overtime_duration,
                   recovery_count, recovery_duration,
                   total_count, total_duration, updated_at
            FROM {table}
            WHERE user_id = $1 AND year = $2
            ORDER BY {period_column}
            "#
        ))
        .bind(owner.as_i32())
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_statistics(kind)).collect()
    }
}
