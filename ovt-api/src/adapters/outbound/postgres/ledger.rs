use async_trait::async_trait;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};

use crate::domain::{
    models::{NewTimeRecord, RecordKind, SortOrder, TimeRecord, TimeRecordId, UserId},
    ports::outbound::LedgerStore,
    LedgerError,
};

/// Ledger persistence on top of the `time_records` table.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TimeRecordRow {
    id: i32,
    user_id: i32,
    duration: i32,
    kind: String,
    date: Date,
    notes: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<TimeRecordRow> for TimeRecord {
    type Error = LedgerError;

    fn try_from(row: TimeRecordRow) -> Result<Self, Self::Error> {
        let kind: RecordKind = row
            .kind
            .parse()
            .map_err(|_| LedgerError::Integrity(format!("unknown record kind '{}'", row.kind)))?;

        Ok(TimeRecord {
            id: TimeRecordId::new(row.id),
            owner: UserId::new(row.user_id),
            duration_minutes: row.duration,
            kind,
            date: row.date,
            note: row.notes,
            created_at: row.created_at,
        })
    }
}

const RECORD_COLUMNS: &str = "id, user_id, duration, kind, date, notes, created_at";

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert(
        &self,
        owner: UserId,
        record: &NewTimeRecord,
    ) -> Result<TimeRecord, LedgerError> {
        let row = sqlx::query_as::<_, TimeRecordRow>(&format!(
            r#"
            INSERT INTO time_records (user_id, duration, kind, date, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(owner.as_i32())
        .bind(record.duration_minutes)
        .bind(record.kind.to_string())
        .bind(record.date)
        .bind(record.note.as_deref())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update(&self, record: &TimeRecord) -> Result<TimeRecord, LedgerError> {
        let row = sqlx::query_as::<_, TimeRecordRow>(&format!(
            r#"
            UPDATE time_records
            SET duration = $1, kind = $2, date = $3, notes = $4
            WHERE id = $5 AND user_id = $6
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.duration_minutes)
        .bind(record.kind.to_string())
        .bind(record.date)
        .bind(record.note.as_deref())
        .bind(record.id.as_i32())
        .bind(record.owner.as_i32())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::RecordNotFound(record.id))?;

        row.try_into()
    }

    async fn delete_one(&self, id: TimeRecordId, owner: UserId) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM time_records
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id.as_i32())
        .bind(owner.as_i32())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn delete_all_for_owner(&self, owner: UserId) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM time_records
            WHERE user_id = $1
            "#,
        )
        .bind(owner.as_i32())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_id(
        &self,
        id: TimeRecordId,
        owner: UserId,
    ) -> Result<Option<TimeRecord>, LedgerError> {
        let row = sqlx::query_as::<_, TimeRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM time_records
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id.as_i32())
        .bind(owner.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TimeRecord::try_from).transpose()
    }

    async fn find_by_owner_and_date_range(
        &self,
        owner: UserId,
        start: Date,
        end: Date,
    ) -> Result<Vec<TimeRecord>, LedgerError> {
        let rows = sqlx::query_as::<_, TimeRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM time_records
            WHERE user_id = $1 AND date >= $2 AND date < $3
            ORDER BY date, id
            "#
        ))
        .bind(owner.as_i32())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeRecord::try_from).collect()
    }

    async fn find_all(
        &self,
        owner: UserId,
        from: Option<Date>,
        to: Option<Date>,
        order: SortOrder,
    ) -> Result<Vec<TimeRecord>, LedgerError> {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let rows = sqlx::query_as::<_, TimeRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM time_records
            WHERE user_id = $1
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date < $3)
            ORDER BY date {direction}, id {direction}
            "#
        ))
        .bind(owner.as_i32())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeRecord::try_from).collect()
    }
}
