use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{
    models::{Email, ReportKind, ReportRecipient, UserId},
    ports::outbound::UserDirectory,
    LedgerError,
};

/// Settings key holding a user's IANA timezone name.
const TIME_ZONE_CODE: &str = "TIME_ZONE";

/// User and per-user settings lookups backing the report scheduler.
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: i32,
    username: String,
    email: String,
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn all_time_zone_names(&self) -> Result<Vec<String>, LedgerError> {
        let zones: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT value
            FROM user_settings
            WHERE code = $1
            ORDER BY value
            "#,
        )
        .bind(TIME_ZONE_CODE)
        .fetch_all(&self.pool)
        .await?;

        Ok(zones.into_iter().map(|(zone,)| zone).collect())
    }

    async fn report_recipients(
        &self,
        kind: ReportKind,
        zones: &[String],
    ) -> Result<Vec<ReportRecipient>, LedgerError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT u.id, u.username, u.email
            FROM users u
            JOIN user_settings tz
              ON tz.user_id = u.id AND tz.code = $1 AND tz.value = ANY($2)
            JOIN user_settings opt
              ON opt.user_id = u.id AND opt.code = $3 AND opt.value = 'true'
            ORDER BY u.id
            "#,
        )
        .bind(TIME_ZONE_CODE)
        .bind(zones)
        .bind(kind.opt_in_code())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let email: Email = row.email.parse().map_err(|_| {
                    LedgerError::Integrity(format!(
                        "user {} has invalid email '{}'",
                        row.id, row.email
                    ))
                })?;
                Ok(ReportRecipient {
                    user: UserId::new(row.id),
                    username: row.username,
                    email,
                })
            })
            .collect()
    }
}
