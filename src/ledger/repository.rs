use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::ChargeAttempt;
use crate::error::AppResult;

/// Append-only record of every charge attempt.
///
/// Never updated or deleted; the success-per-period lookup is what makes
/// re-running a batch idempotent.
#[async_trait]
pub trait AttemptLedger: Send + Sync {
    async fn append_attempt(&self, attempt: &ChargeAttempt) -> AppResult<()>;

    async fn has_success_for_period(
        &self,
        pledge_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn list_attempts(&self, pledge_id: Uuid) -> AppResult<Vec<ChargeAttempt>>;
}

/// Postgres-backed attempt ledger
pub struct PgAttemptLedger {
    pool: PgPool,
}

impl PgAttemptLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptLedger for PgAttemptLedger {
    async fn append_attempt(&self, attempt: &ChargeAttempt) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO charge_attempts (
                id, pledge_id, attempted_at, outcome, amount, currency,
                gateway_reference, error_detail, period_start
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.pledge_id)
        .bind(attempt.attempted_at)
        .bind(attempt.outcome)
        .bind(attempt.amount)
        .bind(&attempt.currency)
        .bind(&attempt.gateway_reference)
        .bind(&attempt.error_detail)
        .bind(attempt.period_start)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_success_for_period(
        &self,
        pledge_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM charge_attempts
                WHERE pledge_id = $1 AND period_start = $2 AND outcome = 'success'
            )
            "#,
        )
        .bind(pledge_id)
        .bind(period_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_attempts(&self, pledge_id: Uuid) -> AppResult<Vec<ChargeAttempt>> {
        let attempts = sqlx::query_as::<_, ChargeAttempt>(
            r#"
            SELECT id, pledge_id, attempted_at, outcome, amount, currency,
                   gateway_reference, error_detail, period_start
            FROM charge_attempts
            WHERE pledge_id = $1
            ORDER BY attempted_at ASC, id ASC
            "#,
        )
        .bind(pledge_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }
}
