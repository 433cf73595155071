use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Fund, Pledge};
use super::store::PledgeStore;
use crate::error::AppResult;

const PLEDGE_COLUMNS: &str = "id, user_id, tenant_id, fund_id, amount, currency, \
     cadence, next_charge_at, status, paused_at, consecutive_failures, \
     last_attempt_at, version, created_at, updated_at";

/// Postgres-backed pledge store
pub struct PgPledgeStore {
    pool: PgPool,
}

impl PgPledgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PledgeStore for PgPledgeStore {
    async fn get_pledge(&self, id: Uuid) -> AppResult<Option<Pledge>> {
        let pledge = sqlx::query_as::<_, Pledge>(&format!(
            "SELECT {PLEDGE_COLUMNS} FROM pledges WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(pledge)
    }

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pledges (
                id, user_id, tenant_id, fund_id, amount, currency, cadence,
                next_charge_at, status, paused_at, consecutive_failures,
                last_attempt_at, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(pledge.id)
        .bind(pledge.user_id)
        .bind(pledge.tenant_id)
        .bind(pledge.fund_id)
        .bind(pledge.amount)
        .bind(&pledge.currency)
        .bind(pledge.cadence)
        .bind(pledge.next_charge_at)
        .bind(pledge.status)
        .bind(pledge.paused_at)
        .bind(pledge.consecutive_failures)
        .bind(pledge.last_attempt_at)
        .bind(pledge.version)
        .bind(pledge.created_at)
        .bind(pledge.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn compare_and_update_pledge(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: &Pledge,
    ) -> AppResult<Option<Pledge>> {
        // Only scheduler-mutable fields change; identity and amount are fixed
        // at creation. No row back means another writer won the race.
        let updated = sqlx::query_as::<_, Pledge>(&format!(
            r#"
            UPDATE pledges
            SET status = $3,
                next_charge_at = $4,
                paused_at = $5,
                consecutive_failures = $6,
                last_attempt_at = $7,
                updated_at = $8,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {PLEDGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected_version)
        .bind(new_state.status)
        .bind(new_state.next_charge_at)
        .bind(new_state.paused_at)
        .bind(new_state.consecutive_failures)
        .bind(new_state.last_attempt_at)
        .bind(new_state.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn list_due_pledges(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Pledge>> {
        let pledges = sqlx::query_as::<_, Pledge>(&format!(
            r#"
            SELECT {PLEDGE_COLUMNS}
            FROM pledges
            WHERE tenant_id = $1 AND status = 'active' AND next_charge_at <= $2
            ORDER BY next_charge_at ASC, id ASC
            "#
        ))
        .bind(tenant_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(pledges)
    }

    async fn list_failed_pledges(&self, tenant_id: Uuid) -> AppResult<Vec<Pledge>> {
        let pledges = sqlx::query_as::<_, Pledge>(&format!(
            r#"
            SELECT {PLEDGE_COLUMNS}
            FROM pledges
            WHERE tenant_id = $1 AND status = 'failed'
            ORDER BY next_charge_at ASC, id ASC
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(pledges)
    }

    async fn get_fund(&self, id: Uuid) -> AppResult<Option<Fund>> {
        let fund = sqlx::query_as::<_, Fund>(
            "SELECT id, tenant_id, name, is_active, created_at FROM funds WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(fund)
    }

    async fn list_chargeable_tenants(&self) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM pledges WHERE status IN ('active', 'failed')",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
