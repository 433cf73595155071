use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Fund, Pledge};
use crate::error::AppResult;

/// Durable record of pledges and their lifecycle state.
///
/// The scheduler holds no private copy beyond one processing pass; every
/// mutation goes through `compare_and_update_pledge` so two concurrent
/// executors cannot both act on the same snapshot.
#[async_trait]
pub trait PledgeStore: Send + Sync {
    async fn get_pledge(&self, id: Uuid) -> AppResult<Option<Pledge>>;

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()>;

    /// Atomic compare-and-update keyed on (id, version). The stored row is
    /// replaced with `new_state` (version bumped) only if its current version
    /// equals `expected_version`; returns the updated row, or `None` when
    /// another writer got there first.
    async fn compare_and_update_pledge(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: &Pledge,
    ) -> AppResult<Option<Pledge>>;

    /// Active pledges with `next_charge_at <= now`, ordered ascending by
    /// `next_charge_at` and tie-broken by id. Snapshot read, no side effects.
    async fn list_due_pledges(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Pledge>>;

    /// Failed pledges for a tenant; the retry coordinator applies the backoff
    /// window on top of this.
    async fn list_failed_pledges(&self, tenant_id: Uuid) -> AppResult<Vec<Pledge>>;

    async fn get_fund(&self, id: Uuid) -> AppResult<Option<Fund>>;

    /// Tenants that currently have active or failed pledges; drives the
    /// background timer.
    async fn list_chargeable_tenants(&self) -> AppResult<Vec<Uuid>>;
}
