use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppResult, PledgeError};
use crate::ledger::models::ChargeAttempt;
use crate::ledger::repository::AttemptLedger;
use crate::pledges::models::{Cadence, Pledge, PledgeStatus};
use crate::pledges::store::PledgeStore;
use crate::scheduler::driver::SchedulerDriver;
use crate::scheduler::AttemptResult;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PledgeStore>,
    pub ledger: Arc<dyn AttemptLedger>,
    pub driver: Arc<SchedulerDriver>,
}

// How many compare-and-update rounds a lifecycle action tries before giving
// up with a conflict
const TRANSITION_RETRIES: usize = 3;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
pub struct CreatePledgeRequest {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub fund_id: Uuid,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub cadence: Cadence,
    /// Defaults to now: the first period begins immediately
    pub first_charge_at: Option<DateTime<Utc>>,
}

pub async fn create_pledge(
    State(state): State<AppState>,
    Json(req): Json<CreatePledgeRequest>,
) -> AppResult<Json<Pledge>> {
    if req.amount <= Decimal::ZERO {
        return Err(PledgeError::InvalidAmount.into());
    }

    let fund = state
        .store
        .get_fund(req.fund_id)
        .await?
        .ok_or(PledgeError::FundNotFound(req.fund_id))?;
    if !fund.is_active {
        return Err(PledgeError::FundInactive(fund.id).into());
    }

    let now = Utc::now();
    let pledge = Pledge {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        tenant_id: req.tenant_id,
        fund_id: req.fund_id,
        amount: req.amount,
        currency: req.currency.unwrap_or_else(|| "USD".to_string()),
        cadence: req.cadence,
        next_charge_at: req.first_charge_at.unwrap_or(now),
        status: PledgeStatus::Active,
        paused_at: None,
        consecutive_failures: 0,
        last_attempt_at: None,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    state.store.insert_pledge(&pledge).await?;
    info!(pledge_id = %pledge.id, tenant_id = %pledge.tenant_id, "pledge created");
    Ok(Json(pledge))
}

pub async fn get_pledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pledge>> {
    let pledge = state
        .store
        .get_pledge(id)
        .await?
        .ok_or(PledgeError::NotFound(id))?;
    Ok(Json(pledge))
}

pub async fn list_pledge_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ChargeAttempt>>> {
    state
        .store
        .get_pledge(id)
        .await?
        .ok_or(PledgeError::NotFound(id))?;
    let attempts = state.ledger.list_attempts(id).await?;
    Ok(Json(attempts))
}

/// Apply an external lifecycle transition under compare-and-update, retrying
/// a bounded number of times when a concurrent writer interleaves.
async fn transition_pledge<F>(state: &AppState, id: Uuid, apply: F) -> AppResult<Json<Pledge>>
where
    F: Fn(&Pledge, DateTime<Utc>) -> Result<Pledge, PledgeError>,
{
    for _ in 0..TRANSITION_RETRIES {
        let current = state
            .store
            .get_pledge(id)
            .await?
            .ok_or(PledgeError::NotFound(id))?;
        let updated = apply(&current, Utc::now())?;
        if let Some(written) = state
            .store
            .compare_and_update_pledge(id, current.version, &updated)
            .await?
        {
            info!(pledge_id = %id, status = %written.status, "pledge transitioned");
            return Ok(Json(written));
        }
    }
    Err(PledgeError::ConcurrentUpdate.into())
}

pub async fn pause_pledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pledge>> {
    transition_pledge(&state, id, |p, now| p.pause(now)).await
}

pub async fn resume_pledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pledge>> {
    transition_pledge(&state, id, |p, now| p.resume(now)).await
}

pub async fn cancel_pledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pledge>> {
    transition_pledge(&state, id, |p, now| p.cancel(now)).await
}

/// Batch response with aggregated counts for the external trigger
#[derive(Serialize)]
pub struct BatchResponse {
    pub charged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<AttemptResult>,
}

impl BatchResponse {
    fn from_results(results: Vec<AttemptResult>) -> Self {
        let charged = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.is_skip()).count();
        let failed = results.len() - charged - skipped;
        Self {
            charged,
            skipped,
            failed,
            results,
        }
    }
}

/// Manual trigger for the due-pledge batch; authorization is the caller's
/// responsibility (upstream of this service)
pub async fn process_due_pledges(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> AppResult<Json<BatchResponse>> {
    let results = state.driver.process_due_pledges(tenant_id).await?;
    Ok(Json(BatchResponse::from_results(results)))
}

pub async fn retry_failed_pledges(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> AppResult<Json<BatchResponse>> {
    let results = state.driver.retry_failed_pledges(tenant_id).await?;
    Ok(Json(BatchResponse::from_results(results)))
}
