use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use uuid::Uuid;

use crate::pledges::models::Pledge;

/// Outcome of one charge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "attempt_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// Immutable record of one charge attempt (append-only audit trail).
///
/// `period_start` is the pledge's `next_charge_at` value at selection time and
/// identifies the billing period; at most one Success row exists per
/// (pledge_id, period_start).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChargeAttempt {
    pub id: Uuid,
    pub pledge_id: Uuid,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_reference: Option<String>,
    pub error_detail: Option<String>,
    pub period_start: DateTime<Utc>,
}

impl ChargeAttempt {
    pub fn success(
        pledge: &Pledge,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
        gateway_reference: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pledge_id: pledge.id,
            attempted_at: now,
            outcome: AttemptOutcome::Success,
            amount: pledge.amount,
            currency: pledge.currency.clone(),
            gateway_reference: Some(gateway_reference),
            error_detail: None,
            period_start,
        }
    }

    pub fn failure(
        pledge: &Pledge,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
        outcome: AttemptOutcome,
        error_detail: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pledge_id: pledge.id,
            attempted_at: now,
            outcome,
            amount: pledge.amount,
            currency: pledge.currency.clone(),
            gateway_reference: None,
            error_detail: Some(error_detail),
            period_start,
        }
    }
}
