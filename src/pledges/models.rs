use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

use crate::error::PledgeError;

/// Pledge lifecycle status
///
/// Transitions are driven by the scheduler (charge success/failure) or by
/// explicit pause/resume/cancel actions. Cancelled is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "pledge_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PledgeStatus {
    Active,
    Paused,
    Failed,
    Cancelled,
}

impl fmt::Display for PledgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PledgeStatus::Active => "active",
            PledgeStatus::Paused => "paused",
            PledgeStatus::Failed => "failed",
            PledgeStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PledgeStatus::Cancelled)
    }
}

/// Billing cadence of a recurring pledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "pledge_cadence", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    /// Next charge timestamp, advanced from the prior scheduled value.
    ///
    /// Always computed from the previous `next_charge_at`, never from
    /// wall-clock now, so delayed runs do not accumulate drift. Saturates at
    /// the maximum representable timestamp instead of overflowing.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let advanced = match self {
            Cadence::Weekly => from.checked_add_signed(Duration::weeks(1)),
            Cadence::Monthly => from.checked_add_months(Months::new(1)),
            Cadence::Yearly => from.checked_add_months(Months::new(12)),
        };
        advanced.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Recurring commitment to donate a fixed amount to a fund at a fixed cadence
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pledge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub fund_id: Uuid,

    pub amount: Decimal,
    pub currency: String,
    pub cadence: Cadence,

    pub next_charge_at: DateTime<Utc>,
    pub status: PledgeStatus,
    pub paused_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Bumped on every write; compare-and-update key
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pledge {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PledgeStatus::Active && self.next_charge_at <= now
    }

    /// A pledge the executor may attempt: active (due path) or failed (retry path)
    pub fn is_chargeable(&self) -> bool {
        matches!(self.status, PledgeStatus::Active | PledgeStatus::Failed)
    }

    /// State after a successful charge covering the period that started at
    /// `period_start`. Resets the failure counter and advances the schedule.
    pub fn with_charge_success(&self, period_start: DateTime<Utc>, now: DateTime<Utc>) -> Pledge {
        Pledge {
            status: PledgeStatus::Active,
            next_charge_at: self.cadence.advance(period_start),
            paused_at: None,
            consecutive_failures: 0,
            last_attempt_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// State after a failed charge. Transient failures under the cap stay
    /// retryable; permanent failures or hitting the cap pause the pledge so a
    /// human must re-activate it. `next_charge_at` is left unchanged so the
    /// retry path can find the pledge.
    pub fn with_charge_failure(
        &self,
        now: DateTime<Utc>,
        permanent: bool,
        max_consecutive_failures: i32,
    ) -> Pledge {
        let failures = self.consecutive_failures + 1;
        let (status, paused_at) = if permanent || failures >= max_consecutive_failures {
            (PledgeStatus::Paused, Some(now))
        } else {
            (PledgeStatus::Failed, None)
        };
        Pledge {
            status,
            paused_at,
            consecutive_failures: failures,
            last_attempt_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// External pause action
    pub fn pause(&self, now: DateTime<Utc>) -> Result<Pledge, PledgeError> {
        match self.status {
            PledgeStatus::Active | PledgeStatus::Failed => Ok(Pledge {
                status: PledgeStatus::Paused,
                paused_at: Some(now),
                updated_at: now,
                ..self.clone()
            }),
            _ => Err(PledgeError::InvalidState {
                current: self.status.to_string(),
                expected: "active or failed".to_string(),
            }),
        }
    }

    /// External resume action; clears the failure counter so the pledge gets a
    /// fresh retry budget
    pub fn resume(&self, now: DateTime<Utc>) -> Result<Pledge, PledgeError> {
        match self.status {
            PledgeStatus::Paused => Ok(Pledge {
                status: PledgeStatus::Active,
                paused_at: None,
                consecutive_failures: 0,
                updated_at: now,
                ..self.clone()
            }),
            _ => Err(PledgeError::InvalidState {
                current: self.status.to_string(),
                expected: "paused".to_string(),
            }),
        }
    }

    /// External cancel action; terminal
    pub fn cancel(&self, now: DateTime<Utc>) -> Result<Pledge, PledgeError> {
        if self.status.is_terminal() {
            return Err(PledgeError::InvalidState {
                current: self.status.to_string(),
                expected: "any non-cancelled state".to_string(),
            });
        }
        Ok(Pledge {
            status: PledgeStatus::Cancelled,
            updated_at: now,
            ..self.clone()
        })
    }
}

/// Donation target; read-only from the scheduler's perspective
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Fund {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
