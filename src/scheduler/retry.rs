use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::pledges::models::{Pledge, PledgeStatus};

/// Exponential backoff with a cap, a deterministic function of the
/// consecutive-failure count. Optional jitter spreads retries out when many
/// pledges failed at the same instant.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_secs: i64,
    pub max_secs: i64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_secs: config.retry_base_secs,
            max_secs: config.retry_max_secs,
            jitter: config.retry_jitter,
        }
    }

    /// backoff(n) = min(base * 2^n, max)
    pub fn backoff(&self, consecutive_failures: i32) -> Duration {
        let shift = consecutive_failures.clamp(0, 31) as u32;
        let secs = self
            .base_secs
            .saturating_mul(1i64.checked_shl(shift).unwrap_or(i64::MAX))
            .min(self.max_secs);
        Duration::seconds(secs)
    }

    /// Backoff with up to 10% extra delay when jitter is enabled
    fn effective_backoff(&self, consecutive_failures: i32) -> Duration {
        let base = self.backoff(consecutive_failures);
        if !self.jitter {
            return base;
        }
        let max_extra = base.num_seconds() / 10;
        if max_extra == 0 {
            return base;
        }
        base + Duration::seconds(rand::random_range(0..=max_extra))
    }

    /// Whether a failed pledge's backoff window has elapsed
    pub fn is_retry_due(&self, pledge: &Pledge, now: DateTime<Utc>) -> bool {
        if pledge.status != PledgeStatus::Failed {
            return false;
        }
        match pledge.last_attempt_at {
            // A failed pledge with no recorded attempt is immediately retryable
            None => true,
            Some(at) => at + self.effective_backoff(pledge.consecutive_failures) <= now,
        }
    }
}

/// Filter failed pledges down to those whose backoff window has elapsed,
/// keeping the deterministic (next_charge_at, id) processing order.
pub fn select_retryable(
    policy: &RetryPolicy,
    failed: Vec<Pledge>,
    now: DateTime<Utc>,
) -> Vec<Pledge> {
    let mut retryable: Vec<Pledge> = failed
        .into_iter()
        .filter(|p| policy.is_retry_due(p, now))
        .collect();
    retryable.sort_by(|a, b| {
        a.next_charge_at
            .cmp(&b.next_charge_at)
            .then(a.id.cmp(&b.id))
    });
    retryable
}
