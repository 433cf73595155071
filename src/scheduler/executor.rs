use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    AttemptResult, REASON_ALREADY_CHARGED, REASON_CONCURRENT_UPDATE, REASON_INFRASTRUCTURE,
    REASON_NOT_DUE,
};
use crate::error::AppResult;
use crate::gateway::{ChargeGateway, ChargeOutcome, ErrorClass};
use crate::ledger::models::{AttemptOutcome, ChargeAttempt};
use crate::ledger::repository::AttemptLedger;
use crate::pledges::models::{Pledge, PledgeStatus};
use crate::pledges::store::PledgeStore;

/// Performs one charge attempt per eligible pledge and records the outcome.
///
/// Both the due path and the retry path run through here; it is the single
/// place pledge state transitions are written.
pub struct ChargeExecutor {
    store: Arc<dyn PledgeStore>,
    ledger: Arc<dyn AttemptLedger>,
    gateway: Arc<dyn ChargeGateway>,
    max_consecutive_failures: i32,
}

impl ChargeExecutor {
    pub fn new(
        store: Arc<dyn PledgeStore>,
        ledger: Arc<dyn AttemptLedger>,
        gateway: Arc<dyn ChargeGateway>,
        max_consecutive_failures: i32,
    ) -> Self {
        Self {
            store,
            ledger,
            gateway,
            max_consecutive_failures,
        }
    }

    /// Execute one charge attempt for a pledge selected at `selected.version`.
    ///
    /// Never propagates an error: store/ledger failures become an
    /// `infrastructure_error` result so one bad pledge cannot abort the batch.
    pub async fn execute_charge(&self, selected: &Pledge, now: DateTime<Utc>) -> AttemptResult {
        match self.try_charge(selected, now).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    pledge_id = %selected.id,
                    "aborting attempt without mutating state: {}", err
                );
                AttemptResult::failed(selected.id, REASON_INFRASTRUCTURE.to_string())
            }
        }
    }

    async fn try_charge(&self, selected: &Pledge, now: DateTime<Utc>) -> AppResult<AttemptResult> {
        // Idempotency guard: re-load and re-validate. A pledge that was
        // paused, cancelled, or already advanced since selection is a no-op.
        let Some(current) = self.store.get_pledge(selected.id).await? else {
            return Ok(AttemptResult::skipped(selected.id, REASON_NOT_DUE));
        };
        if current.version != selected.version
            || !current.is_chargeable()
            || current.next_charge_at > now
        {
            return Ok(AttemptResult::skipped(selected.id, REASON_NOT_DUE));
        }

        // The billing period is keyed by next_charge_at as of selection
        let period_start = current.next_charge_at;

        if self
            .ledger
            .has_success_for_period(current.id, period_start)
            .await?
        {
            // A prior run charged this period but crashed before advancing the
            // schedule; complete the advance now instead of re-billing.
            let repaired = current.with_charge_success(period_start, now);
            if self
                .store
                .compare_and_update_pledge(current.id, current.version, &repaired)
                .await?
                .is_some()
            {
                warn!(pledge_id = %current.id, "advanced schedule for already-charged period");
            }
            return Ok(AttemptResult::skipped(current.id, REASON_ALREADY_CHARGED));
        }

        // Claim the pledge before touching the gateway. The version bump makes
        // a concurrent executor's claim fail, so at most one of them charges.
        let mut claim = current.clone();
        claim.last_attempt_at = Some(now);
        claim.updated_at = now;
        let Some(claimed) = self
            .store
            .compare_and_update_pledge(current.id, current.version, &claim)
            .await?
        else {
            return Ok(AttemptResult::skipped(current.id, REASON_CONCURRENT_UPDATE));
        };

        // Fund is read-only here: existence and active status only
        match self.store.get_fund(claimed.fund_id).await? {
            None => {
                return self
                    .record_failure(
                        &claimed,
                        period_start,
                        now,
                        ErrorClass::Permanent,
                        "fund_missing".to_string(),
                    )
                    .await;
            }
            Some(fund) if !fund.is_active => {
                return self
                    .record_failure(
                        &claimed,
                        period_start,
                        now,
                        ErrorClass::Permanent,
                        "fund_inactive".to_string(),
                    )
                    .await;
            }
            Some(_) => {}
        }

        let outcome = match self
            .gateway
            .attempt_charge(claimed.id, claimed.amount, &claimed.currency)
            .await
        {
            Ok(outcome) => outcome,
            // A failed gateway call is a transient decline, not a crash
            Err(err) => {
                warn!(pledge_id = %claimed.id, "gateway call failed: {}", err);
                ChargeOutcome::Declined {
                    class: ErrorClass::Transient,
                    detail: err.to_string(),
                }
            }
        };

        match outcome {
            ChargeOutcome::Approved { reference } => {
                self.ledger
                    .append_attempt(&ChargeAttempt::success(
                        &claimed,
                        period_start,
                        now,
                        reference,
                    ))
                    .await?;

                let advanced = claimed.with_charge_success(period_start, now);
                if self
                    .store
                    .compare_and_update_pledge(claimed.id, claimed.version, &advanced)
                    .await?
                    .is_none()
                {
                    // An external pause/cancel raced the in-flight charge. The
                    // money moved and the ledger says so; leave the state to
                    // the concurrent writer and let the repair path advance
                    // the schedule on the next pass if needed.
                    warn!(
                        pledge_id = %claimed.id,
                        "pledge changed while charge was in flight; success recorded"
                    );
                } else {
                    info!(
                        pledge_id = %claimed.id,
                        next_charge_at = %advanced.next_charge_at,
                        "charge succeeded, schedule advanced"
                    );
                }
                Ok(AttemptResult::charged(claimed.id))
            }
            ChargeOutcome::Declined { class, detail } => {
                self.record_failure(&claimed, period_start, now, class, detail)
                    .await
            }
        }
    }

    async fn record_failure(
        &self,
        claimed: &Pledge,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
        class: ErrorClass,
        detail: String,
    ) -> AppResult<AttemptResult> {
        let (outcome, reason_prefix) = match class {
            ErrorClass::Transient => (AttemptOutcome::TransientFailure, "transient_failure"),
            ErrorClass::Permanent => (AttemptOutcome::PermanentFailure, "permanent_failure"),
        };

        self.ledger
            .append_attempt(&ChargeAttempt::failure(
                claimed,
                period_start,
                now,
                outcome,
                detail.clone(),
            ))
            .await?;

        let permanent = class == ErrorClass::Permanent;
        let updated = claimed.with_charge_failure(now, permanent, self.max_consecutive_failures);

        if self
            .store
            .compare_and_update_pledge(claimed.id, claimed.version, &updated)
            .await?
            .is_none()
        {
            warn!(
                pledge_id = %claimed.id,
                "pledge changed while recording failure; ledger entry kept"
            );
        } else if updated.status == PledgeStatus::Paused {
            info!(
                pledge_id = %claimed.id,
                consecutive_failures = updated.consecutive_failures,
                "pledge paused pending human review: {}", detail
            );
        } else {
            info!(
                pledge_id = %claimed.id,
                consecutive_failures = updated.consecutive_failures,
                "charge failed, pledge retryable: {}", detail
            );
        }

        Ok(AttemptResult::failed(
            claimed.id,
            format!("{}: {}", reason_prefix, detail),
        ))
    }
}
