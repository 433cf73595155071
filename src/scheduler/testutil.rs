//! In-memory store/ledger/gateway fakes shared by the scheduler tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::{AppError, AppResult, GatewayError};
use crate::gateway::{ChargeGateway, ChargeOutcome, ErrorClass};
use crate::ledger::models::{AttemptOutcome, ChargeAttempt};
use crate::ledger::repository::AttemptLedger;
use crate::pledges::models::{Cadence, Fund, Pledge, PledgeStatus};
use crate::pledges::store::PledgeStore;

fn infra_down() -> AppError {
    AppError::Database(sqlx::Error::PoolClosed)
}

#[derive(Default)]
pub struct MemoryPledgeStore {
    pledges: Mutex<HashMap<Uuid, Pledge>>,
    funds: Mutex<HashMap<Uuid, Fund>>,
    pub fail: AtomicBool,
}

impl MemoryPledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fund(&self, fund: Fund) {
        self.funds.lock().insert(fund.id, fund);
    }

    pub fn put(&self, pledge: Pledge) {
        self.pledges.lock().insert(pledge.id, pledge);
    }

    pub fn snapshot(&self, id: Uuid) -> Pledge {
        self.pledges.lock().get(&id).cloned().expect("pledge exists")
    }

    fn check_up(&self) -> AppResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            Err(infra_down())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PledgeStore for MemoryPledgeStore {
    async fn get_pledge(&self, id: Uuid) -> AppResult<Option<Pledge>> {
        self.check_up()?;
        Ok(self.pledges.lock().get(&id).cloned())
    }

    async fn insert_pledge(&self, pledge: &Pledge) -> AppResult<()> {
        self.check_up()?;
        self.pledges.lock().insert(pledge.id, pledge.clone());
        Ok(())
    }

    async fn compare_and_update_pledge(
        &self,
        id: Uuid,
        expected_version: i64,
        new_state: &Pledge,
    ) -> AppResult<Option<Pledge>> {
        self.check_up()?;
        let mut pledges = self.pledges.lock();
        match pledges.get_mut(&id) {
            Some(current) if current.version == expected_version => {
                let mut updated = new_state.clone();
                updated.version = expected_version + 1;
                *current = updated.clone();
                Ok(Some(updated))
            }
            _ => Ok(None),
        }
    }

    async fn list_due_pledges(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Pledge>> {
        self.check_up()?;
        let mut due: Vec<Pledge> = self
            .pledges
            .lock()
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_charge_at.cmp(&b.next_charge_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn list_failed_pledges(&self, tenant_id: Uuid) -> AppResult<Vec<Pledge>> {
        self.check_up()?;
        let mut failed: Vec<Pledge> = self
            .pledges
            .lock()
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.status == PledgeStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by(|a, b| a.next_charge_at.cmp(&b.next_charge_at).then(a.id.cmp(&b.id)));
        Ok(failed)
    }

    async fn get_fund(&self, id: Uuid) -> AppResult<Option<Fund>> {
        self.check_up()?;
        Ok(self.funds.lock().get(&id).cloned())
    }

    async fn list_chargeable_tenants(&self) -> AppResult<Vec<Uuid>> {
        self.check_up()?;
        let mut tenants: Vec<Uuid> = self
            .pledges
            .lock()
            .values()
            .filter(|p| p.is_chargeable())
            .map(|p| p.tenant_id)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    attempts: Mutex<Vec<ChargeAttempt>>,
    pub fail: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_count(&self, pledge_id: Uuid) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.pledge_id == pledge_id && a.outcome == AttemptOutcome::Success)
            .count()
    }

    pub fn attempt_count(&self, pledge_id: Uuid) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.pledge_id == pledge_id)
            .count()
    }
}

#[async_trait]
impl AttemptLedger for MemoryLedger {
    async fn append_attempt(&self, attempt: &ChargeAttempt) -> AppResult<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(infra_down());
        }
        self.attempts.lock().push(attempt.clone());
        Ok(())
    }

    async fn has_success_for_period(
        &self,
        pledge_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> AppResult<bool> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(infra_down());
        }
        Ok(self.attempts.lock().iter().any(|a| {
            a.pledge_id == pledge_id
                && a.period_start == period_start
                && a.outcome == AttemptOutcome::Success
        }))
    }

    async fn list_attempts(&self, pledge_id: Uuid) -> AppResult<Vec<ChargeAttempt>> {
        Ok(self
            .attempts
            .lock()
            .iter()
            .filter(|a| a.pledge_id == pledge_id)
            .cloned()
            .collect())
    }
}

/// Gateway fake: scripted outcomes consumed in order, approving once the
/// script runs out. Counts calls so tests can assert no double-charge.
pub struct MockGateway {
    script: Mutex<VecDeque<ChargeOutcome>>,
    calls: AtomicUsize,
    delay_ms: u64,
    /// When set, every call fails at the transport level instead of returning
    /// an outcome
    pub unreachable: AtomicBool,
}

impl MockGateway {
    pub fn approving() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn scripted(outcomes: Vec<ChargeOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            unreachable: AtomicBool::new(false),
        }
    }

    /// Keep the gateway call in flight long enough for races to overlap
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn transient(detail: &str) -> ChargeOutcome {
        ChargeOutcome::Declined {
            class: ErrorClass::Transient,
            detail: detail.to_string(),
        }
    }

    pub fn permanent(detail: &str) -> ChargeOutcome {
        ChargeOutcome::Declined {
            class: ErrorClass::Permanent,
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl ChargeGateway for MockGateway {
    async fn attempt_charge(
        &self,
        _pledge_id: Uuid,
        _amount: Decimal,
        _currency: &str,
    ) -> AppResult<ChargeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(AppError::Gateway(GatewayError::Unavailable(
                "connection refused".to_string(),
            )));
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or(ChargeOutcome::Approved {
            reference: format!("ref-{}", self.calls()),
        }))
    }
}

pub fn fund(tenant_id: Uuid) -> Fund {
    Fund {
        id: Uuid::new_v4(),
        tenant_id,
        name: "general".to_string(),
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn pledge(tenant_id: Uuid, fund_id: Uuid, next_charge_at: DateTime<Utc>) -> Pledge {
    Pledge {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        tenant_id,
        fund_id,
        amount: dec!(50),
        currency: "USD".to_string(),
        cadence: Cadence::Monthly,
        next_charge_at,
        status: PledgeStatus::Active,
        paused_at: None,
        consecutive_failures: 0,
        last_attempt_at: None,
        version: 0,
        created_at: next_charge_at,
        updated_at: next_charge_at,
    }
}
