use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::executor::ChargeExecutor;
use super::retry::{select_retryable, RetryPolicy};
use super::AttemptResult;
use crate::error::AppResult;
use crate::pledges::models::Pledge;
use crate::pledges::store::PledgeStore;

/// Orchestration entry point: composes selection and execution into a batch
/// and returns per-pledge results.
///
/// Safe to invoke concurrently and repeatedly for the same tenant; the
/// executor's claim/ledger guards make the second invocation a batch of
/// skips, never a second charge.
pub struct SchedulerDriver {
    store: Arc<dyn PledgeStore>,
    executor: Arc<ChargeExecutor>,
    retry_policy: RetryPolicy,
    max_concurrent: usize,
    shutdown: Arc<AtomicBool>,
}

impl SchedulerDriver {
    pub fn new(
        store: Arc<dyn PledgeStore>,
        executor: Arc<ChargeExecutor>,
        retry_policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            executor,
            retry_policy,
            max_concurrent: max_concurrent.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked before each pledge is dispatched; already-dispatched
    /// attempts always run to completion and are recorded.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    #[instrument(skip(self))]
    pub async fn process_due_pledges(&self, tenant_id: Uuid) -> AppResult<Vec<AttemptResult>> {
        self.process_due_pledges_at(tenant_id, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn retry_failed_pledges(&self, tenant_id: Uuid) -> AppResult<Vec<AttemptResult>> {
        self.retry_failed_pledges_at(tenant_id, Utc::now()).await
    }

    /// Due path with an explicit batch timestamp (one snapshot per run)
    pub async fn process_due_pledges_at(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<AttemptResult>> {
        // A selector failure is the one thing that aborts the whole call
        let batch = self.store.list_due_pledges(tenant_id, now).await?;
        self.run_batch(tenant_id, "due", batch, now).await
    }

    /// Retry path: failed pledges whose backoff window has elapsed
    pub async fn retry_failed_pledges_at(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<AttemptResult>> {
        let failed = self.store.list_failed_pledges(tenant_id).await?;
        let batch = select_retryable(&self.retry_policy, failed, now);
        self.run_batch(tenant_id, "retry", batch, now).await
    }

    async fn run_batch(
        &self,
        tenant_id: Uuid,
        kind: &str,
        batch: Vec<Pledge>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<AttemptResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        info!(%tenant_id, kind, count = batch.len(), "processing charge batch");

        // Bounded parallelism; `buffered` keeps results in selection order
        let results: Vec<AttemptResult> = stream::iter(batch)
            .map(|pledge| {
                let executor = self.executor.clone();
                let shutdown = self.shutdown.clone();
                async move {
                    if shutdown.load(Ordering::Relaxed) {
                        // Batch cancellation stops submitting new pledges;
                        // they stay due and are picked up by the next run
                        return None;
                    }
                    Some(executor.execute_charge(&pledge, now).await)
                }
            })
            .buffered(self.max_concurrent)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        let charged = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.is_skip()).count();
        let failed = results.len() - charged - skipped;
        info!(%tenant_id, kind, charged, skipped, failed, "charge batch completed");

        Ok(results)
    }
}
