use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use super::driver::SchedulerDriver;
use crate::pledges::store::PledgeStore;

/// Background trigger: ticks on a fixed interval and runs the due and retry
/// batches for every tenant with chargeable pledges.
///
/// The manual admin endpoints invoke the same driver, so a tick racing a
/// manual run is safe by construction.
pub struct ChargeScheduler {
    tick_interval: Duration,
    driver: Arc<SchedulerDriver>,
    store: Arc<dyn PledgeStore>,
}

impl ChargeScheduler {
    pub fn new(
        tick_interval: Duration,
        driver: Arc<SchedulerDriver>,
        store: Arc<dyn PledgeStore>,
    ) -> Self {
        Self {
            tick_interval,
            driver,
            store,
        }
    }

    /// Start the scheduler loop (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let tick_interval = self.tick_interval;
        let driver = self.driver.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                Self::run_cycle(&driver, &store).await;
            }
        })
    }

    async fn run_cycle(driver: &Arc<SchedulerDriver>, store: &Arc<dyn PledgeStore>) {
        info!("starting scheduled charge cycle");

        let tenants = match store.list_chargeable_tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                // Failed scheduling run; surfaced here, retried next tick
                error!("could not list tenants for charge cycle: {:?}", e);
                return;
            }
        };

        for tenant_id in tenants {
            match driver.process_due_pledges(tenant_id).await {
                Ok(results) => {
                    if !results.is_empty() {
                        info!(%tenant_id, count = results.len(), "due batch processed");
                    }
                }
                Err(e) => error!(%tenant_id, "due batch failed: {:?}", e),
            }

            match driver.retry_failed_pledges(tenant_id).await {
                Ok(results) => {
                    if !results.is_empty() {
                        info!(%tenant_id, count = results.len(), "retry batch processed");
                    }
                }
                Err(e) => error!(%tenant_id, "retry batch failed: {:?}", e),
            }
        }

        info!("charge cycle completed");
    }
}
