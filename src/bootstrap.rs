use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    gateway::http::HttpChargeGateway,
    ledger::repository::PgAttemptLedger,
    pledges::postgres::PgPledgeStore,
    scheduler::{
        driver::SchedulerDriver, executor::ChargeExecutor, retry::RetryPolicy,
        timer::ChargeScheduler,
    },
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("initializing application components");

    let pool = initialize_database(&config.database_url).await?;

    let store: Arc<PgPledgeStore> = Arc::new(PgPledgeStore::new(pool.clone()));
    let ledger: Arc<PgAttemptLedger> = Arc::new(PgAttemptLedger::new(pool));

    let gateway = Arc::new(HttpChargeGateway::new(
        config.gateway_url.clone(),
        Duration::from_secs(config.gateway_timeout_secs),
    ));
    info!(
        "charge gateway adapter initialized: {} (timeout {}s)",
        config.gateway_url, config.gateway_timeout_secs
    );

    let executor = Arc::new(ChargeExecutor::new(
        store.clone(),
        ledger.clone(),
        gateway,
        config.max_consecutive_failures,
    ));

    let retry_policy = RetryPolicy::from_config(config);
    info!(
        "retry policy: base {}s, cap {}s, jitter {}",
        retry_policy.base_secs, retry_policy.max_secs, retry_policy.jitter
    );

    let driver = Arc::new(SchedulerDriver::new(
        store.clone(),
        executor,
        retry_policy,
        config.max_concurrent_charges,
    ));

    if config.scheduler_enabled {
        let scheduler = ChargeScheduler::new(
            Duration::from_secs(config.scheduler_tick_secs),
            driver.clone(),
            store.clone(),
        );
        scheduler.start();
        info!(
            "background charge scheduler started (every {}s)",
            config.scheduler_tick_secs
        );
    } else {
        info!("background charge scheduler disabled; manual triggers only");
    }

    Ok(AppState {
        store,
        ledger,
        driver,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("database initialized");
    Ok(pool)
}
