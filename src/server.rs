use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    cancel_pledge, create_pledge, get_pledge, health_check, list_pledge_attempts, pause_pledge,
    process_due_pledges, resume_pledge, retry_failed_pledges, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("setting up HTTP routes");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Pledge lifecycle
                .route("/pledges", post(create_pledge))
                .route("/pledges/:id", get(get_pledge))
                .route("/pledges/:id/attempts", get(list_pledge_attempts))
                .route("/pledges/:id/pause", post(pause_pledge))
                .route("/pledges/:id/resume", post(resume_pledge))
                .route("/pledges/:id/cancel", post(cancel_pledge))
                // Scheduler triggers (caller must be tenant-admin authorized
                // upstream)
                .route("/scheduler/:tenant_id/process", post(process_due_pledges))
                .route("/scheduler/:tenant_id/retry", post(retry_failed_pledges)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
