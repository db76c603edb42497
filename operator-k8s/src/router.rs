use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use kube::Client;

use utils::health::check_api_server;

use crate::metrics::metrics;

/// Bound on how long `/healthz` waits on the API server round-trip.
const HEALTHZ_TIMEOUT: Duration = Duration::from_secs(5);

/// healthz handler: round-trips a request against the Kubernetes API server
/// so liveness reflects actual connectivity, not just process uptime.
async fn healthz(State(client): State<Client>) -> &'static str {
    match check_api_server(&client, HEALTHZ_TIMEOUT).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    }
}

/// Build the health/metrics HTTP server's router.
pub(crate) fn build(client: Client) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(client)
}
