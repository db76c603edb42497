use kube::{Api, Client};
use std::time::Duration;

/// Liveness/readiness probe: round-trip a request against the Kubernetes
/// API server so `/healthz` reflects actual connectivity, not just process
/// uptime.
///
/// # Errors
///
/// Returns `Err` if the API server does not respond within `timeout`.
pub async fn check_api_server(client: &Client, timeout: Duration) -> anyhow::Result<()> {
    let api: Api<k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition> =
        Api::all(client.clone());
    tokio::time::timeout(timeout, api.list(&Default::default())).await??;
    Ok(())
}
