/// The `v1alpha1` Backup CRD and its installation/migration helpers.
pub mod v1alpha1;

pub use v1alpha1::{Backup, BackupSpec, BackupStatus};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::runtime::wait::{await_condition, conditions};
use kube::Api;
use std::time::Duration;

/// How long to wait for a freshly applied CRD to reach the `Established` condition.
const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(20);

/// Wait for a CRD to become established, bounded by [`CRD_ESTABLISH_TIMEOUT`].
///
/// # Errors
///
/// Returns `Err` if the CRD does not establish before the timeout, or if the
/// underlying watch fails.
pub async fn wait_crd_established(
    crd_api: Api<CustomResourceDefinition>,
    name: &str,
) -> anyhow::Result<()> {
    let establish = await_condition(crd_api, name, conditions::is_crd_established());
    let _crd = tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, establish).await??;
    Ok(())
}
