use std::sync::Arc;

use anyhow::Result;
use futures::future::FutureExt;
use futures::StreamExt;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tracing::{info, warn};

use crd_api::v1alpha1::{set_up, Backup};

use crate::client::ClusterClient;
use crate::config::{Config, Namespace};
use crate::consts::DEFAULT_REQUEUE_DURATION;
use crate::controller::{map_cluster_role_binding, on_error, reconcile, Context};
use crate::{config, metrics, router};

/// `horus-operator`: watches `Backup` custom resources and drives the
/// Workload Resolver → Volume Locator → Storage Router → Worker Pod
/// Manager → Backup Driver pipeline on their behalf (spec.md §1, §4).
#[derive(Debug)]
pub struct Operator {
    config: Config,
}

impl Operator {
    #[inline]
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the operator until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the Kubernetes client cannot be built, if the CRD
    /// cannot be installed/migrated, or if the health/metrics server fails.
    #[inline]
    pub async fn run(&self) -> Result<()> {
        metrics::init();

        let kube_client: Client = Client::try_default().await?;
        set_up(&kube_client, self.config.create_crd, self.config.auto_migration).await?;

        let operator_namespace = config::resolve_operator_namespace();
        info!(operator_namespace, "starting horus-operator");

        let backup_api: Api<Backup> = match self.config.namespace {
            Namespace::Single(ref namespace) => Api::namespaced(kube_client.clone(), namespace),
            Namespace::ClusterWide => Api::all(kube_client.clone()),
        };
        let crb_api: Api<ClusterRoleBinding> = Api::all(kube_client.clone());
        let health_client = kube_client.clone();

        let cx = Arc::new(Context {
            client: ClusterClient::new(kube_client),
            operator_namespace,
            requeue_duration: DEFAULT_REQUEUE_DURATION,
        });

        let controller = Controller::new(backup_api, WatcherConfig::default())
            .watches(crb_api, WatcherConfig::default(), map_cluster_role_binding)
            .shutdown_on_signal()
            .run(reconcile, on_error, cx)
            .for_each(|res| async move {
                if let Err(err) = res {
                    warn!(error = %err, "reconcile stream yielded an error");
                }
            });

        let web_server = axum::Server::bind(&self.config.listen_addr.parse()?)
            .serve(router::build(health_client).into_make_service())
            .with_graceful_shutdown(tokio::signal::ctrl_c().map(|_| ()));

        tokio::select! {
            () = controller => info!("controller stream ended"),
            res = web_server => res?,
        }
        Ok(())
    }
}
