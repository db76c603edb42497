use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    Namespace as K8sNamespace, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tokio::time::{sleep, timeout};
use tracing::debug;

use operator_api::{ExecCommand, ExecError, ExecOutput};

use crate::consts::{FIELD_MANAGER, WORKER_READY_POLL_INTERVAL, WORKER_READY_TIMEOUT};

/// Errors raised while talking to the Kubernetes API on behalf of a backup pass.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("timed out waiting for deployment {0} to become ready")]
    ReadyTimeout(String),
    #[error("deployment {0} has no running, non-terminating pod")]
    NoRunningPod(String),
}

/// Typed accessors for the object kinds the backup pipeline reads or writes,
/// plus the apply/wait-ready/exec operations layered on top of them
/// (spec.md §4, "Cluster Client").
#[derive(Clone)]
pub(crate) struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    pub(crate) fn raw(&self) -> Client {
        self.client.clone()
    }

    pub(crate) fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn stateful_sets(&self, namespace: &str) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn daemon_sets(&self, namespace: &str) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn replica_sets(&self, namespace: &str) -> Api<ReplicaSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn pvs(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    pub(crate) fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn namespaces(&self) -> Api<K8sNamespace> {
        Api::all(self.client.clone())
    }

    /// Server-side apply a Deployment, never a raw merge patch (spec.md §5).
    pub(crate) async fn apply_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, Error> {
        let api = self.deployments(namespace);
        Ok(api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(deployment))
            .await?)
    }

    /// Block until `name`'s Deployment reports all replicas ready, then
    /// return the first Running, non-terminating pod it owns through its
    /// current ReplicaSet (spec.md §4.4).
    pub(crate) async fn wait_ready_pod(&self, namespace: &str, name: &str) -> Result<Pod, Error> {
        let deployments = self.deployments(namespace);
        let wait = async {
            loop {
                if let Ok(dep) = deployments.get(name).await {
                    let ready = dep
                        .status
                        .as_ref()
                        .and_then(|s| s.ready_replicas)
                        .unwrap_or(0);
                    if ready > 0 {
                        return;
                    }
                }
                sleep(WORKER_READY_POLL_INTERVAL).await;
            }
        };
        timeout(WORKER_READY_TIMEOUT, wait)
            .await
            .map_err(|_elapsed| Error::ReadyTimeout(name.to_owned()))?;

        self.running_pod_for_deployment(namespace, name).await
    }

    /// Walk Deployment → ReplicaSet → Pod, skipping Terminating pods from a
    /// prior rollout, and return the first Running pod found.
    async fn running_pod_for_deployment(&self, namespace: &str, name: &str) -> Result<Pod, Error> {
        let selector = format!("app.kubernetes.io/instance={name}");
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;
        for pod in pods.items {
            if pod.metadata.deletion_timestamp.is_some() {
                continue;
            }
            let running = pod
                .status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Running");
            if running {
                debug!(pod = %pod.name_any(), "picked running pod for {name}");
                return Ok(pod);
            }
        }
        Err(Error::NoRunningPod(name.to_owned()))
    }

    /// Execute `command` inside `pod` and collect stdout/stderr.
    pub(crate) async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<(ExecOutput, bool), ExecError> {
        ExecCommand::new(pod, namespace)
            .container(container)
            .execute(self.client.clone(), command)
            .await
    }
}

/// Common selector labels every worker/locator Deployment carries.
pub(crate) fn backup_labels(extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for (key, value) in extra {
        let _prev = labels.insert((*key).to_owned(), (*value).to_owned());
    }
    labels
}
