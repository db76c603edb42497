use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::ResourceExt;
use tracing::warn;

use crd_api::v1alpha1::{BackupFrom, Resource};

use crate::client::ClusterClient;

/// Errors raised while resolving a `backupFrom` reference to live pods.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("backupFrom.resource {0:?} has no pod-discovery implementation (spec open question)")]
    UnimplementedResource(Resource),
}

/// Unique PVC names carried by a set of resolved pods, alongside the pods
/// themselves (spec.md §4.1).
pub(crate) struct ResolvedWorkload {
    pub(crate) pods: Vec<Pod>,
    pub(crate) pvc_names: BTreeSet<String>,
}

/// Resolves a `Backup.spec.backupFrom` reference into the live pods it names
/// and the distinct PVCs those pods mount.
pub(crate) struct WorkloadResolver<'a> {
    client: &'a ClusterClient,
    namespace: &'a str,
}

impl<'a> WorkloadResolver<'a> {
    pub(crate) fn new(client: &'a ClusterClient, namespace: &'a str) -> Self {
        Self { client, namespace }
    }

    /// Resolve `backup_from` (spec.md §4.1). Returns an empty, successful
    /// result when the named target does not exist — absence is not an error.
    pub(crate) async fn resolve(&self, backup_from: &BackupFrom) -> Result<ResolvedWorkload, Error> {
        let pods = match backup_from.resource {
            Resource::Pod => self.resolve_pod(&backup_from.name).await?,
            Resource::Deployment => self.resolve_deployment(&backup_from.name).await?,
            Resource::StatefulSet => self.resolve_stateful_set(&backup_from.name).await?,
            Resource::DaemonSet => self.resolve_daemon_set(&backup_from.name).await?,
            Resource::PersistentVolume | Resource::PersistentVolumeClaim => {
                return Err(Error::UnimplementedResource(backup_from.resource));
            }
        };
        if pods.is_empty() {
            warn!(
                namespace = self.namespace,
                name = backup_from.name.as_str(),
                "backupFrom target has no matching pods, pass is a no-op"
            );
        }
        let pvc_names = pvc_names_of(&pods);
        Ok(ResolvedWorkload { pods, pvc_names })
    }

    async fn resolve_pod(&self, name: &str) -> Result<Vec<Pod>, Error> {
        match self.client.pods(self.namespace).get_opt(name).await? {
            Some(pod) => Ok(vec![pod]),
            None => Ok(Vec::new()),
        }
    }

    async fn resolve_deployment(&self, name: &str) -> Result<Vec<Pod>, Error> {
        let Some(deployment) = self.client.deployments(self.namespace).get_opt(name).await? else {
            return Ok(Vec::new());
        };
        let Some(selector) = deployment.spec.and_then(|s| s.selector.match_labels) else {
            return Ok(Vec::new());
        };
        let replica_sets = self
            .client
            .replica_sets(self.namespace)
            .list(&ListParams::default().labels(&label_selector_string(&selector)))
            .await?;
        let rs_names: BTreeSet<String> = replica_sets.items.iter().map(ReplicaSet::name_any).collect();
        let pods = self
            .client
            .pods(self.namespace)
            .list(&ListParams::default().labels(&label_selector_string(&selector)))
            .await?;
        Ok(pods
            .items
            .into_iter()
            .filter(|pod| owned_by_any(pod, &rs_names))
            .collect())
    }

    async fn resolve_stateful_set(&self, name: &str) -> Result<Vec<Pod>, Error> {
        let Some(sts) = self.client.stateful_sets(self.namespace).get_opt(name).await? else {
            return Ok(Vec::new());
        };
        self.pods_by_selector(sts.spec.map(|s| s.selector.match_labels.unwrap_or_default()))
            .await
    }

    async fn resolve_daemon_set(&self, name: &str) -> Result<Vec<Pod>, Error> {
        let Some(ds) = self.client.daemon_sets(self.namespace).get_opt(name).await? else {
            return Ok(Vec::new());
        };
        self.pods_by_selector(ds.spec.map(|s| s.selector.match_labels.unwrap_or_default()))
            .await
    }

    async fn pods_by_selector(
        &self,
        match_labels: Option<std::collections::BTreeMap<String, String>>,
    ) -> Result<Vec<Pod>, Error> {
        let Some(labels) = match_labels.filter(|l| !l.is_empty()) else {
            return Ok(Vec::new());
        };
        let pods = self
            .client
            .pods(self.namespace)
            .list(&ListParams::default().labels(&label_selector_string(&labels)))
            .await?;
        Ok(pods.items)
    }
}

fn label_selector_string(labels: &std::collections::BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn owned_by_any(pod: &Pod, owner_names: &BTreeSet<String>) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|o| owner_names.contains(&o.name)))
}

/// Collect the distinct PVC names referenced by a pod set's volumes.
fn pvc_names_of(pods: &[Pod]) -> BTreeSet<String> {
    pods.iter()
        .filter_map(|pod| pod.spec.as_ref())
        .flat_map(|spec| spec.volumes.iter().flatten())
        .filter_map(|volume| volume.persistent_volume_claim.as_ref())
        .map(|claim| claim.claim_name.clone())
        .collect()
}

#[cfg(test)]
mod test {
    use super::pvc_names_of;
    use k8s_openapi::api::core::v1::{
        PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume,
    };

    fn pod_with_pvc(name: &str) -> Pod {
        Pod {
            spec: Some(PodSpec {
                volumes: Some(vec![Volume {
                    name: "data".to_owned(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: name.to_owned(),
                        read_only: None,
                    }),
                    ..Volume::default()
                }]),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn dedups_pvcs_shared_across_pods() {
        let pods = vec![pod_with_pvc("shared"), pod_with_pvc("shared"), pod_with_pvc("data-0")];
        let names = pvc_names_of(&pods);
        assert_eq!(names.len(), 2);
        assert!(names.contains("shared"));
        assert!(names.contains("data-0"));
    }
}
