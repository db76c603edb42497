use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, HostPathVolumeSource, PodSpec, PodTemplateSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use tracing::{debug, warn};

use operator_api::consts::{FINDPVDIR_RETRIES, FINDPVDIR_RETRY_INTERVAL, KUBELET_DIR};
use operator_api::{PvMeta, VolumeSource};

use crate::client::{backup_labels, ClusterClient};
use crate::consts::{WORKER_CONTAINER_NAME, WORKER_IMAGE};

/// Errors raised while discovering a PVC's on-node data directory.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Client(#[from] crate::client::Error),
    #[error(transparent)]
    Exec(#[from] operator_api::ExecError),
    #[error("PVC {0} is not bound to a PersistentVolume")]
    Unbound(String),
}

/// Finds the on-node directory backing a bound `PersistentVolumeClaim`
/// (spec.md §4.2, "Volume Locator").
pub(crate) struct VolumeLocator<'a> {
    client: &'a ClusterClient,
    operator_namespace: &'a str,
}

impl<'a> VolumeLocator<'a> {
    pub(crate) fn new(client: &'a ClusterClient, operator_namespace: &'a str) -> Self {
        Self { client, operator_namespace }
    }

    /// Resolve `pvdir` for one PVC. Returns `Ok(None)` when the directory
    /// could not be discovered after retries — the caller skips the PVC
    /// with a warning rather than failing the whole pass (spec.md §4.2).
    pub(crate) async fn locate(
        &self,
        backup_name: &str,
        namespace: &str,
        pvc_name: &str,
        node_name: &str,
        pod_name: &str,
        pod_uid: &str,
    ) -> Result<Option<PvMeta>, Error> {
        let pvc = self
            .client
            .pvcs(namespace)
            .get(pvc_name)
            .await?;
        let pv_name = pvc
            .spec
            .as_ref()
            .and_then(|s| s.volume_name.clone())
            .ok_or_else(|| Error::Unbound(pvc_name.to_owned()))?;
        let pv = self.client.pvs().get(&pv_name).await?;
        let source = pv
            .spec
            .as_ref()
            .map(VolumeSource::from_pv_spec)
            .unwrap_or(VolumeSource::Other("unknown".to_owned()));

        let pvdir = if source.is_direct_path() {
            direct_path(&source, &pv)
        } else {
            self.findpvdir(backup_name, node_name, pod_uid, &source).await?
        };

        let Some(pvdir) = pvdir else {
            warn!(pvc = pvc_name, "findpvdir returned no path after retries, skipping PVC");
            return Ok(None);
        };

        Ok(Some(PvMeta {
            volume_source: source,
            node_name: node_name.to_owned(),
            pod_name: pod_name.to_owned(),
            pod_uid: pod_uid.to_owned(),
            pvdir,
            pvname: pv_name,
        }))
    }

    /// Ensure the `findpvdir-<backupName>-<nodeName>` helper Deployment
    /// exists, wait for it, then exec `findpvdir` inside it, retrying up to
    /// `FINDPVDIR_RETRIES` times on blank stdout (spec.md §4.2 points 2-3).
    async fn findpvdir(
        &self,
        backup_name: &str,
        node_name: &str,
        pod_uid: &str,
        source: &VolumeSource,
    ) -> Result<Option<String>, Error> {
        let name = format!("findpvdir-{backup_name}-{node_name}");
        let deployment = locator_deployment(&name, node_name);
        let _applied = self
            .client
            .apply_deployment(self.operator_namespace, &name, &deployment)
            .await?;
        let pod = self.client.wait_ready_pod(self.operator_namespace, &name).await?;

        for attempt in 0..FINDPVDIR_RETRIES {
            let command = vec![
                "findpvdir".to_owned(),
                "--pod-uid".to_owned(),
                pod_uid.to_owned(),
                "--storage-type".to_owned(),
                source.as_str().to_owned(),
            ];
            let (output, ok) = self
                .client
                .exec(self.operator_namespace, &pod.name_any(), WORKER_CONTAINER_NAME, &command)
                .await?;
            let trimmed = output.stdout.lines().next().unwrap_or_default().trim();
            if ok && !trimmed.is_empty() {
                return Ok(Some(trimmed.to_owned()));
            }
            debug!(attempt, pvdir_helper = %name, "findpvdir returned blank stdout, retrying");
            tokio::time::sleep(FINDPVDIR_RETRY_INTERVAL).await;
        }
        Ok(None)
    }
}

/// `hostPath`/`local` sources skip the helper entirely (spec.md §4.2 point 1).
fn direct_path(source: &VolumeSource, pv: &k8s_openapi::api::core::v1::PersistentVolume) -> Option<String> {
    let spec = pv.spec.as_ref()?;
    match source {
        VolumeSource::HostPath => spec.host_path.as_ref().map(|h| h.path.clone()),
        VolumeSource::Local => spec.local.as_ref().map(|l| l.path.clone()),
        _ => None,
    }
}

fn locator_deployment(name: &str, node_name: &str) -> Deployment {
    let labels = backup_labels(&[
        ("app.kubernetes.io/instance", name),
        (operator_api::consts::LABEL_MANAGED_BY, operator_api::consts::LABEL_MANAGED_BY_VALUE),
    ]);
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta { labels: Some(labels), ..ObjectMeta::default() }),
                spec: Some(PodSpec {
                    node_name: Some(node_name.to_owned()),
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_owned()),
                        ..Toleration::default()
                    }]),
                    containers: vec![Container {
                        name: WORKER_CONTAINER_NAME.to_owned(),
                        image: Some(WORKER_IMAGE.to_owned()),
                        command: Some(vec!["tail".to_owned(), "-F".to_owned(), "/dev/null".to_owned()]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "kubelet-dir".to_owned(),
                            mount_path: KUBELET_DIR.to_owned(),
                            read_only: Some(true),
                            ..VolumeMount::default()
                        }]),
                        ..Container::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "kubelet-dir".to_owned(),
                        host_path: Some(HostPathVolumeSource {
                            path: KUBELET_DIR.to_owned(),
                            ..HostPathVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}
