use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, HostPathVolumeSource, Pod, PodSpec, PodTemplateSpec, Toleration, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use operator_api::consts::{ANNOTATION_UPDATED_TIME, HOST_ROOT_MOUNT_PATH};
use operator_api::target::{BackupTarget, Credentials};

use crate::client::{backup_labels, ClusterClient};
use crate::consts::{
    ENV_AWS_ACCESS_KEY_ID, ENV_AWS_SECRET_ACCESS_KEY, ENV_RESTIC_PASSWORD, ENV_RESTIC_REPOSITORY,
    LABEL_BACKUP_NAME, LABEL_NODE_NAME, LABEL_TARGET_KIND, WORKER_CONTAINER_NAME, WORKER_IMAGE,
};

/// Errors raised while ensuring a worker Deployment exists and is ready.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error(transparent)]
    Client(#[from] crate::client::Error),
}

/// Creates/updates per-node, per-target worker Deployments and returns a
/// running pod handle (spec.md §4.4, "Worker Pod Manager").
pub(crate) struct WorkerPodManager<'a> {
    client: &'a ClusterClient,
    operator_namespace: &'a str,
}

impl<'a> WorkerPodManager<'a> {
    pub(crate) fn new(client: &'a ClusterClient, operator_namespace: &'a str) -> Self {
        Self { client, operator_namespace }
    }

    /// `ensureWorker(target, backupObj, meta) -> runningPod`.
    pub(crate) async fn ensure_worker(
        &self,
        backup_name: &str,
        node_name: &str,
        target: &BackupTarget,
        repo_uri: &str,
        timezone: Option<&str>,
        creds: &Credentials,
        extra_env: &[EnvVar],
    ) -> Result<Pod, Error> {
        let name = worker_deployment_name(target.kind(), node_name, backup_name);
        let deployment = worker_deployment(&name, node_name, backup_name, target, repo_uri, timezone, creds, extra_env);
        let _applied = self
            .client
            .apply_deployment(self.operator_namespace, &name, &deployment)
            .await?;
        Ok(self.client.wait_ready_pod(self.operator_namespace, &name).await?)
    }
}

/// `<role>-<nodeName>-<backupName>` (spec.md §4.4, §9 naming decision).
fn worker_deployment_name(role: &str, node_name: &str, backup_name: &str) -> String {
    format!("{role}-{node_name}-{backup_name}")
}

fn worker_deployment(
    name: &str,
    node_name: &str,
    backup_name: &str,
    target: &BackupTarget,
    repo_uri: &str,
    timezone: Option<&str>,
    creds: &Credentials,
    extra_env: &[EnvVar],
) -> Deployment {
    let labels = backup_labels(&[
        ("app.kubernetes.io/instance", name),
        (operator_api::consts::LABEL_MANAGED_BY, operator_api::consts::LABEL_MANAGED_BY_VALUE),
        (LABEL_NODE_NAME, node_name),
        (LABEL_TARGET_KIND, target.kind()),
        (LABEL_BACKUP_NAME, backup_name),
    ]);
    let mut env = vec![
        EnvVar { name: ENV_RESTIC_REPOSITORY.to_owned(), value: Some(repo_uri.to_owned()), ..EnvVar::default() },
    ];
    if let Some(password) = &creds.restic_password {
        env.push(EnvVar { name: ENV_RESTIC_PASSWORD.to_owned(), value: Some(password.clone()), ..EnvVar::default() });
    }
    if let Some(tz) = timezone {
        env.push(EnvVar { name: "TZ".to_owned(), value: Some(tz.to_owned()), ..EnvVar::default() });
    }
    if matches!(target, BackupTarget::Minio(_) | BackupTarget::S3(_)) {
        if let Some(access_key) = &creds.access_key {
            env.push(EnvVar { name: "MINIO_ACCESS_KEY".to_owned(), value: Some(access_key.clone()), ..EnvVar::default() });
            env.push(EnvVar { name: ENV_AWS_ACCESS_KEY_ID.to_owned(), value: Some(access_key.clone()), ..EnvVar::default() });
        }
        if let Some(secret_key) = &creds.secret_key {
            env.push(EnvVar { name: "MINIO_SECRET_KEY".to_owned(), value: Some(secret_key.clone()), ..EnvVar::default() });
            env.push(EnvVar { name: ENV_AWS_SECRET_ACCESS_KEY.to_owned(), value: Some(secret_key.clone()), ..EnvVar::default() });
        }
    }
    if matches!(target, BackupTarget::Sftp(_)) {
        if let Some(username) = &creds.username {
            env.push(EnvVar { name: "SFTP_USERNAME".to_owned(), value: Some(username.clone()), ..EnvVar::default() });
        }
        if let Some(password) = &creds.password {
            env.push(EnvVar { name: "SFTP_PASSWORD".to_owned(), value: Some(password.clone()), ..EnvVar::default() });
        }
    }
    for e in extra_env {
        env.push(EnvVar { name: e.name.clone(), value: e.value.clone(), ..EnvVar::default() });
    }

    let mut volume_mounts = vec![VolumeMount {
        name: "host-root".to_owned(),
        mount_path: HOST_ROOT_MOUNT_PATH.to_owned(),
        read_only: Some(true),
        ..VolumeMount::default()
    }];
    let mut volumes = vec![Volume {
        name: "host-root".to_owned(),
        host_path: Some(HostPathVolumeSource { path: "/".to_owned(), type_: None }),
        ..Volume::default()
    }];
    if let Some((mount, volume)) = target_backend_mount(target) {
        volume_mounts.push(mount);
        volumes.push(volume);
    }

    let mut template_annotations = std::collections::BTreeMap::new();
    let _prev = template_annotations.insert(
        ANNOTATION_UPDATED_TIME.to_owned(),
        humantime::format_rfc3339(std::time::SystemTime::now()).to_string(),
    );

    Deployment {
        metadata: ObjectMeta { name: Some(name.to_owned()), labels: Some(labels.clone()), ..ObjectMeta::default() },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector { match_labels: Some(labels.clone()), match_expressions: None },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(template_annotations),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    node_name: Some(node_name.to_owned()),
                    tolerations: Some(vec![Toleration { operator: Some("Exists".to_owned()), ..Toleration::default() }]),
                    containers: vec![Container {
                        name: WORKER_CONTAINER_NAME.to_owned(),
                        image: Some(WORKER_IMAGE.to_owned()),
                        command: Some(vec!["tail".to_owned(), "-F".to_owned(), "/dev/null".to_owned()]),
                        env: Some(env),
                        volume_mounts: Some(volume_mounts),
                        ..Container::default()
                    }],
                    volumes: Some(volumes),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// NFS/CephFS/PVC targets additionally mount their backend at the fixed
/// `/restic-repo` path the repository URI points restic at (spec.md §4.3).
fn target_backend_mount(target: &BackupTarget) -> Option<(VolumeMount, Volume)> {
    let mount = VolumeMount { name: "repo-backend".to_owned(), mount_path: "/restic-repo".to_owned(), ..VolumeMount::default() };
    match target {
        BackupTarget::Nfs(nfs) => Some((
            mount,
            Volume {
                name: "repo-backend".to_owned(),
                nfs: Some(k8s_openapi::api::core::v1::NFSVolumeSource {
                    server: nfs.server.clone(),
                    path: nfs.path.clone(),
                    read_only: Some(false),
                }),
                ..Volume::default()
            },
        )),
        BackupTarget::Pvc(pvc) => Some((
            mount,
            Volume {
                name: "repo-backend".to_owned(),
                persistent_volume_claim: Some(k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource {
                    claim_name: pvc.claim.name_any(),
                    read_only: None,
                }),
                ..Volume::default()
            },
        )),
        BackupTarget::CephFs(cephfs) => Some((
            mount,
            Volume {
                name: "repo-backend".to_owned(),
                cephfs: Some(k8s_openapi::api::core::v1::CephFSVolumeSource {
                    monitors: cephfs.monitors.clone(),
                    path: Some(cephfs.path.clone()),
                    ..k8s_openapi::api::core::v1::CephFSVolumeSource::default()
                }),
                ..Volume::default()
            },
        )),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::worker_deployment_name;

    #[test]
    fn name_is_deterministic_given_identical_inputs() {
        let a = worker_deployment_name("backup-to-nfs", "node-a", "web-backup");
        let b = worker_deployment_name("backup-to-nfs", "node-a", "web-backup");
        assert_eq!(a, b);
        assert_eq!(a, "backup-to-nfs-node-a-web-backup");
    }
}
