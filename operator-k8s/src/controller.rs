use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::reflector::ObjectRef;
use kube::{Api, ResourceExt};
use tracing::{error, info, info_span, warn, Instrument};

use crd_api::v1alpha1::{Backup, BackupStatus, Condition, Resource, FINALIZER};
use operator_api::consts::{LABEL_OWNER_NAME, LABEL_OWNER_NAMESPACE};
use operator_api::{parse_timeout, targets_of};

use crate::backup::BackupDriver;
use crate::client::ClusterClient;
use crate::consts::FIELD_MANAGER;
use crate::locator::VolumeLocator;
use crate::metrics::RECONCILE_FAILED_COUNT;
use crate::rbac;
use crate::resolver::WorkloadResolver;
use crate::storage::StorageRouter;
use crate::worker::WorkerPodManager;
use crate::{credentials, resolver};

/// Shared, per-reconcile-loop state handed to every invocation
/// (spec.md §9, "Global mutable state" — a context value, not process-wide handles).
pub(crate) struct Context {
    pub(crate) client: ClusterClient,
    pub(crate) operator_namespace: String,
    pub(crate) requeue_duration: Duration,
}

/// Errors raised while running one backup pass, prior to the finalizer
/// wrapper (spec.md §7 taxonomy, excluding the Config class which is
/// resolved inline into a status condition rather than propagated).
#[derive(thiserror::Error, Debug)]
pub(crate) enum PassError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Resolver(#[from] resolver::Error),
    #[error(transparent)]
    Locator(#[from] crate::locator::Error),
    #[error(transparent)]
    Worker(#[from] crate::worker::Error),
    #[error(transparent)]
    Backup(#[from] crate::backup::Error),
    #[error(transparent)]
    Rbac(#[from] rbac::Error),
}

/// Top-level reconcile error, wrapping the finalizer harness's own failure
/// modes (add/remove finalizer, or the apply/cleanup closure itself).
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error(transparent)]
    Finalizer(#[from] kube::runtime::finalizer::Error<PassError>),
}

/// The reconciliation entrypoint handed to `kube::runtime::Controller`
/// (spec.md §4.7, "Reconciler Glue").
pub(crate) async fn reconcile(backup: Arc<Backup>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = backup.namespace().unwrap_or_default();
    let name = backup.name_any();
    let span = info_span!("reconcile", namespace = %namespace, backup = %name);

    async move {
        let api: Api<Backup> = Api::namespaced(ctx.client.raw(), &namespace);
        let action = finalizer(&api, FINALIZER, backup, |event| async {
            match event {
                FinalizerEvent::Apply(backup) => apply(&backup, &ctx).await,
                FinalizerEvent::Cleanup(backup) => cleanup(&backup, &ctx).await,
            }
        })
        .await?;
        Ok(action)
    }
    .instrument(span)
    .await
}

/// The reconciliation error-handling entrypoint (spec.md §7, "Transient API"
/// and "Repo init failure" classes requeue; repo locks requeue sooner).
#[allow(clippy::needless_pass_by_value)] // required by `Controller::run`'s signature
pub(crate) fn on_error(backup: Arc<Backup>, err: &Error, _ctx: Arc<Context>) -> Action {
    RECONCILE_FAILED_COUNT.with_label_values(&[reason_of(err)]).inc();
    error!(backup = %backup.name_any(), error = %err, "reconcile failed");
    if is_repository_locked(err) {
        Action::requeue(Duration::from_secs(15))
    } else {
        Action::requeue(Duration::from_secs(60))
    }
}

fn is_repository_locked(err: &Error) -> bool {
    matches!(
        err,
        Error::Finalizer(kube::runtime::finalizer::Error::ApplyFailed(PassError::Backup(
            crate::backup::Error::RepositoryLocked
        )))
    )
}

fn reason_of(err: &Error) -> &'static str {
    match err {
        Error::Finalizer(kube::runtime::finalizer::Error::ApplyFailed(PassError::Backup(
            crate::backup::Error::RepositoryLocked,
        ))) => "repository_locked",
        Error::Finalizer(kube::runtime::finalizer::Error::ApplyFailed(_)) => "apply_failed",
        Error::Finalizer(kube::runtime::finalizer::Error::CleanupFailed(_)) => "cleanup_failed",
        Error::Finalizer(_) => "finalizer",
    }
}

/// Maps a cluster-scoped `ClusterRoleBinding` this operator manages back to
/// the `Backup` that owns it, via the label pair set in [`rbac`]
/// (spec.md §9 "Cross-scope ownership"; SPEC_FULL §2 point 7).
pub(crate) fn map_cluster_role_binding(crb: ClusterRoleBinding) -> Option<ObjectRef<Backup>> {
    let labels = crb.metadata.labels?;
    let name = labels.get(LABEL_OWNER_NAME)?;
    let namespace = labels.get(LABEL_OWNER_NAMESPACE)?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Active state (spec.md §4.7): ensure the auxiliary RBAC/CronJob objects,
/// then run one full backup pass, then record status.
async fn apply(backup: &Arc<Backup>, ctx: &Arc<Context>) -> Result<Action, PassError> {
    let namespace = backup.namespace().unwrap_or_default();
    let name = backup.name_any();
    let generation = backup.meta().generation;

    if backup.status.as_ref().and_then(|s| s.observed_generation) == generation {
        return Ok(Action::requeue(ctx.requeue_duration));
    }

    ensure_aux_objects(backup, ctx, &namespace, &name).await?;

    let started = Instant::now();
    let outcome = run_backup_pass(backup, ctx, &namespace, &name).await;
    let elapsed = started.elapsed();
    info!(namespace = %namespace, backup = %name, elapsed = ?elapsed, "backup pass complete");

    match outcome {
        Ok(status) => {
            update_status(backup, ctx, &namespace, &name, status).await?;
            Ok(Action::requeue(ctx.requeue_duration))
        }
        Err(PassError::Backup(crate::backup::Error::RepositoryLocked)) => {
            Err(PassError::Backup(crate::backup::Error::RepositoryLocked))
        }
        Err(err) => Err(err),
    }
}

/// Terminating state (spec.md §4.7, §3): delete the cluster-scoped
/// `ClusterRoleBinding` before the finalizer helper removes the finalizer.
async fn cleanup(backup: &Arc<Backup>, ctx: &Arc<Context>) -> Result<Action, PassError> {
    let namespace = backup.namespace().unwrap_or_default();
    rbac::delete_cluster_role_binding(&ctx.client, &namespace).await?;
    Ok(Action::await_change())
}

async fn ensure_aux_objects(backup: &Backup, ctx: &Context, namespace: &str, name: &str) -> Result<(), PassError> {
    rbac::ensure_service_account(&ctx.client, namespace, name).await?;
    rbac::ensure_cluster_role(&ctx.client, namespace, name).await?;
    rbac::ensure_cluster_role_binding(&ctx.client, namespace, name).await?;
    rbac::ensure_cron_job(
        &ctx.client,
        namespace,
        name,
        name,
        &backup.spec.schedule,
        backup.spec.log_level.as_deref(),
        backup.spec.log_format.as_deref(),
        backup.spec.timezone.as_deref(),
        backup.spec.successful_jobs_history_limit,
        backup.spec.failed_jobs_history_limit,
    )
    .await?;
    Ok(())
}

/// Outcome of one full backup pass, folded into a status update.
struct PassOutcome {
    ready: bool,
    reason: &'static str,
    message: String,
    storage: Vec<String>,
    backed_up: bool,
    resource_type: String,
    resource_name: String,
}

/// Data-flow: Workload Resolver → Volume Locator → Storage Router → Worker
/// Pod Manager → Backup Driver, once per PVC × target (spec.md §2, §4).
async fn run_backup_pass(backup: &Backup, ctx: &Context, namespace: &str, name: &str) -> Result<PassOutcome, PassError> {
    let resource_type = resource_tag(backup.spec.backup_from.resource).to_owned();
    let resource_name = backup.spec.backup_from.name.clone();

    if backup.spec.backup_to.is_empty() {
        warn!(namespace, backup = name, "backupTo has no populated target, pass is a no-op");
        return Ok(PassOutcome {
            ready: false,
            reason: "EmptyBackupTo",
            message: "backupTo has no populated target".to_owned(),
            storage: Vec::new(),
            backed_up: false,
            resource_type,
            resource_name,
        });
    }

    let resolver = WorkloadResolver::new(&ctx.client, namespace);
    let resolved = match resolver.resolve(&backup.spec.backup_from).await {
        Ok(resolved) => resolved,
        Err(resolver::Error::UnimplementedResource(resource)) => {
            warn!(namespace, backup = name, ?resource, "backupFrom.resource has no pod-discovery implementation");
            return Ok(PassOutcome {
                ready: false,
                reason: "UnimplementedResourceKind",
                message: format!("backupFrom.resource {resource:?} is not implemented"),
                storage: Vec::new(),
                backed_up: false,
                resource_type,
                resource_name,
            });
        }
        Err(err) => return Err(err.into()),
    };

    if resolved.pods.is_empty() {
        return Ok(PassOutcome {
            ready: true,
            reason: "NoMatchingPods",
            message: format!("{resource_type}/{resource_name} has no matching pods"),
            storage: Vec::new(),
            backed_up: false,
            resource_type,
            resource_name,
        });
    }

    let creds = credentials::resolve(&ctx.client, &ctx.operator_namespace, &backup.spec.credential_name).await;
    let creds = match creds {
        Ok(creds) => creds,
        Err(err) => {
            warn!(namespace, backup = name, error = %err, "credential secret unavailable");
            return Ok(PassOutcome {
                ready: false,
                reason: "MissingCredentialSecret",
                message: err.to_string(),
                storage: Vec::new(),
                backed_up: false,
                resource_type,
                resource_name,
            });
        }
    };

    let representative_pods = representative_pods_by_pvc(&resolved.pods);
    let timeout = parse_timeout(backup.spec.timeout.as_deref()).unwrap_or(operator_api::consts::DEFAULT_BACKUP_TIMEOUT);
    let deadline = tokio::time::Instant::now() + timeout;
    let cluster_label = backup.spec.cluster.as_deref().unwrap_or(operator_api::consts::DEFAULT_CLUSTER_NAME);

    let locator = VolumeLocator::new(&ctx.client, &ctx.operator_namespace);
    let worker_mgr = WorkerPodManager::new(&ctx.client, &ctx.operator_namespace);
    let driver = BackupDriver::new(&ctx.client, &ctx.operator_namespace);

    let mut storage = Vec::new();
    let mut any_success = false;
    let mut any_attempted = false;

    for target in targets_of(&backup.spec.backup_to) {
        if tokio::time::Instant::now() >= deadline {
            warn!(namespace, backup = name, "pass deadline exceeded, stopping remaining targets");
            break;
        }
        if let Err(err) = preflight(&target, &creds).await {
            warn!(namespace, backup = name, target = target.kind(), error = %err, "target pre-flight failed, skipping target");
            continue;
        }
        let repo_uri = target.resolve_repo_uri(&creds);
        storage.push(repo_uri.clone());

        for (pvc_name, pod) in &representative_pods {
            let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
                continue;
            };
            let pod_name = pod.name_any();
            let pod_uid = pod.uid().unwrap_or_default();

            let meta = match locator.locate(name, namespace, pvc_name, &node_name, &pod_name, &pod_uid).await {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(err) => {
                    warn!(namespace, backup = name, pvc = pvc_name.as_str(), error = %err, "volume locator failed, skipping PVC");
                    continue;
                }
            };

            let worker_pod = match worker_mgr
                .ensure_worker(
                    name,
                    &node_name,
                    &target,
                    &repo_uri,
                    backup.spec.timezone.as_deref(),
                    &creds,
                    &backup.spec.env,
                )
                .await
            {
                Ok(pod) => pod,
                Err(crate::worker::Error::Client(crate::client::Error::ReadyTimeout(dep))) => {
                    return Err(PassError::Worker(crate::worker::Error::Client(crate::client::Error::ReadyTimeout(dep))));
                }
                Err(err) => {
                    warn!(namespace, backup = name, pvc = pvc_name.as_str(), error = %err, "worker deployment apply failed, skipping target");
                    continue;
                }
            };

            any_attempted = true;
            match driver
                .backup(
                    &worker_pod.name_any(),
                    target.kind(),
                    cluster_label,
                    &resource_type,
                    namespace,
                    &resource_name,
                    pvc_name,
                    &meta,
                )
                .await
            {
                Ok(true) => any_success = true,
                Ok(false) => {}
                Err(crate::backup::Error::RepositoryLocked) => {
                    return Err(PassError::Backup(crate::backup::Error::RepositoryLocked));
                }
                Err(err) => {
                    warn!(namespace, backup = name, pvc = pvc_name.as_str(), error = %err, "restic backup failed");
                }
            }
        }
    }

    Ok(PassOutcome {
        ready: !any_attempted || any_success,
        reason: if any_success { "BackupSucceeded" } else { "BackupIncomplete" },
        message: format!(
            "{} of {} PVC x target passes succeeded",
            if any_success { 1 } else { 0 },
            representative_pods.len().max(1)
        ),
        storage,
        backed_up: any_success,
        resource_type,
        resource_name,
    })
}

/// MinIO bucket / SFTP directory pre-flight (spec.md §4.5).
async fn preflight(target: &operator_api::BackupTarget, creds: &operator_api::Credentials) -> Result<(), crate::storage::Error> {
    match target {
        operator_api::BackupTarget::Minio(minio) => StorageRouter::ensure_minio_bucket(minio, creds).await,
        operator_api::BackupTarget::Sftp(sftp) => {
            let address = sftp.address.clone();
            let port = sftp.port;
            let path = sftp.path.clone();
            let creds = creds.clone();
            tokio::task::spawn_blocking(move || StorageRouter::ensure_sftp_path(&address, port, &path, &creds))
                .await
                .unwrap_or_else(|err| {
                    Err(crate::storage::Error::Sftp {
                        path: "unknown".to_owned(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, err),
                    })
                })
        }
        _ => Ok(()),
    }
}

/// First Running pod wins when a PVC is shared across pods (spec.md §3, §8 invariant 2).
fn representative_pods_by_pvc(pods: &[Pod]) -> BTreeMap<String, &Pod> {
    let mut map = BTreeMap::new();
    for pod in pods {
        let running = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running");
        if !running || pod.metadata.deletion_timestamp.is_some() {
            continue;
        }
        let Some(spec) = pod.spec.as_ref() else { continue };
        for volume in spec.volumes.iter().flatten() {
            if let Some(claim) = &volume.persistent_volume_claim {
                let _existing = map.entry(claim.claim_name.clone()).or_insert(pod);
            }
        }
    }
    map
}

fn resource_tag(resource: Resource) -> &'static str {
    match resource {
        Resource::Pod => "pod",
        Resource::Deployment => "deployment",
        Resource::StatefulSet => "statefulset",
        Resource::DaemonSet => "daemonset",
        Resource::PersistentVolume => "persistentvolume",
        Resource::PersistentVolumeClaim => "persistentvolumeclaim",
    }
}

async fn update_status(backup: &Backup, ctx: &Context, namespace: &str, name: &str, outcome: PassOutcome) -> Result<(), PassError> {
    let api: Api<Backup> = Api::namespaced(ctx.client.raw(), namespace);
    let now = Time(chrono::Utc::now());
    let condition = Condition {
        type_: "Ready".to_owned(),
        status: if outcome.ready { "True".to_owned() } else { "False".to_owned() },
        last_probe_time: Some(now.clone()),
        last_transition_time: now.clone(),
        reason: Some(outcome.reason.to_owned()),
        message: Some(outcome.message),
    };
    let status = BackupStatus {
        conditions: vec![condition],
        last_backup_time: outcome.backed_up.then(|| now.clone()),
        next_backup_time: None,
        observed_generation: backup.meta().generation,
        storage: outcome.storage,
        resource_type: Some(outcome.resource_type),
        resource_name: Some(outcome.resource_name),
    };
    // Server-side apply on the status subresource, never a raw merge patch (spec.md §5).
    let patch = serde_json::json!({
        "apiVersion": "storage.hybfkuf.io/v1alpha1",
        "kind": "Backup",
        "status": status,
    });
    let _applied = api
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(patch))
        .await?;
    Ok(())
}
