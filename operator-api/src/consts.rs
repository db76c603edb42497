use std::time::Duration;

/// Logical cluster label passed to restic as `--host` when `Backup.spec.cluster` is unset.
pub const DEFAULT_CLUSTER_NAME: &str = "kubernetes";

/// Default pass deadline when `Backup.spec.timeout` is unset.
pub const DEFAULT_BACKUP_TIMEOUT: Duration = Duration::from_secs(3600);

/// ServiceAccount used by worker pods and the generated CronJob.
pub const SERVICE_ACCOUNT_NAME: &str = "horusctl";

/// Cluster-scoped ClusterRole granting the permissions `horusctl` needs.
pub const CLUSTER_ROLE_NAME: &str = "horusctl-role";

/// Annotation recording an object's creation time (RFC3339).
pub const ANNOTATION_CREATED_TIME: &str = "hybfkuf.io/createdAt";
/// Annotation bumped on every worker-pod-template apply to force rollout.
pub const ANNOTATION_UPDATED_TIME: &str = "hybfkuf.io/updatedAt";
/// Annotation bumped to force a worker Deployment's pods to restart.
pub const ANNOTATION_RESTARTED_TIME: &str = "hybfkuf.io/restartedAt";

/// Standard label identifying the controller that manages an object.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Value of [`LABEL_MANAGED_BY`] for every object this operator creates.
pub const LABEL_MANAGED_BY_VALUE: &str = "horus-operator";
/// Standard label grouping an object's role within its application.
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
/// Value of [`LABEL_PART_OF`] for every object this operator creates.
pub const LABEL_PART_OF_VALUE: &str = "horus";
/// Label carrying the owning `Backup`'s name, set on cluster-scoped
/// auxiliary objects the CRD cannot directly own via `ownerReference`.
pub const LABEL_OWNER_NAME: &str = "horus-operator.hybfkuf.io/owner-name";
/// Label carrying the owning `Backup`'s namespace, paired with [`LABEL_OWNER_NAME`].
pub const LABEL_OWNER_NAMESPACE: &str = "horus-operator.hybfkuf.io/owner-namespace";

/// Read-only host-root mount path inside worker and `findpvdir` pods.
pub const HOST_ROOT_MOUNT_PATH: &str = "/host-root";
/// Host path mounted read-only into `findpvdir` helper pods.
pub const KUBELET_DIR: &str = "/var/lib/kubelet";

/// Number of times to retry a blank `findpvdir` exec before giving up on a PVC.
pub const FINDPVDIR_RETRIES: u32 = 12;
/// Delay between `findpvdir` retries.
pub const FINDPVDIR_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Returns the name of the cluster-scoped `ClusterRoleBinding` owned by the
/// `Backup` objects living in `namespace`.
#[must_use]
pub fn cluster_role_binding_name(namespace: &str) -> String {
    format!("horusctl-{namespace}-binding")
}
