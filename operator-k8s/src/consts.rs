use std::time::Duration;

/// The default requeue duration to achieve eventual consistency
pub(crate) const DEFAULT_REQUEUE_DURATION: Duration = Duration::from_secs(600);
/// The field manager identifier used for every server-side apply this operator performs
pub(crate) const FIELD_MANAGER: &str = "horus-operator.hybfkuf.io/operator";
/// Image running `restic` and `findpvdir`, used for worker and locator Deployments
pub(crate) const WORKER_IMAGE: &str = "horus-operator/restic-worker:latest";
/// Label identifying the worker Deployment's target node
pub(crate) const LABEL_NODE_NAME: &str = "horus-operator.hybfkuf.io/node-name";
/// Label identifying which `Backup` a worker Deployment serves
pub(crate) const LABEL_BACKUP_NAME: &str = "horus-operator.hybfkuf.io/backup-name";
/// Label identifying which backup target kind a worker Deployment serves
pub(crate) const LABEL_TARGET_KIND: &str = "horus-operator.hybfkuf.io/target-kind";
/// Container name used inside worker and locator pods
pub(crate) const WORKER_CONTAINER_NAME: &str = "restic";
/// Environment variable carrying the restic repository password
pub(crate) const ENV_RESTIC_PASSWORD: &str = "RESTIC_PASSWORD";
/// Environment variable carrying the restic repository URI
pub(crate) const ENV_RESTIC_REPOSITORY: &str = "RESTIC_REPOSITORY";
/// Environment variable carrying the S3/Minio access key id
pub(crate) const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable carrying the S3/Minio secret access key
pub(crate) const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Maximum duration to wait for a worker Deployment's pod to reach `Running`
pub(crate) const WORKER_READY_TIMEOUT: Duration = Duration::from_secs(120);
/// Poll interval while waiting for a worker Deployment's pod to become ready
pub(crate) const WORKER_READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
