// The `JsonSchema` and `CustomResource` macro generates codes that does not pass the clippy lint.
#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::api::core::v1::{EnvVar, PersistentVolumeClaim};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::JsonSchema;

/// Cron expression, same pattern the xline cluster CRD validates its backup schedule against.
const CRON_PATTERN: &str = r"^(?:\*|[0-5]?\d)(?:[-/,]?(?:\*|[0-5]?\d))*(?: +(?:\*|1?[0-9]|2[0-3])(?:[-/,]?(?:\*|1?[0-9]|2[0-3]))*){4}$";

/// The finalizer attached to every live `Backup`.
pub const FINALIZER: &str = "backup.storage.hybfkuf.io/finalizer";

/// Backup specification: declares where data comes from and where it should be sent.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "storage.hybfkuf.io",
    version = "v1alpha1",
    kind = "Backup",
    singular = "backup",
    plural = "backups",
    struct = "Backup",
    namespaced,
    status = "BackupStatus",
    shortname = "bkp",
    printcolumn = r#"{"name":"Schedule", "type":"string", "description":"Cron schedule", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Resource", "type":"string", "description":"Backup source resource kind", "jsonPath":".spec.backupFrom.resource"}"#,
    printcolumn = r#"{"name":"LastBackup", "type":"date", "description":"Last successful backup", "jsonPath":".status.lastBackupTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "description":"The object age", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[schemars(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BackupSpec {
    /// Cron expression controlling the generated CronJob's schedule.
    #[garde(pattern(CRON_PATTERN))]
    #[schemars(regex(pattern = CRON_PATTERN))]
    pub schedule: String,

    /// Number of backups to retain. `0` means keep all.
    #[serde(default)]
    pub retention: u64,

    /// Where the data is backed up from.
    #[garde(dive)]
    pub backup_from: BackupFrom,

    /// Where the data is backed up to. Any subset of fields may be set
    /// simultaneously; each populated field drives an independent pass.
    #[garde(dive)]
    pub backup_to: BackupTo,

    /// Name of the secret (in the operator namespace) carrying
    /// `RESTIC_PASSWORD` and, as needed, target-specific credentials.
    pub credential_name: String,

    /// Pass deadline, e.g. `"1h"`, `"30m"`. Defaults to one hour if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Timezone forwarded to the generated CronJob's `TZ` env var.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Logical cluster label passed to restic as `--host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Log level forwarded to the generated CronJob container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Log format forwarded to the generated CronJob container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,

    /// `successfulJobsHistoryLimit` forwarded to the generated CronJob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_jobs_history_limit: Option<i32>,

    /// `failedJobsHistoryLimit` forwarded to the generated CronJob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_jobs_history_limit: Option<i32>,

    /// Extra environment variables injected into worker pods.
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Where the data should be backed up from.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BackupFrom {
    /// Name of the resource named by `resource`.
    #[garde(length(min = 1))]
    pub name: String,
    /// Resource kind, matched case-insensitively.
    #[garde(skip)]
    pub resource: Resource,
}

/// Resource kinds a `Backup` may target.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    PersistentVolume,
    PersistentVolumeClaim,
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: k8s_openapi::serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.to_lowercase().as_str() {
            "pod" => Ok(Self::Pod),
            "deployment" => Ok(Self::Deployment),
            "statefulset" => Ok(Self::StatefulSet),
            "daemonset" => Ok(Self::DaemonSet),
            "persistentvolume" => Ok(Self::PersistentVolume),
            "persistentvolumeclaim" => Ok(Self::PersistentVolumeClaim),
            other => Err(k8s_openapi::serde::de::Error::custom(format!(
                "unknown backupFrom.resource {other:?}"
            ))),
        }
    }
}

/// Sparse set of remote backup targets. Any number of fields may be
/// populated at once; each is an independent backup destination.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BackupTo {
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NfsTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cephfs: Option<CephFsTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Target>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minio: Option<MinioTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_server: Option<RestServerTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp: Option<SftpTarget>,
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rclone: Option<RcloneTarget>,
}

impl BackupTo {
    /// Whether at least one target field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nfs.is_none()
            && self.pvc.is_none()
            && self.cephfs.is_none()
            && self.s3.is_none()
            && self.minio.is_none()
            && self.rest_server.is_none()
            && self.sftp.is_none()
            && self.rclone.is_none()
    }
}

/// Backup to an NFS export mounted into the worker pod.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NfsTarget {
    /// Hostname or IP address of the NFS server.
    pub server: String,
    /// Path exported by the NFS server.
    pub path: String,
}

/// Backup to a PersistentVolumeClaim mounted into the worker pod.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct PvcTarget {
    #[serde(flatten)]
    pub claim: PersistentVolumeClaim,
}

/// Backup to a CephFS mount.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephFsTarget {
    pub monitors: Vec<String>,
    pub path: String,
    /// Secret (user, keyring, clusterID) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_namespace: Option<String>,
}

/// Backup to an S3-compatible bucket via a plain endpoint string.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Target {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_namespace: Option<String>,
    #[serde(default)]
    pub insecure_tls_skip_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Backup to a MinIO bucket, addressed by a structured endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinioTarget {
    pub endpoint: MinioEndpoint,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_namespace: Option<String>,
    #[serde(default)]
    pub insecure_tls_skip_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// A MinIO endpoint, split so the scheme/address/port can be composed into
/// a `restic` `s3:` repository URI without string parsing.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct MinioEndpoint {
    /// `http` or `https`.
    pub scheme: String,
    pub address: String,
    pub port: u16,
}

/// Backup to a `rest-server` instance.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestServerTarget {
    pub address: String,
    pub port: i32,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_namespace: Option<String>,
}

/// Backup over SFTP.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SftpTarget {
    pub address: String,
    pub port: i32,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_namespace: Option<String>,
}

/// Backup via an rclone remote (no operator-managed credentials; the
/// rclone worker image supplies its own `rclone.conf`).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct RcloneTarget {
    pub address: String,
    pub path: String,
}

/// One reported condition of a `Backup`, mirroring the metav1 `Condition`
/// schema plus `lastProbeTime`, which upstream's `Condition` type lacks.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<Time>,
    pub last_transition_time: Time,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Observed state of a `Backup`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_backup_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Repository URIs written to in the last successful pass, one per
    /// populated `backupTo` target.
    #[serde(default)]
    pub storage: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

#[cfg(test)]
mod test {
    use super::{BackupFrom, BackupSpec, BackupTo, Resource, S3Target};
    use garde::Validate;

    fn spec(schedule: &str) -> BackupSpec {
        BackupSpec {
            schedule: schedule.to_owned(),
            retention: 0,
            backup_from: BackupFrom {
                name: "web".to_owned(),
                resource: Resource::Deployment,
            },
            backup_to: BackupTo {
                s3: Some(S3Target {
                    endpoint: "s3.example.com".to_owned(),
                    bucket: "backups".to_owned(),
                    folder: None,
                    credential_name: None,
                    credential_namespace: None,
                    insecure_tls_skip_verify: false,
                    region: None,
                }),
                ..Default::default()
            },
            credential_name: "cred".to_owned(),
            timeout: None,
            timezone: None,
            cluster: None,
            log_level: None,
            log_format: None,
            successful_jobs_history_limit: None,
            failed_jobs_history_limit: None,
            env: Vec::new(),
        }
    }

    #[test]
    fn validation_ok() {
        assert!(Validate::validate(&spec("*/15 * * * *"), &()).is_ok());
    }

    #[test]
    fn validation_bad_schedule() {
        assert!(Validate::validate(&spec("every 5 minutes"), &()).is_err());
    }

    #[test]
    fn resource_kind_is_case_insensitive() {
        let parsed: Resource = serde_json::from_str("\"DEPLOYMENT\"").unwrap();
        assert_eq!(parsed, Resource::Deployment);
    }

    #[test]
    fn empty_backup_to_reports_empty() {
        assert!(BackupTo::default().is_empty());
        assert!(!spec("* * * * *").backup_to.is_empty());
    }
}
