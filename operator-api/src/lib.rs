/// Constants shared between the operator and its generated worker/CronJob pods.
pub mod consts;

/// `Backup.spec.timeout` parsing.
pub mod duration;

/// In-pod command execution over the Kubernetes exec subresource.
pub mod exec;

/// `restic` command-line construction.
pub mod restic;

/// `backupTo` target enumeration and repository URI resolution.
pub mod target;

/// `PersistentVolume` source classification and on-node path resolution.
pub mod volume;

pub use duration::parse_timeout;
pub use exec::{ExecCommand, ExecError, ExecOutput};
pub use restic::{backup_command, init_command, is_repository_locked, probe_command};
pub use target::{targets_of, BackupTarget, Credentials};
pub use volume::{PvMeta, VolumeSource};
