use std::time::Instant;

use tracing::{info, warn};

use operator_api::{backup_command, init_command, is_repository_locked, probe_command, PvMeta};

use crate::client::ClusterClient;
use crate::consts::WORKER_CONTAINER_NAME;
use crate::metrics::{BACKUP_DURATION, BACKUP_PASSES};

/// Errors raised while driving restic inside a worker pod.
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error(transparent)]
    Exec(#[from] operator_api::ExecError),
    #[error("restic init failed: {0}")]
    InitFailed(String),
    /// Retryable: restic's repository lock is held by a concurrent pass on
    /// the same node+target (spec.md §5, §9).
    #[error("restic repository is locked")]
    RepositoryLocked,
}

/// Executes the restic command sequence inside a worker pod: probe, init if
/// absent, then backup (spec.md §4.6, "Backup Driver").
pub(crate) struct BackupDriver<'a> {
    client: &'a ClusterClient,
    operator_namespace: &'a str,
}

impl<'a> BackupDriver<'a> {
    pub(crate) fn new(client: &'a ClusterClient, operator_namespace: &'a str) -> Self {
        Self { client, operator_namespace }
    }

    /// Run one `probe -> (maybe init) -> backup` sequence for a single
    /// PVC×target pass. Non-zero backup exit is logged and returned as
    /// `Ok(false)` so the pass continues with the next PVC (spec.md §4.6
    /// point 4); a retryable repo lock surfaces as `Err`.
    pub(crate) async fn backup(
        &self,
        worker_pod: &str,
        target_kind: &str,
        cluster_label: &str,
        resource: &str,
        namespace: &str,
        workload_name: &str,
        pvc_name: &str,
        meta: &PvMeta,
    ) -> Result<bool, Error> {
        let (probe, probe_ok) = self
            .client
            .exec(self.operator_namespace, worker_pod, WORKER_CONTAINER_NAME, &probe_command())
            .await?;
        if is_repository_locked(&probe.stderr) {
            return Err(Error::RepositoryLocked);
        }
        if !probe_ok {
            info!(worker_pod, "repository probe failed, attempting init");
            let (init_out, init_ok) = self
                .client
                .exec(self.operator_namespace, worker_pod, WORKER_CONTAINER_NAME, &init_command())
                .await?;
            if is_repository_locked(&init_out.stderr) {
                return Err(Error::RepositoryLocked);
            }
            if !init_ok {
                return Err(Error::InitFailed(init_out.stderr));
            }
        }

        let tags = vec![resource.to_owned(), namespace.to_owned(), workload_name.to_owned(), pvc_name.to_owned()];
        let source_path = meta.source_path();
        let command = backup_command(cluster_label, &tags, &source_path);

        let started = Instant::now();
        let (output, ok) = self
            .client
            .exec(self.operator_namespace, worker_pod, WORKER_CONTAINER_NAME, &command)
            .await?;
        BACKUP_DURATION.with_label_values(&[target_kind]).observe(started.elapsed().as_secs_f64());

        if is_repository_locked(&output.stderr) {
            return Err(Error::RepositoryLocked);
        }
        if ok {
            BACKUP_PASSES.with_label_values(&[target_kind, "success"]).inc();
        } else {
            BACKUP_PASSES.with_label_values(&[target_kind, "failure"]).inc();
            warn!(pvc = pvc_name, stderr = output.stderr.as_str(), "restic backup failed, continuing with next PVC");
        }
        Ok(ok)
    }
}
