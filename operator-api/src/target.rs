use crd_api::v1alpha1::{
    BackupTo, CephFsTarget, MinioTarget, NfsTarget, PvcTarget, RcloneTarget, RestServerTarget,
    S3Target, SftpTarget,
};

/// Secret data resolved for a `Backup`'s `credentialName`, plus any
/// per-target override. Fields are `None` when the secret lacks the key.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub restic_password: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One populated `backupTo` field, turned into a typed descriptor. Built by
/// explicit field inspection (see [`targets_of`]) rather than reflection, so
/// that enumerating configured targets is a compile-time-checked match
/// instead of a runtime walk over struct fields.
#[derive(Debug, Clone)]
pub enum BackupTarget {
    Nfs(NfsTarget),
    Pvc(PvcTarget),
    CephFs(CephFsTarget),
    S3(S3Target),
    Minio(MinioTarget),
    RestServer(RestServerTarget),
    Sftp(SftpTarget),
    Rclone(RcloneTarget),
}

impl BackupTarget {
    /// Short identifier used in worker Deployment names and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nfs(_) => "backup-to-nfs",
            Self::Pvc(_) => "backup-to-pvc",
            Self::CephFs(_) => "backup-to-cephfs",
            Self::S3(_) => "backup-to-s3",
            Self::Minio(_) => "backup-to-minio",
            Self::RestServer(_) => "backup-to-rest-server",
            Self::Sftp(_) => "backup-to-sftp",
            Self::Rclone(_) => "backup-to-rclone",
        }
    }

    /// The name of the credential secret this target reads, falling back to
    /// the `Backup`-level `credentialName` when the target has no override.
    #[must_use]
    pub fn credential_name<'a>(&'a self, default: &'a str) -> &'a str {
        let overridden = match self {
            Self::CephFs(t) => t.credential_name.as_deref(),
            Self::S3(t) => t.credential_name.as_deref(),
            Self::Minio(t) => t.credential_name.as_deref(),
            Self::RestServer(t) => t.credential_name.as_deref(),
            Self::Sftp(t) => t.credential_name.as_deref(),
            Self::Nfs(_) | Self::Pvc(_) | Self::Rclone(_) => None,
        };
        overridden.unwrap_or(default)
    }

    /// The restic repository URI restic should be pointed at for this
    /// target (spec.md §4.3). NFS/PVC/CephFS targets mount their backend at
    /// a fixed in-pod path, so restic addresses them as a local path.
    #[must_use]
    pub fn repo_uri(&self) -> String {
        match self {
            Self::Nfs(_) | Self::Pvc(_) | Self::CephFs(_) => "/restic-repo".to_owned(),
            Self::S3(t) => {
                let folder = t.folder.as_deref().unwrap_or_default();
                format!("s3:{}/{}{folder}", t.endpoint, t.bucket)
            }
            Self::Minio(t) => {
                let folder = t.folder.as_deref().unwrap_or_default();
                format!(
                    "s3:{}://{}:{}/{}{folder}",
                    t.endpoint.scheme, t.endpoint.address, t.endpoint.port, t.bucket
                )
            }
            Self::RestServer(t) => format!("rest:http://{}:{}/{}", t.address, t.port, t.path),
            Self::Sftp(t) => format!("sftp://{{user}}@{}:{}/{}", t.address, t.port, t.path),
            Self::Rclone(t) => format!("rclone:{}:{}", t.address, t.path),
        }
    }

    /// Substitute the resolved SFTP username into a `repo_uri()` produced by
    /// an `Sftp` target. No-op for every other target.
    #[must_use]
    pub fn resolve_repo_uri(&self, creds: &Credentials) -> String {
        let uri = self.repo_uri();
        if matches!(self, Self::Sftp(_)) {
            uri.replace("{user}", creds.username.as_deref().unwrap_or("restic"))
        } else {
            uri
        }
    }
}

/// Enumerate the configured targets in a `backupTo` record. Each populated
/// field becomes one independent backup pass descriptor, in the fixed
/// field order below (spec.md §5: "sequential in target-descriptor order").
#[must_use]
pub fn targets_of(backup_to: &BackupTo) -> Vec<BackupTarget> {
    let mut targets = Vec::new();
    if let Some(ref nfs) = backup_to.nfs {
        targets.push(BackupTarget::Nfs(nfs.clone()));
    }
    if let Some(ref pvc) = backup_to.pvc {
        targets.push(BackupTarget::Pvc(pvc.clone()));
    }
    if let Some(ref cephfs) = backup_to.cephfs {
        targets.push(BackupTarget::CephFs(cephfs.clone()));
    }
    if let Some(ref s3) = backup_to.s3 {
        targets.push(BackupTarget::S3(s3.clone()));
    }
    if let Some(ref minio) = backup_to.minio {
        targets.push(BackupTarget::Minio(minio.clone()));
    }
    if let Some(ref rest_server) = backup_to.rest_server {
        targets.push(BackupTarget::RestServer(rest_server.clone()));
    }
    if let Some(ref sftp) = backup_to.sftp {
        targets.push(BackupTarget::Sftp(sftp.clone()));
    }
    if let Some(ref rclone) = backup_to.rclone {
        targets.push(BackupTarget::Rclone(rclone.clone()));
    }
    targets
}

#[cfg(test)]
mod test {
    use super::{targets_of, BackupTarget};
    use crd_api::v1alpha1::{BackupTo, MinioEndpoint, MinioTarget, NfsTarget};

    #[test]
    fn enumerates_every_populated_field_in_order() {
        let backup_to = BackupTo {
            nfs: Some(NfsTarget {
                server: "10.0.0.1".to_owned(),
                path: "/exports/restic".to_owned(),
            }),
            minio: Some(MinioTarget {
                endpoint: MinioEndpoint {
                    scheme: "http".to_owned(),
                    address: "mo".to_owned(),
                    port: 9000,
                },
                bucket: "b".to_owned(),
                folder: None,
                credential_name: None,
                credential_namespace: None,
                insecure_tls_skip_verify: false,
                region: None,
            }),
            ..Default::default()
        };
        let targets = targets_of(&backup_to);
        assert_eq!(targets.len(), 2);
        assert!(matches!(targets[0], BackupTarget::Nfs(_)));
        assert!(matches!(targets[1], BackupTarget::Minio(_)));
    }

    #[test]
    fn minio_repo_uri_matches_scenario_s3() {
        let target = BackupTarget::Minio(MinioTarget {
            endpoint: MinioEndpoint {
                scheme: "http".to_owned(),
                address: "mo".to_owned(),
                port: 9000,
            },
            bucket: "b".to_owned(),
            folder: None,
            credential_name: None,
            credential_namespace: None,
            insecure_tls_skip_verify: false,
            region: None,
        });
        assert_eq!(target.repo_uri(), "s3:http://mo:9000/b");
    }

    #[test]
    fn empty_backup_to_yields_no_targets() {
        assert!(targets_of(&BackupTo::default()).is_empty());
    }
}
