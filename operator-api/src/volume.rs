use crate::consts::HOST_ROOT_MOUNT_PATH;
use k8s_openapi::api::core::v1::PersistentVolumeSpec;
use serde::{Deserialize, Serialize};

/// Symbolic kind of a `PersistentVolume`'s backing volume source. Mirrors
/// the subset of `PersistentVolumeSpec` fields that can be populated; an
/// unrecognized/future source still round-trips via [`VolumeSource::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSource {
    Csi,
    Nfs,
    HostPath,
    Local,
    Rbd,
    Other(String),
}

impl VolumeSource {
    /// Inspect a bound `PersistentVolume`'s spec and report which volume
    /// source backs it. Exactly one source field is expected to be set.
    #[must_use]
    pub fn from_pv_spec(spec: &PersistentVolumeSpec) -> Self {
        if spec.csi.is_some() {
            Self::Csi
        } else if spec.nfs.is_some() {
            Self::Nfs
        } else if spec.host_path.is_some() {
            Self::HostPath
        } else if spec.local.is_some() {
            Self::Local
        } else if spec.rbd.is_some() {
            Self::Rbd
        } else {
            Self::Other("unknown".to_owned())
        }
    }

    /// Whether `findpvdir` should be skipped in favor of reading the PV
    /// object directly (spec.md §4.2 point 1).
    #[must_use]
    pub fn is_direct_path(&self) -> bool {
        matches!(self, Self::HostPath | Self::Local)
    }

    /// The string passed to `findpvdir --storage-type`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Csi => "csi",
            Self::Nfs => "nfs",
            Self::HostPath => "hostPath",
            Self::Local => "local",
            Self::Rbd => "rbd",
            Self::Other(s) => s.as_str(),
        }
    }
}

/// Per-pass PVC resolution metadata (spec.md §3, "PVC→Volume Metadata").
#[derive(Debug, Clone)]
pub struct PvMeta {
    pub volume_source: VolumeSource,
    pub node_name: String,
    pub pod_name: String,
    pub pod_uid: String,
    /// On-node path discovered by the Volume Locator. For `hostPath`/`local`
    /// this is the complete data path; otherwise it is `pvname`'s parent
    /// directory.
    pub pvdir: String,
    pub pvname: String,
}

impl PvMeta {
    /// Absolute source path passed to `restic backup` inside the worker pod
    /// (spec.md §4.6 point 3).
    #[must_use]
    pub fn source_path(&self) -> String {
        if self.volume_source.is_direct_path() {
            format!("{HOST_ROOT_MOUNT_PATH}/{}", self.pvdir.trim_start_matches('/'))
        } else {
            format!(
                "{HOST_ROOT_MOUNT_PATH}/{}/{}",
                self.pvdir.trim_start_matches('/'),
                self.pvname
            )
        }
    }
}

#[cfg(test)]
mod test {
    use super::{PvMeta, VolumeSource};

    fn meta(volume_source: VolumeSource, pvdir: &str) -> PvMeta {
        PvMeta {
            volume_source,
            node_name: "node-a".to_owned(),
            pod_name: "web-0".to_owned(),
            pod_uid: "uid-1".to_owned(),
            pvdir: pvdir.to_owned(),
            pvname: "pv-0".to_owned(),
        }
    }

    #[test]
    fn csi_source_path_appends_pvname() {
        let m = meta(VolumeSource::Csi, "/var/lib/kubelet/pods/uid-1/volumes/kubernetes.io~csi");
        assert_eq!(
            m.source_path(),
            "/host-root/var/lib/kubelet/pods/uid-1/volumes/kubernetes.io~csi/pv-0"
        );
    }

    #[test]
    fn host_path_source_path_has_no_pvname_suffix() {
        let m = meta(VolumeSource::HostPath, "/data/app");
        assert_eq!(m.source_path(), "/host-root/data/app");
    }

    #[test]
    fn local_source_path_has_no_pvname_suffix() {
        let m = meta(VolumeSource::Local, "/mnt/disks/ssd0");
        assert_eq!(m.source_path(), "/host-root/mnt/disks/ssd0");
    }
}
