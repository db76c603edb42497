pub use backup::{
    Backup, BackupFrom, BackupSpec, BackupStatus, BackupTo, CephFsTarget, Condition,
    MinioEndpoint, MinioTarget, NfsTarget, PvcTarget, RcloneTarget, Resource, RestServerTarget,
    S3Target, SftpTarget, FINALIZER,
};

mod backup;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DynamicObject, ListParams, Patch, PatchParams};
use kube::core::crd::merge_crds;
use kube::{Api, Client, CustomResourceExt, Resource as _};
use tracing::{debug, info};
use utils::migration::ApiVersion;

use crate::wait_crd_established;

const FIELD_MANAGER: &str = "horus-operator.hybfkuf.io/crd";

/// Install or migrate the `Backup` CRD.
///
/// # Errors
///
/// Returns `Err` if the Kubernetes API rejects the apply, if the installed
/// CRD version cannot be parsed, or if establishment times out.
pub async fn set_up(
    kube_client: &Client,
    manage_crd: bool,
    auto_migration: bool,
) -> anyhow::Result<()> {
    if !manage_crd {
        info!("--manage-crd set to false, skip checking CRD");
        return Ok(());
    }

    let crd_api: Api<CustomResourceDefinition> = Api::all(kube_client.clone());
    let definition = Backup::crd();
    let current_version: ApiVersion<Backup> = Backup::version(&()).as_ref().parse()?;

    let ret = crd_api.get(Backup::crd_name()).await;
    if let Err(kube::Error::Api(kube::error::ErrorResponse { code: 404, .. })) = ret {
        debug!("cannot find Backup CRD, installing it");
        _ = crd_api
            .patch(
                Backup::crd_name(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Apply(definition.clone()),
            )
            .await?;
        wait_crd_established(crd_api.clone(), Backup::crd_name()).await?;
        return Ok(());
    }

    debug!("found Backup CRD, current version: {current_version}");

    let mut add = true;
    let mut storage = String::new();

    let mut crds = ret?
        .spec
        .versions
        .iter()
        .cloned()
        .map(|ver| {
            let mut crd = definition.clone();
            if ver.name == current_version.to_string() {
                add = false;
            }
            if ver.storage {
                storage = ver.name.clone();
            }
            crd.spec.versions = vec![ver];
            crd
        })
        .collect::<Vec<_>>();

    if add {
        crds.push(definition.clone());
    } else {
        debug!("current version already registered, checking migration");
        try_migration(kube_client, crds, &current_version, &storage, auto_migration).await?;
        return Ok(());
    }

    let merged_crd = merge_crds(crds.clone(), &storage)?;
    debug!("updating CRD definition");
    _ = crd_api
        .patch(
            Backup::crd_name(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(merged_crd),
        )
        .await?;
    wait_crd_established(crd_api.clone(), Backup::crd_name()).await?;

    debug!("CRD updated, checking migration");
    try_migration(kube_client, crds, &current_version, &storage, auto_migration).await?;

    Ok(())
}

/// Migrate the storage version of the CRD to `current_version`, provided no
/// existing objects at the current storage version conflict with it.
#[allow(clippy::indexing_slicing)] // `versions` always has at least one element
async fn try_migration(
    kube_client: &Client,
    crds: Vec<CustomResourceDefinition>,
    current_version: &ApiVersion<Backup>,
    storage: &str,
    auto_migration: bool,
) -> anyhow::Result<()> {
    if !auto_migration {
        debug!("auto migration disabled, skipping");
        return Ok(());
    }
    if current_version.to_string() == storage {
        debug!("current version already the storage version, skipping");
        return Ok(());
    }
    let versions: Vec<ApiVersion<Backup>> = crds
        .iter()
        .map(|crd| crd.spec.versions[0].name.parse())
        .collect::<anyhow::Result<_>>()?;
    if versions.iter().any(|ver| current_version < ver) {
        debug!("current version is older than some registered version, skipping");
        return Ok(());
    }
    let group = kube::discovery::group(kube_client, Backup::group(&()).as_ref()).await?;
    let Some((ar, _)) = group
        .versioned_resources(storage)
        .into_iter()
        .find(|res| res.0.kind == Backup::kind(&()))
    else {
        return Ok(());
    };
    let api: Api<DynamicObject> = Api::all_with(kube_client.clone(), &ar);
    let backups = api.list(&ListParams::default()).await?.items;
    if !backups.is_empty() && !current_version.compat_with(&storage.parse()?) {
        return Ok(());
    }
    let merged_crd = merge_crds(crds, &current_version.to_string())?;
    let crd_api: Api<CustomResourceDefinition> = Api::all(kube_client.clone());
    debug!("migrating storage version {storage} to {current_version}");
    _ = crd_api
        .patch(
            Backup::crd_name(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(merged_crd),
        )
        .await?;
    wait_crd_established(crd_api.clone(), Backup::crd_name()).await?;
    Ok(())
}
