use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams};
use kube::Api;

use operator_api::consts::{
    cluster_role_binding_name, ANNOTATION_CREATED_TIME, CLUSTER_ROLE_NAME, LABEL_MANAGED_BY,
    LABEL_MANAGED_BY_VALUE, LABEL_OWNER_NAME, LABEL_OWNER_NAMESPACE, SERVICE_ACCOUNT_NAME,
};

use crate::client::ClusterClient;
use crate::consts::FIELD_MANAGER;

/// Errors raised while reconciling the RBAC and CronJob objects a `Backup`
/// needs (spec.md §4.7, §6).
#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
}

/// Labels every operator-managed auxiliary object carries (spec.md §8 invariant 5),
/// plus the owner pair used to map a cluster-scoped object back to its `Backup`
/// (spec.md §9, "Cross-scope ownership").
fn managed_by_labels(owner_namespace: &str, owner_name: &str) -> std::collections::BTreeMap<String, String> {
    [
        (LABEL_MANAGED_BY.to_owned(), LABEL_MANAGED_BY_VALUE.to_owned()),
        (LABEL_OWNER_NAMESPACE.to_owned(), owner_namespace.to_owned()),
        (LABEL_OWNER_NAME.to_owned(), owner_name.to_owned()),
    ]
    .into_iter()
    .collect()
}

/// Ensure the `horusctl` ServiceAccount exists in the Backup's namespace.
pub(crate) async fn ensure_service_account(
    client: &ClusterClient,
    namespace: &str,
    owner_name: &str,
) -> Result<(), Error> {
    let api: Api<ServiceAccount> = Api::namespaced(client.raw(), namespace);
    let sa = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(SERVICE_ACCOUNT_NAME.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(managed_by_labels(namespace, owner_name)),
            ..ObjectMeta::default()
        },
        ..ServiceAccount::default()
    };
    let _applied = api
        .patch(SERVICE_ACCOUNT_NAME, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(sa))
        .await?;
    Ok(())
}

/// Ensure the cluster-scoped `horusctl-role` ClusterRole exists, carrying the
/// exact verb sets from the original template (spec.md §6).
pub(crate) async fn ensure_cluster_role(client: &ClusterClient, owner_namespace: &str, owner_name: &str) -> Result<(), Error> {
    let api: Api<ClusterRole> = Api::all(client.raw());
    let rules = vec![
        PolicyRule {
            api_groups: Some(vec!["storage.hybfkuf.io".to_owned()]),
            resources: Some(vec![
                "backups".to_owned(),
                "backups/status".to_owned(),
                "restores".to_owned(),
                "restores/status".to_owned(),
                "clones".to_owned(),
                "clones/status".to_owned(),
                "migrations".to_owned(),
                "migrations/status".to_owned(),
                "traffics".to_owned(),
                "traffics/status".to_owned(),
            ]),
            verbs: vec!["get".to_owned(), "list".to_owned(), "watch".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec!["rbac.authorization.k8s.io".to_owned()]),
            resources: Some(vec!["clusterroles".to_owned(), "clusterrolebindings".to_owned()]),
            verbs: vec!["*".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec!["apps".to_owned()]),
            resources: Some(vec!["deployments".to_owned()]),
            verbs: vec!["*".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["namespaces".to_owned()]),
            verbs: vec!["*".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods".to_owned(), "secrets".to_owned(), "persistentvolumes".to_owned(), "persistentvolumeclaims".to_owned()]),
            verbs: vec!["get".to_owned(), "list".to_owned(), "watch".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec!["apps".to_owned()]),
            resources: Some(vec!["statefulsets".to_owned(), "daemonsets".to_owned(), "replicasets".to_owned()]),
            verbs: vec!["get".to_owned(), "list".to_owned(), "watch".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods/exec".to_owned()]),
            verbs: vec!["get".to_owned(), "create".to_owned()],
            ..PolicyRule::default()
        },
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods/logs".to_owned()]),
            verbs: vec!["get".to_owned()],
            ..PolicyRule::default()
        },
    ];
    let role = ClusterRole {
        metadata: ObjectMeta {
            name: Some(CLUSTER_ROLE_NAME.to_owned()),
            labels: Some(managed_by_labels(owner_namespace, owner_name)),
            ..ObjectMeta::default()
        },
        rules: Some(rules),
        ..ClusterRole::default()
    };
    let _applied = api
        .patch(CLUSTER_ROLE_NAME, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(role))
        .await?;
    Ok(())
}

/// Ensure `horusctl-<namespace>-binding` exists, binding `horusctl`'s
/// ServiceAccount in `namespace` to the cluster role.
pub(crate) async fn ensure_cluster_role_binding(client: &ClusterClient, namespace: &str, owner_name: &str) -> Result<(), Error> {
    let api: Api<ClusterRoleBinding> = Api::all(client.raw());
    let name = cluster_role_binding_name(namespace);
    let binding = ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(managed_by_labels(namespace, owner_name)),
            ..ObjectMeta::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_owned(),
            kind: "ClusterRole".to_owned(),
            name: CLUSTER_ROLE_NAME.to_owned(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_owned(),
            name: SERVICE_ACCOUNT_NAME.to_owned(),
            namespace: Some(namespace.to_owned()),
            ..Subject::default()
        }]),
    };
    let _applied = api
        .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(binding))
        .await?;
    Ok(())
}

/// Delete `horusctl-<namespace>-binding`, tolerating "already gone"
/// (spec.md §4.7 Terminating state, §9 supplemented feature 1).
pub(crate) async fn delete_cluster_role_binding(client: &ClusterClient, namespace: &str) -> Result<(), Error> {
    let api: Api<ClusterRoleBinding> = Api::all(client.raw());
    let name = cluster_role_binding_name(namespace);
    match api.delete(&name, &kube::api::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Ensure the `backup-<name>` CronJob exists, re-entering the same backup
/// routine on the declared schedule (spec.md §6).
pub(crate) async fn ensure_cron_job(
    client: &ClusterClient,
    namespace: &str,
    backup_name: &str,
    owner_name: &str,
    schedule: &str,
    log_level: Option<&str>,
    log_format: Option<&str>,
    timezone: Option<&str>,
    successful_jobs_history_limit: Option<i32>,
    failed_jobs_history_limit: Option<i32>,
) -> Result<(), Error> {
    let api: Api<CronJob> = Api::namespaced(client.raw(), namespace);
    let name = format!("backup-{backup_name}");
    let mut command = vec![
        "horusctl".to_owned(),
        "backup".to_owned(),
        "--namespace".to_owned(),
        namespace.to_owned(),
    ];
    if let Some(level) = log_level {
        command.push("--log-level".to_owned());
        command.push(level.to_owned());
    }
    if let Some(format) = log_format {
        command.push("--log-format".to_owned());
        command.push(format.to_owned());
    }
    command.push(backup_name.to_owned());

    let created_time = match api.get_opt(&name).await? {
        Some(existing) => existing
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANNOTATION_CREATED_TIME))
            .cloned()
            .unwrap_or_else(|| humantime::format_rfc3339(std::time::SystemTime::now()).to_string()),
        None => humantime::format_rfc3339(std::time::SystemTime::now()).to_string(),
    };
    let mut annotations = std::collections::BTreeMap::new();
    let _prev = annotations.insert(ANNOTATION_CREATED_TIME.to_owned(), created_time);

    let cron_job = CronJob {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_owned()),
            labels: Some(managed_by_labels(namespace, owner_name)),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        spec: Some(CronJobSpec {
            concurrency_policy: Some("Forbid".to_owned()),
            schedule: schedule.to_owned(),
            successful_jobs_history_limit,
            failed_jobs_history_limit,
            job_template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            service_account_name: Some(SERVICE_ACCOUNT_NAME.to_owned()),
                            restart_policy: Some("Never".to_owned()),
                            containers: vec![Container {
                                name: name.clone(),
                                image: Some(crate::consts::WORKER_IMAGE.to_owned()),
                                command: Some(command),
                                env: timezone.map(|tz| vec![EnvVar { name: "TZ".to_owned(), value: Some(tz.to_owned()), ..EnvVar::default() }]),
                                ..Container::default()
                            }],
                            ..PodSpec::default()
                        }),
                        ..PodTemplateSpec::default()
                    },
                    ..JobSpec::default()
                }),
                ..JobTemplateSpec::default()
            },
            ..CronJobSpec::default()
        }),
        ..CronJob::default()
    };
    let _applied = api
        .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(cron_job))
        .await?;
    Ok(())
}
