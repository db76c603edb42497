use clap::Parser;
use std::fs;

/// Path read when neither `NAMESPACE` nor `OPERATOR_NAMESPACE` is set (spec.md §6).
const SERVICEACCOUNT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
/// Namespace used when every other resolution source is unavailable (e.g. running off-cluster).
const DEFAULT_OPERATOR_NAMESPACE: &str = "default";

/// `horus-operator` config
#[derive(Debug, Parser)]
#[non_exhaustive]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The namespace to watch, default to cluster wide
    #[arg(long, value_parser=namespace_mode_parser, default_value = "")]
    pub namespace: Namespace,
    /// The address on which the health/metrics HTTP server will listen
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    /// Whether to create the CRD regardless of the version currently on k8s
    #[arg(long, default_value = "false")]
    pub create_crd: bool,
    /// Whether to enable auto migration if the CRD version on k8s is less than current
    #[arg(long, default_value = "false")]
    pub auto_migration: bool,
}

/// The namespace to work, `ClusterWide` means work with all namespaces
#[allow(clippy::exhaustive_enums)] // it is clear that this enum is exhaustive
#[derive(Clone, Debug)]
pub enum Namespace {
    /// A single namespace
    Single(String),
    /// All namespaces
    ClusterWide,
}

/// parse namespace mode
#[allow(clippy::unnecessary_wraps)] // required by clap
fn namespace_mode_parser(value: &str) -> Result<Namespace, String> {
    if value.is_empty() {
        return Ok(Namespace::ClusterWide);
    }
    Ok(Namespace::Single(value.to_owned()))
}

/// The namespace the operator itself runs in — where worker Deployments, the
/// `horusctl` ServiceAccount/ClusterRole/CronJob objects it creates on behalf
/// of a `Backup` live, distinct from `Config::namespace` (which scopes which
/// `Backup` objects are watched). Resolution order per spec.md §6:
/// `NAMESPACE` env, then `OPERATOR_NAMESPACE` env, then the mounted
/// service-account namespace file, then a hardcoded default.
#[must_use]
pub fn resolve_operator_namespace() -> String {
    std::env::var("NAMESPACE")
        .or_else(|_| std::env::var("OPERATOR_NAMESPACE"))
        .ok()
        .or_else(|| fs::read_to_string(SERVICEACCOUNT_NAMESPACE_FILE).ok())
        .map(|ns| ns.trim().to_owned())
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_OPERATOR_NAMESPACE.to_owned())
}

#[cfg(test)]
mod test {
    use super::resolve_operator_namespace;

    #[test]
    fn env_override_wins_over_file_and_default() {
        std::env::set_var("NAMESPACE", "horus-system");
        assert_eq!(resolve_operator_namespace(), "horus-system");
        std::env::remove_var("NAMESPACE");
    }

    #[test]
    fn falls_back_to_default_off_cluster() {
        std::env::remove_var("NAMESPACE");
        std::env::remove_var("OPERATOR_NAMESPACE");
        assert_eq!(resolve_operator_namespace(), "default");
    }
}
