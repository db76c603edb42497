/// Build the restic command lines used by the Backup Driver (spec.md §4.6).
/// `--no-cache` is always set; tag order is part of the contract (consumers
/// filter snapshots by tag position later).
#[must_use]
pub fn probe_command() -> Vec<String> {
    strs(&["restic", "list", "keys", "--no-cache"])
}

#[must_use]
pub fn init_command() -> Vec<String> {
    strs(&["restic", "init", "--no-cache"])
}

/// `tags` must be supplied in `[resource, namespace, workload_name, pvc]` order.
#[must_use]
pub fn backup_command(cluster: &str, tags: &[String], source_path: &str) -> Vec<String> {
    let mut cmd = strs(&["restic", "backup", "--no-cache", "--host", cluster]);
    for tag in tags {
        cmd.push("--tag".to_owned());
        cmd.push(tag.clone());
    }
    cmd.push(source_path.to_owned());
    cmd
}

/// Whether a restic failure's stderr indicates a retryable repository lock,
/// rather than a fatal error for this PVC×target (spec.md §5, §9).
#[must_use]
pub fn is_repository_locked(stderr: &str) -> bool {
    stderr.contains("repository is already locked")
}

fn strs(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

#[cfg(test)]
mod test {
    use super::{backup_command, init_command, is_repository_locked, probe_command};

    #[test]
    fn probe_is_list_keys() {
        assert_eq!(probe_command(), vec!["restic", "list", "keys", "--no-cache"]);
    }

    #[test]
    fn init_is_restic_init() {
        assert_eq!(init_command(), vec!["restic", "init", "--no-cache"]);
    }

    #[test]
    fn backup_tag_order_matches_contract() {
        let tags = vec![
            "deployment".to_owned(),
            "default".to_owned(),
            "web".to_owned(),
            "data-0".to_owned(),
        ];
        let cmd = backup_command("kubernetes", &tags, "/host-root/pvdir/pv-0");
        assert_eq!(
            cmd,
            vec![
                "restic", "backup", "--no-cache", "--host", "kubernetes", "--tag", "deployment",
                "--tag", "default", "--tag", "web", "--tag", "data-0", "/host-root/pvdir/pv-0",
            ]
        );
    }

    #[test]
    fn detects_repo_lock_errors() {
        assert!(is_repository_locked("unable to create lock: repository is already locked exclusively"));
        assert!(!is_repository_locked("wrong password"));
    }
}
