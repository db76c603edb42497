use crate::consts::DEFAULT_BACKUP_TIMEOUT;
use std::time::Duration;

/// Parse `Backup.spec.timeout`, defaulting to [`DEFAULT_BACKUP_TIMEOUT`] when unset.
///
/// # Errors
///
/// Returns `Err` if `raw` is set but not a valid `humantime` duration (e.g. `"1h"`, `"30m"`).
pub fn parse_timeout(raw: Option<&str>) -> anyhow::Result<Duration> {
    match raw {
        Some(raw) => Ok(humantime::parse_duration(raw)?),
        None => Ok(DEFAULT_BACKUP_TIMEOUT),
    }
}

#[cfg(test)]
mod test {
    use super::{parse_timeout, DEFAULT_BACKUP_TIMEOUT};
    use std::time::Duration;

    #[test]
    fn defaults_to_one_hour() {
        assert_eq!(parse_timeout(None).unwrap(), DEFAULT_BACKUP_TIMEOUT);
    }

    #[test]
    fn parses_explicit_value() {
        assert_eq!(parse_timeout(Some("30m")).unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timeout(Some("next Tuesday")).is_err());
    }
}
