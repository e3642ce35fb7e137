use model::error::ExecutorError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETAIN_ARTIFACTS: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_MAX_CONCURRENT: usize = 256;
pub const DEFAULT_CUTOVER_THRESHOLD: Duration = Duration::from_secs(10);
pub const MIN_CUTOVER_THRESHOLD: Duration = Duration::from_secs(5);
pub const MAX_CUTOVER_THRESHOLD: Duration = Duration::from_secs(30);
pub const DEFAULT_GRPC_TIMEOUT: Duration = Duration::from_secs(30);
pub const STALE_WARNING_AFTER: Duration = Duration::from_secs(5 * 60);
pub const STALE_FAIL_AFTER: Duration = Duration::from_secs(180 * 60);
/// The `message` column caps at utf8mb4 text length / 4.
pub const MAX_MESSAGE_LENGTH: usize = 16383;
/// Throttler app name shared by all online DDL migrations.
pub const THROTTLER_APP: &str = "online-ddl";
/// Default sidecar database holding the metadata tables.
pub const DEFAULT_SIDECAR_DB: &str = "_vt";

/// Static executor configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Online DDL can be disabled wholesale; all mutations then return
    /// UNAVAILABLE.
    pub enabled: bool,
    pub keyspace: String,
    pub shard: String,
    /// Alias under which this executor claims ownership of migrations.
    pub tablet_alias: String,
    /// MySQL schema holding the user tables.
    pub mysql_schema: String,
    pub sidecar_db: String,
    pub check_interval: Duration,
    pub retain_artifacts: Duration,
    pub max_concurrent: usize,
    pub cutover_threshold: Duration,
    pub grpc_timeout: Duration,
    pub stale_warning_after: Duration,
    pub stale_fail_after: Duration,
    /// Directory for per-migration log files; disabled when unset.
    pub log_dir: Option<PathBuf>,
    /// Test-suite mode replaces the locking cut-over protocol with a plain
    /// atomic rename.
    pub test_suite_cutover: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            enabled: true,
            keyspace: String::new(),
            shard: String::new(),
            tablet_alias: String::new(),
            mysql_schema: String::new(),
            sidecar_db: DEFAULT_SIDECAR_DB.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            retain_artifacts: DEFAULT_RETAIN_ARTIFACTS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cutover_threshold: DEFAULT_CUTOVER_THRESHOLD,
            grpc_timeout: DEFAULT_GRPC_TIMEOUT,
            stale_warning_after: STALE_WARNING_AFTER,
            stale_fail_after: STALE_FAIL_AFTER,
            log_dir: None,
            test_suite_cutover: false,
        }
    }
}

impl ExecutorConfig {
    /// The running-migration cap is clamped to at least one.
    pub fn effective_max_concurrent(&self) -> usize {
        self.max_concurrent.max(1)
    }
}

/// Validates a user-supplied cut-over threshold: zero selects the default,
/// anything else must fall within `[5s, 30s]`.
pub fn validate_cutover_threshold(threshold: Duration) -> Result<Duration, ExecutorError> {
    if threshold.is_zero() {
        return Ok(DEFAULT_CUTOVER_THRESHOLD);
    }
    if threshold < MIN_CUTOVER_THRESHOLD || threshold > MAX_CUTOVER_THRESHOLD {
        return Err(ExecutorError::failed_precondition(format!(
            "cut-over threshold should be between {:?} and {:?}, got {:?}",
            MIN_CUTOVER_THRESHOLD, MAX_CUTOVER_THRESHOLD, threshold
        )));
    }
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundaries() {
        assert_eq!(
            validate_cutover_threshold(Duration::ZERO).unwrap(),
            DEFAULT_CUTOVER_THRESHOLD
        );
        assert_eq!(
            validate_cutover_threshold(Duration::from_secs(5)).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            validate_cutover_threshold(Duration::from_secs(30)).unwrap(),
            Duration::from_secs(30)
        );
        assert!(validate_cutover_threshold(Duration::from_secs(4)).is_err());
        assert!(validate_cutover_threshold(Duration::from_secs(31)).is_err());
    }

    #[test]
    fn concurrency_cap_is_clamped() {
        let config = ExecutorConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert_eq!(config.effective_max_concurrent(), 1);
        assert_eq!(
            ExecutorConfig::default().effective_max_concurrent(),
            DEFAULT_MAX_CONCURRENT
        );
    }
}
