use crate::error::RuntimeError;
use crate::executor::Executor;
use chrono::{DateTime, Utc};
use ddl_syntax::parse::{DdlStatement, SubmissionDirectives, parse_submission};
use executor_core::config::{THROTTLER_APP, validate_cutover_threshold};
use executor_core::store::MigrationFilter;
use model::error::ExecutorError;
use model::migration::Migration;
use model::status::DdlAction;
use model::strategy::{DdlStrategy, DdlStrategySetting};
use model::uuid::OnlineDdlUuid;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

impl Executor {
    /// Accepts a schema-change statement with its comment-encoded submission
    /// fields and inserts a queued migration. Resubmission of a known uuid is
    /// idempotent: with a matching context it retries a terminal migration
    /// and no-ops otherwise; a differing context is rejected.
    pub async fn submit(&self, statement: &str) -> Result<OnlineDdlUuid, RuntimeError> {
        self.check_open()?;
        let (directives, ddl) = parse_submission(statement)
            .map_err(|err| ExecutorError::invalid_argument(err.to_string()))?;
        let uuid = directives
            .uuid
            .clone()
            .unwrap_or_else(OnlineDdlUuid::generate);
        let setting = build_strategy_setting(&directives)?;
        let context = directives.context.clone().unwrap_or_default();

        let _submit_guard = self.submit_mutex.lock().await;

        if let Some(existing) = self.store.read_migration(&uuid).await? {
            if existing.migration_context != context {
                return Err(ExecutorError::failed_precondition(format!(
                    "migration rejected: found existing migration {} with different context: {} vs submitted {}",
                    uuid, existing.migration_context, context
                ))
                .into());
            }
            if existing.is_terminal() {
                self.store
                    .retry_migration(&uuid, &self.config.tablet_alias)
                    .await?;
                info!(uuid = %uuid, "resubmitted terminal migration; retrying");
                self.trigger_next_check();
            }
            return Ok(uuid);
        }

        let pending = self.store.pending_migrations().await?;
        check_singleton_constraints(&setting, &context, &ddl.table, &pending)?;

        let cutover_threshold_seconds = match setting
            .cut_over_threshold()
            .map_err(|e| ExecutorError::invalid_argument(e))?
        {
            Some(threshold) => validate_cutover_threshold(threshold)?.as_secs() as i64,
            None => 0,
        };
        let retain_artifacts_seconds = setting
            .retain_artifacts_duration()
            .map_err(|e| ExecutorError::invalid_argument(e))?
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut migration = Migration::new_queued(
            uuid.clone(),
            self.config.keyspace.as_str(),
            self.config.shard.as_str(),
            self.config.mysql_schema.as_str(),
            ddl.table.as_str(),
            ddl.raw.as_str(),
            setting,
            ddl.action,
            context.as_str(),
        );
        migration.is_view = ddl.is_view;
        migration.revert_uuid = ddl.revert_uuid.clone();
        migration.tablet = self.config.tablet_alias.clone();
        migration.postpone_launch = migration.strategy.is_postpone_launch();
        migration.postpone_completion = migration.strategy.is_postpone_completion();
        migration.cutover_threshold_seconds = cutover_threshold_seconds;
        migration.retain_artifacts_seconds = retain_artifacts_seconds;
        migration.log_path = self.create_migration_log(&uuid, &ddl).await;

        self.store.insert_migration(&migration).await?;
        info!(
            uuid = %uuid,
            table = %migration.mysql_table,
            strategy = %migration.strategy,
            "migration submitted"
        );
        self.trigger_next_check();
        Ok(uuid)
    }

    /// Terminates a migration. A terminal migration no-ops; a user-issued
    /// cancel stamps `cancelled_timestamp` first so the resulting terminal
    /// status is `cancelled` rather than `failed`.
    pub async fn cancel_migration(
        &self,
        uuid: &OnlineDdlUuid,
        message: &str,
        issued_by_user: bool,
    ) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let migration = self.read_migration_required(uuid).await?;
        if migration.is_terminal() {
            return Ok(0);
        }
        if issued_by_user {
            self.store.set_cancelled_timestamp(uuid).await?;
        }
        if migration.runs_vreplication() {
            self.terminate_vrepl_migration(uuid).await;
        }
        self.fail_migration(uuid, message).await;
        Ok(1)
    }

    /// Cancels every pending migration.
    pub async fn cancel_pending_migrations(&self, message: &str) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let pending = self.store.pending_migrations().await?;
        let mut cancelled = 0;
        for migration in &pending {
            cancelled += self
                .cancel_migration(&migration.uuid, message, true)
                .await?;
        }
        Ok(cancelled)
    }

    /// Clears `--postpone-completion`, letting the migration cut over (or be
    /// scheduled, if its immediacy was holding it in queue).
    pub async fn complete_migration(&self, uuid: &OnlineDdlUuid) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let affected = self.store.clear_postpone_completion(uuid).await?;
        if affected > 0 {
            self.trigger_next_check();
        }
        Ok(affected)
    }

    pub async fn complete_pending_migrations(&self) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let pending = self.store.pending_migrations().await?;
        let mut affected = 0;
        for migration in pending.iter().filter(|m| m.postpone_completion) {
            affected += self.complete_migration(&migration.uuid).await?;
        }
        Ok(affected)
    }

    /// Clears `--postpone-launch` so the scheduler may promote the row.
    pub async fn launch_migration(&self, uuid: &OnlineDdlUuid) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let affected = self.store.clear_postpone_launch(uuid).await?;
        if affected > 0 {
            self.trigger_next_check();
        }
        Ok(affected)
    }

    pub async fn launch_pending_migrations(&self) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let pending = self.store.pending_migrations().await?;
        let mut affected = 0;
        for migration in pending.iter().filter(|m| m.postpone_launch) {
            affected += self.launch_migration(&migration.uuid).await?;
        }
        Ok(affected)
    }

    /// Requeues a terminal migration.
    pub async fn retry_migration(&self, uuid: &OnlineDdlUuid) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let migration = self.read_migration_required(uuid).await?;
        if migration.is_pending() {
            return Err(ExecutorError::MigrationAlreadyRunning(uuid.clone()).into());
        }
        let _guard = self.migration_mutex.lock().await;
        let affected = self
            .store
            .retry_migration(uuid, &self.config.tablet_alias)
            .await?;
        if affected > 0 {
            self.trigger_next_check();
        }
        Ok(affected)
    }

    /// Expedites artifact reclamation for a terminal migration.
    pub async fn cleanup_migration(&self, uuid: &OnlineDdlUuid) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let migration = self.read_migration_required(uuid).await?;
        if !migration.is_terminal() {
            return Err(ExecutorError::failed_precondition(format!(
                "cannot cleanup migration {uuid}: migration is {}",
                migration.status
            ))
            .into());
        }
        self.store.set_retain_artifacts_seconds(uuid, 1).await?;
        self.trigger_next_check();
        Ok(1)
    }

    pub async fn cleanup_all_migrations(&self) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let migrations = self.store.show_migrations(&MigrationFilter::All).await?;
        let mut affected = 0;
        for migration in migrations
            .iter()
            .filter(|m| m.is_terminal() && m.cleanup_timestamp.is_none())
        {
            self.store
                .set_retain_artifacts_seconds(&migration.uuid, 1)
                .await?;
            affected += 1;
        }
        if affected > 0 {
            self.trigger_next_check();
        }
        Ok(affected)
    }

    /// Marks the migration so its next cut-over attempt is immediate and
    /// forceful. Idempotent.
    pub async fn force_cutover_migration(&self, uuid: &OnlineDdlUuid) -> Result<u64, RuntimeError> {
        self.check_open()?;
        self.read_migration_required(uuid).await?;
        let affected = self.store.set_force_cutover(uuid).await?;
        self.trigger_next_check();
        Ok(affected)
    }

    pub async fn force_cutover_pending_migrations(&self) -> Result<u64, RuntimeError> {
        self.check_open()?;
        let pending = self.store.pending_migrations().await?;
        let mut affected = 0;
        for migration in &pending {
            affected += self.store.set_force_cutover(&migration.uuid).await?;
        }
        if affected > 0 {
            self.trigger_next_check();
        }
        Ok(affected)
    }

    /// Adjusts the per-migration cut-over threshold; zero restores the
    /// default, out-of-range values are rejected.
    pub async fn set_cutover_threshold(
        &self,
        uuid: &OnlineDdlUuid,
        threshold: Duration,
    ) -> Result<(), RuntimeError> {
        self.check_open()?;
        let threshold = validate_cutover_threshold(threshold)?;
        self.read_migration_required(uuid).await?;
        self.store
            .set_cutover_threshold_seconds(uuid, threshold.as_secs() as i64)
            .await?;
        Ok(())
    }

    pub async fn throttle_migration(
        &self,
        uuid: &OnlineDdlUuid,
        ratio: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RuntimeError> {
        self.check_open()?;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ExecutorError::invalid_argument(format!(
                "throttle ratio must be within [0..1], got {ratio}"
            ))
            .into());
        }
        self.read_migration_required(uuid).await?;
        self.throttler
            .throttle_app(uuid.as_str(), ratio, expires_at)
            .await?;
        self.store.set_user_throttle_ratio(uuid, ratio).await?;
        Ok(())
    }

    pub async fn unthrottle_migration(&self, uuid: &OnlineDdlUuid) -> Result<(), RuntimeError> {
        self.check_open()?;
        self.read_migration_required(uuid).await?;
        self.throttler.unthrottle_app(uuid.as_str()).await?;
        self.store.set_user_throttle_ratio(uuid, 0.0).await?;
        Ok(())
    }

    pub async fn throttle_all_migrations(
        &self,
        ratio: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), RuntimeError> {
        self.check_open()?;
        self.throttler
            .throttle_app(THROTTLER_APP, ratio, expires_at)
            .await?;
        Ok(())
    }

    pub async fn unthrottle_all_migrations(&self) -> Result<(), RuntimeError> {
        self.check_open()?;
        self.throttler.unthrottle_app(THROTTLER_APP).await?;
        Ok(())
    }

    pub async fn show_migrations(
        &self,
        filter: &MigrationFilter,
    ) -> Result<Vec<Migration>, RuntimeError> {
        self.check_open()?;
        Ok(self.store.show_migrations(filter).await?)
    }

    /// Reads the migration's log file; the stored path carries a
    /// `<tablet>:` prefix identifying the writer.
    pub async fn show_migration_logs(&self, uuid: &OnlineDdlUuid) -> Result<String, RuntimeError> {
        self.check_open()?;
        let migration = self.read_migration_required(uuid).await?;
        if migration.log_path.is_empty() {
            return Ok(String::new());
        }
        let path = strip_log_host_prefix(&migration.log_path);
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| RuntimeError::Internal(format!("cannot read migration log: {err}")))
    }

    /// Writes the per-migration log file and returns the stored path value.
    async fn create_migration_log(&self, uuid: &OnlineDdlUuid, ddl: &DdlStatement) -> String {
        let Some(log_dir) = &self.config.log_dir else {
            return String::new();
        };
        let path = log_dir.join(format!("{uuid}.log"));
        let content = format!("{}\n{}\n", Utc::now().to_rfc3339(), ddl.raw);
        if let Err(err) = tokio::fs::write(&path, content).await {
            warn!(uuid = %uuid, error = %err, "cannot write migration log");
            return String::new();
        }
        if self.config.tablet_alias.is_empty() {
            path.display().to_string()
        } else {
            format!("{}:{}", self.config.tablet_alias, path.display())
        }
    }
}

/// Drops the `<tablet>:` prefix from a stored log path.
pub(crate) fn strip_log_host_prefix(log_path: &str) -> &str {
    match log_path.split_once(':') {
        Some((_, path)) => path,
        None => log_path,
    }
}

fn build_strategy_setting(
    directives: &SubmissionDirectives,
) -> Result<DdlStrategySetting, ExecutorError> {
    let strategy = match &directives.strategy {
        Some(s) => DdlStrategy::from_str(s).map_err(|e| ExecutorError::invalid_argument(e))?,
        None => DdlStrategy::Direct,
    };
    let setting =
        DdlStrategySetting::new(strategy, directives.options.clone().unwrap_or_default());
    setting
        .validate()
        .map_err(|e| ExecutorError::invalid_argument(e))?;
    Ok(setting)
}

/// The submission-time singleton gate; runs while holding the submit mutex.
fn check_singleton_constraints(
    setting: &DdlStrategySetting,
    context: &str,
    table: &str,
    pending: &[Migration],
) -> Result<(), ExecutorError> {
    if setting.is_singleton() {
        if let Some(sample) = pending.first() {
            return Err(ExecutorError::failed_precondition(format!(
                "singleton migration rejected: found pending migrations [sample: {}]",
                sample.uuid
            )));
        }
    }
    if setting.is_singleton_context() {
        for migration in pending {
            if migration.migration_context == context {
                continue;
            }
            // A pending REVERT that did not itself claim singleton-context
            // may coexist with any context. Reviewed reverts carry the
            // inverse action, so the revert target is the marker.
            let is_revert =
                migration.ddl_action == DdlAction::Revert || migration.revert_uuid.is_some();
            if is_revert && !migration.strategy.is_singleton_context() {
                continue;
            }
            return Err(ExecutorError::failed_precondition(format!(
                "singleton-context migration rejected: found pending migration {} in different context: {}",
                migration.uuid, migration.migration_context
            )));
        }
    }
    if setting.is_singleton_table() && !table.is_empty() {
        if let Some(conflict) = pending.iter().find(|m| m.mysql_table == table) {
            return Err(ExecutorError::failed_precondition(format!(
                "singleton-table migration rejected: found pending migration {} on table {}",
                conflict.uuid, table
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::strategy::DdlStrategy;

    fn pending_migration(
        context: &str,
        table: &str,
        action: DdlAction,
        options: &str,
    ) -> Migration {
        Migration::new_queued(
            OnlineDdlUuid::generate(),
            "commerce",
            "0",
            "vt_commerce",
            table,
            "ALTER TABLE t ENGINE=InnoDB",
            DdlStrategySetting::new(DdlStrategy::Vitess, options),
            action,
            context,
        )
    }

    #[test]
    fn singleton_rejects_any_pending() {
        let setting = DdlStrategySetting::new(DdlStrategy::Online, "--singleton");
        let pending = vec![pending_migration("a", "t1", DdlAction::Alter, "")];
        let err = check_singleton_constraints(&setting, "b", "t2", &pending).unwrap_err();
        assert!(err.to_string().contains("singleton migration rejected"));
        assert!(err.to_string().contains(pending[0].uuid.as_str()));
        assert!(check_singleton_constraints(&setting, "b", "t2", &[]).is_ok());
    }

    #[test]
    fn singleton_context_allows_same_context_and_plain_reverts() {
        let setting = DdlStrategySetting::new(DdlStrategy::Online, "--singleton-context");
        let same = pending_migration("ctx", "t1", DdlAction::Alter, "");
        let revert = pending_migration("other", "t1", DdlAction::Revert, "");
        assert!(
            check_singleton_constraints(&setting, "ctx", "t2", &[same, revert]).is_ok()
        );

        let differing = pending_migration("other", "t1", DdlAction::Alter, "");
        assert!(check_singleton_constraints(&setting, "ctx", "t2", &[differing]).is_err());

        let guarded_revert =
            pending_migration("other", "t1", DdlAction::Revert, "--singleton-context");
        assert!(check_singleton_constraints(&setting, "ctx", "t2", &[guarded_revert]).is_err());
    }

    #[test]
    fn singleton_table_rejects_same_table_only() {
        let setting = DdlStrategySetting::new(DdlStrategy::Online, "--singleton-table");
        let pending = vec![pending_migration("a", "customers", DdlAction::Alter, "")];
        assert!(check_singleton_constraints(&setting, "b", "customers", &pending).is_err());
        assert!(check_singleton_constraints(&setting, "b", "orders", &pending).is_ok());
    }

    #[test]
    fn log_path_prefix_stripping() {
        assert_eq!(
            strip_log_host_prefix("zone1-100:/var/log/m.log"),
            "/var/log/m.log"
        );
        assert_eq!(strip_log_host_prefix("/var/log/m.log"), "/var/log/m.log");
    }
}
