use crate::error::RuntimeError;
use crate::executor::Executor;
use ddl_syntax::parse::parse_ddl;
use executor_core::store::ReviewUpdate;
use model::migration::Migration;
use model::status::DdlAction;
use model::strategy::DdlStrategy;
use tracing::info;

impl Executor {
    /// Fills in the blanks on freshly queued rows: resolves revert targets,
    /// classifies immediate operations and validates strategy options.
    pub(crate) async fn review_queued_migrations(&self) -> Result<(), RuntimeError> {
        let unreviewed = self.store.unreviewed_migrations().await?;
        for migration in &unreviewed {
            if let Err(message) = self.review_migration(migration).await {
                self.fail_migration(&migration.uuid, &message).await;
            }
        }
        Ok(())
    }

    /// Review of one row; an `Err` carries the failure message.
    async fn review_migration(&self, migration: &Migration) -> Result<(), String> {
        let mut update = ReviewUpdate {
            ddl_action: migration.ddl_action,
            mysql_table: migration.mysql_table.clone(),
            is_view: migration.is_view,
            is_immediate_operation: false,
        };
        let is_revert = migration.revert_uuid.is_some();

        if migration.ddl_action == DdlAction::Revert {
            let revert_uuid = migration
                .revert_uuid
                .as_ref()
                .ok_or("revert migration carries no target uuid")?;
            let target = self
                .store
                .read_migration(revert_uuid)
                .await
                .map_err(|err| err.to_string())?
                .ok_or_else(|| format!("revert target migration not found: {revert_uuid}"))?;
            update.mysql_table = target.mysql_table.clone();
            update.is_view = target.is_view;
            // The row adopts the action the revert will effectively perform;
            // the revert target marks it as a revert for dispatch.
            update.ddl_action = target.ddl_action.inverse().ok_or_else(|| {
                format!(
                    "cannot revert migration {revert_uuid}: unsupported action {}",
                    target.ddl_action
                )
            })?;
        }

        self.validate_strategy(migration)?;

        update.is_immediate_operation =
            self.classify_immediate_operation(migration, &update, is_revert);

        self.store
            .set_reviewed(&migration.uuid, &update)
            .await
            .map_err(|err| err.to_string())?;
        info!(
            uuid = %migration.uuid,
            table = %update.mysql_table,
            immediate = update.is_immediate_operation,
            "migration reviewed"
        );
        Ok(())
    }

    /// Immediate operations are expected to complete within sub-second:
    /// CREATE and DROP, any view operation, and ALTERs admitting a special
    /// plan. A REVERT of a table ALTER runs vreplication and is never
    /// immediate.
    fn classify_immediate_operation(
        &self,
        migration: &Migration,
        update: &ReviewUpdate,
        is_revert: bool,
    ) -> bool {
        match update.ddl_action {
            DdlAction::Create | DdlAction::Drop => true,
            DdlAction::Alter if update.is_view => true,
            DdlAction::Alter if is_revert => false,
            DdlAction::Alter => self.special_plan_possible(migration),
            DdlAction::Revert => false,
        }
    }

    /// First of the two special-plan evaluations; the ALTER dispatcher
    /// re-plans at execution time and may disagree if server state changed.
    fn special_plan_possible(&self, migration: &Migration) -> bool {
        let Ok(ddl) = parse_ddl(&migration.migration_statement) else {
            return false;
        };
        self.plan_special_alter(&ddl).is_some()
    }

    /// Option sanity per strategy.
    fn validate_strategy(&self, migration: &Migration) -> Result<(), String> {
        let setting = &migration.strategy;
        if setting.strategy == DdlStrategy::MySql {
            if setting.is_postpone_completion() {
                return Err(
                    "--postpone-completion is not supported in mysql strategy".to_string()
                );
            }
            if setting.is_allow_zero_in_date() {
                return Err(
                    "--allow-zero-in-date is not supported in mysql strategy".to_string()
                );
            }
        }
        if setting.is_declarative() && migration.ddl_action == DdlAction::Alter {
            return Err(
                "strategy is declarative. ALTER cannot be used in a declarative migration"
                    .to_string(),
            );
        }
        if setting.is_declarative() && migration.ddl_action == DdlAction::Revert {
            return Err(
                "strategy is declarative. REVERT cannot be used in a declarative migration"
                    .to_string(),
            );
        }
        Ok(())
    }
}
