use crate::error::RuntimeError;
use crate::executor::Executor;
use ddl_syntax::parse::DdlStatement;
use ddl_syntax::plan::{SpecialAlterPlan, is_instant_ddl_eligible, is_range_partition_alter};
use ddl_syntax::rewrite::add_algorithm_instant;
use model::migration::Migration;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

impl Executor {
    /// Execution-time special-plan evaluation.
    pub(crate) fn plan_special_alter(&self, ddl: &DdlStatement) -> Option<SpecialAlterPlan> {
        if is_range_partition_alter(ddl) {
            return Some(SpecialAlterPlan::RangePartition);
        }
        if self.instant_ddl_capable.load(Ordering::SeqCst) && is_instant_ddl_eligible(&ddl.raw) {
            return Some(SpecialAlterPlan::InstantDdl);
        }
        None
    }

    /// Runs a special-plan ALTER directly, under a brief write-buffering
    /// window so in-flight queries drain around the metadata change.
    pub(crate) async fn execute_special_plan(
        self: &Arc<Self>,
        migration: &Migration,
        ddl: &DdlStatement,
        plan: SpecialAlterPlan,
    ) -> Result<(), RuntimeError> {
        let statement = match plan {
            SpecialAlterPlan::InstantDdl => add_algorithm_instant(&ddl.raw),
            SpecialAlterPlan::RangePartition => ddl.raw.clone(),
        };
        let threshold = migration.cut_over_threshold_or(self.config.cutover_threshold);
        let mut buffer_guard = self
            .buffer
            .buffer_writes(&migration.mysql_table, threshold + Duration::from_secs(5))
            .await?;
        let result = self.pool.exec(&statement).await;
        buffer_guard.release().await;
        result?;

        self.store
            .set_special_plan(&migration.uuid, plan.as_str())
            .await?;
        info!(uuid = %migration.uuid, plan = plan.as_str(), "special-plan ALTER executed");
        self.finalize_complete(&migration.uuid).await;
        Ok(())
    }
}
