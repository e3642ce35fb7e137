use crate::error::RuntimeError;
use crate::executor::Executor;
use chrono::{DateTime, Utc};
use model::migration::Migration;
use model::status::MigrationStatus;
use tracing::{info, warn};

/// Age of a running migration's liveness attestation.
fn stale_minutes(migration: &Migration, now: DateTime<Utc>) -> i64 {
    let reference = migration
        .liveness_timestamp
        .or(migration.started_timestamp)
        .or(migration.requested_timestamp);
    match reference {
        Some(ts) => (now - ts).num_minutes().max(0),
        None => 0,
    }
}

impl Executor {
    /// Warning pass: running migrations whose liveness has aged past the
    /// warning threshold are reported, and the worst age is exposed as a
    /// gauge.
    pub(crate) async fn warn_stale_migrations(&self) -> Result<(), RuntimeError> {
        let now = Utc::now();
        let warning_minutes = (self.config.stale_warning_after.as_secs() / 60) as i64;
        let running = self.store.migrations_by_status(MigrationStatus::Running).await?;
        let mut max_minutes = 0i64;
        for migration in &running {
            let minutes = stale_minutes(migration, now);
            max_minutes = max_minutes.max(minutes);
            if minutes >= warning_minutes {
                warn!(
                    uuid = %migration.uuid,
                    minutes,
                    "stale migration: no liveness indication"
                );
            }
        }
        self.metrics.set_max_stale_minutes(max_minutes.max(0) as u64);
        Ok(())
    }

    /// Failing pass: a migration past the hard staleness threshold is
    /// terminated. If another tablet owned it, the row is marked as a tablet
    /// failure so a future primary retries it.
    pub(crate) async fn fail_stale_migrations(&self) -> Result<(), RuntimeError> {
        let now = Utc::now();
        let fail_minutes = (self.config.stale_fail_after.as_secs() / 60) as i64;
        let running = self.store.migrations_by_status(MigrationStatus::Running).await?;
        for migration in &running {
            let minutes = stale_minutes(migration, now);
            if minutes < fail_minutes {
                continue;
            }
            info!(uuid = %migration.uuid, minutes, "terminating stale migration");
            if migration.tablet != self.config.tablet_alias {
                self.store.set_tablet_failed(&migration.uuid).await?;
            }
            self.terminate_vrepl_migration(&migration.uuid).await;
            let message = format!(
                "stale migration: the executor indicates no liveness in the past {minutes} minutes"
            );
            self.store
                .mark_terminal(&migration.uuid, MigrationStatus::Failed, &message)
                .await?;
            self.owned.remove(&migration.uuid);
            self.metrics.increment_failed();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::status::DdlAction;
    use model::strategy::DdlStrategySetting;
    use model::uuid::OnlineDdlUuid;

    #[test]
    fn stale_minutes_prefers_liveness() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut migration = Migration::new_queued(
            OnlineDdlUuid::generate(),
            "commerce",
            "0",
            "vt_commerce",
            "t",
            "ALTER TABLE t ENGINE=InnoDB",
            DdlStrategySetting::direct(),
            DdlAction::Alter,
            "",
        );
        migration.requested_timestamp = Some(now - chrono::Duration::minutes(500));
        migration.started_timestamp = Some(now - chrono::Duration::minutes(200));
        migration.liveness_timestamp = Some(now - chrono::Duration::minutes(7));
        assert_eq!(stale_minutes(&migration, now), 7);
        migration.liveness_timestamp = None;
        assert_eq!(stale_minutes(&migration, now), 200);
    }
}
