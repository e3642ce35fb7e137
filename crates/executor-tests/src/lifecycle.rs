use crate::utils::TestHarness;
use executor_core::store::MetadataStore;
use model::status::MigrationStatus;
use std::time::Duration;
use tracing_test::traced_test;

// Scenario: DROP TABLE of an existing table with strategy online.
// Expected Outcome:
// - The table disappears from user view; a _vt_HOLD_... table appears and is
//   recorded in `artifacts`.
// - The row reaches `complete`.
// - After retention elapses, GC renames the artifact again, clears the
//   artifacts list and stamps cleanup.
#[traced_test]
#[tokio::test]
async fn drop_existing_table_lifecycle() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");

    let uuid = harness
        .submit("/*ddl: strategy=online*/ DROP TABLE customers")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert!(!harness.db.has_table("customers"));
    let artifacts = migration.artifact_tables();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].starts_with("_vt_HOLD_"));
    assert!(harness.db.has_table(&artifacts[0]));

    // Retention elapses; the GC pass picks the migration up.
    harness.store.backdate_completed(&uuid, 2 * 24 * 3600);
    harness.tick().await;

    let migration = harness.migration(&uuid).await;
    assert!(migration.artifacts.is_empty());
    assert!(migration.cleanup_timestamp.is_some());
    assert!(!harness.db.has_table(&artifacts[0]));
    assert!(
        harness
            .tablets
            .gc_check_calls
            .load(std::sync::atomic::Ordering::SeqCst)
            >= 1
    );
}

// Scenario: DROP TABLE IF EXISTS of a missing table.
// Expected Outcome: acceptable MySQL error is suppressed, the row completes
// and the artifact entry is cleared.
#[tokio::test]
async fn drop_if_exists_of_missing_table_completes() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .submit("/*ddl: strategy=online*/ DROP TABLE IF EXISTS ghost")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert!(migration.artifacts.is_empty());
}

// Scenario: CREATE TABLE IF NOT EXISTS when the table already exists, then
// REVERT of that migration.
// Expected Outcome: the create completes with artifacts cleared; the revert
// is a noop that does not drop the table.
#[tokio::test]
async fn create_if_not_exists_then_revert_noop() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");

    let create_uuid = harness
        .submit("/*ddl: strategy=online*/ CREATE TABLE IF NOT EXISTS customers (id INT PRIMARY KEY)")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&create_uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert!(migration.artifacts.is_empty());

    let revert_uuid = harness
        .submit(&format!(
            "/*ddl: strategy=online*/ REVERT VITESS_MIGRATION '{create_uuid}'"
        ))
        .await;
    harness.ticks(2).await;

    let revert = harness.migration(&revert_uuid).await;
    assert_eq!(revert.status, MigrationStatus::Complete);
    assert!(harness.db.has_table("customers"));
}

// Scenario: while migration A is running, submit migration B with
// --singleton.
// Expected Outcome: FAILED_PRECONDITION naming A as the sample; no row is
// inserted for B.
#[tokio::test]
async fn singleton_rejects_while_pending_exists() {
    let harness = TestHarness::new().await;
    let running_uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    assert_eq!(
        harness.migration(&running_uuid).await.status,
        MigrationStatus::Running
    );

    let err = harness
        .executor
        .submit("/*ddl: strategy=online options=\"--singleton\"*/ ALTER TABLE orders ENGINE=InnoDB")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("FAILED_PRECONDITION"), "{message}");
    assert!(message.contains("singleton migration rejected"), "{message}");
    assert!(message.contains(running_uuid.as_str()), "{message}");

    // Only the running migration exists in the store.
    let all = harness
        .store
        .show_migrations(&executor_core::store::MigrationFilter::All)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

// Scenario: resubmission of the same uuid.
// Expected Outcome: matching context retries a terminal migration (row count
// stays one); a differing context is rejected.
#[tokio::test]
async fn resubmission_is_idempotent_per_context() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");

    let statement =
        "/*ddl: uuid=a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3 strategy=online context=cli-1*/ \
         DROP TABLE customers";
    let uuid = harness.submit(statement).await;
    harness.ticks(2).await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Complete
    );

    // Same uuid, same context: behaves as a retry of the terminal row.
    let resubmitted = harness.submit(statement).await;
    assert_eq!(resubmitted, uuid);
    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Queued);
    assert_eq!(migration.retries, 1);
    let all = harness
        .store
        .show_migrations(&executor_core::store::MigrationFilter::All)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);

    // Same uuid, different context: rejected.
    let err = harness
        .executor
        .submit(
            "/*ddl: uuid=a0c9bd52_66f1_11ec_bd2c_0a43f95f28a3 strategy=online context=cli-2*/ \
             DROP TABLE customers",
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("different context"));
}

// Scenario: cancel a running migration twice.
// Expected Outcome: the first cancel terminates it as `cancelled`; the
// second is a noop returning zero affected rows.
#[tokio::test]
async fn cancel_is_idempotent() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;

    let affected = harness
        .executor
        .cancel_migration(&uuid, "cancelled by test", true)
        .await
        .unwrap();
    assert_eq!(affected, 1);
    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Cancelled);
    assert!(!harness.vrepl.has_stream(uuid.as_str()));

    let affected = harness
        .executor
        .cancel_migration(&uuid, "cancelled again", true)
        .await
        .unwrap();
    assert_eq!(affected, 0);
}

// Scenario: ForceCutOver twice on a running migration.
// Expected Outcome: the flag is set; the second call is an idempotent
// re-set.
#[tokio::test]
async fn force_cutover_is_idempotent() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;

    harness.executor.force_cutover_migration(&uuid).await.unwrap();
    assert!(harness.migration(&uuid).await.force_cutover);
    harness.executor.force_cutover_migration(&uuid).await.unwrap();
    assert!(harness.migration(&uuid).await.force_cutover);
}

// Boundary: SetCutOverThreshold clamps to [5s, 30s], zero restoring the
// default.
#[tokio::test]
async fn cutover_threshold_boundaries() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;

    harness
        .executor
        .set_cutover_threshold(&uuid, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(harness.migration(&uuid).await.cutover_threshold_seconds, 10);

    harness
        .executor
        .set_cutover_threshold(&uuid, Duration::from_secs(15))
        .await
        .unwrap();
    assert_eq!(harness.migration(&uuid).await.cutover_threshold_seconds, 15);

    for out_of_range in [Duration::from_secs(4), Duration::from_secs(31)] {
        let err = harness
            .executor
            .set_cutover_threshold(&uuid, out_of_range)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FAILED_PRECONDITION"));
    }
}

// Scenario: --postpone-launch holds a migration in queue until launched.
#[tokio::test]
async fn postpone_launch_holds_until_launched() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");
    let uuid = harness
        .submit(
            "/*ddl: strategy=online options=\"--postpone-launch\"*/ DROP TABLE customers",
        )
        .await;
    harness.ticks(3).await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Queued
    );

    harness.executor.launch_migration(&uuid).await.unwrap();
    harness.ticks(2).await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Complete
    );
}

// Scenario: mysql strategy with an unsupported option.
// Expected Outcome: the reviewer fails the migration immediately.
#[tokio::test]
async fn mysql_strategy_rejects_postpone_completion() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");
    let uuid = harness
        .submit(
            "/*ddl: strategy=mysql options=\"--postpone-completion\"*/ \
             ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    harness.tick().await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Failed);
    assert!(migration.message.contains("--postpone-completion"));
}

// Scenario: a running migration stops reporting liveness (its stream is
// gone and nothing refreshes the row).
// Expected Outcome: a warning after 5 minutes (gauge updated), termination
// after 180 minutes with a message mentioning the missing liveness.
#[traced_test]
#[tokio::test]
async fn stale_migration_is_warned_then_failed() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    // The replication runtime dies silently; nothing refreshes liveness.
    use executor_core::collab::VReplClient;
    harness.vrepl.delete_workflow(uuid.as_str()).await.unwrap();

    harness.store.backdate_liveness(&uuid, 6 * 60);
    harness.tick().await;
    assert!(logs_contain("stale migration"));
    assert!(harness.executor.metrics().snapshot().max_stale_minutes >= 5);
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Running
    );

    harness.store.backdate_liveness(&uuid, 181 * 60);
    harness.tick().await;
    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Failed);
    assert!(migration.message.contains("indicates no liveness"));
    assert!(migration.completed_timestamp.is_some());
    assert!(migration.started_timestamp.is_some());
}

// Scenario: the replication stream reports a terminal error.
// Expected Outcome: the running reviewer cancels the migration in its batch
// pass; the terminal status is failed (no user cancel in flight).
#[tokio::test]
async fn terminal_stream_error_fails_migration() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    harness
        .vrepl
        .set_terminal_error(uuid.as_str(), "terminal error: duplicate entry 'x'");
    harness.tick().await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Failed);
    assert!(migration.message.contains("duplicate entry"));
}

// Scenario: ALTER on a table participating in foreign keys, without
// --unsafe-allow-foreign-keys.
// Expected Outcome: rejected with a foreign-key message.
#[tokio::test]
async fn foreign_key_participation_rejects_vrepl_alter() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");
    harness.db.set_fk_participation("customers", 2);
    let uuid = harness
        .submit("/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Failed);
    assert!(migration.message.contains("foreign key"));
}

// Scenario: an INSTANT-eligible ALTER on a server supporting it.
// Expected Outcome: executed directly with ALGORITHM=INSTANT under brief
// buffering; the row records the special plan and completes immediately.
#[tokio::test]
async fn instant_eligible_alter_takes_special_plan() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");
    let uuid = harness
        .submit("/*ddl: strategy=vitess*/ ALTER TABLE customers ADD COLUMN note TEXT")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert_eq!(migration.special_plan, "instant-ddl");
    assert!(migration.is_immediate_operation);
    assert!(
        harness
            .db
            .executed()
            .iter()
            .any(|sql| sql.contains("ALGORITHM=INSTANT"))
    );
    // No shadow table was ever built.
    assert!(harness.db.tables().iter().all(|t| !t.starts_with("_vt_vrp_")));
}

// Scenario: REVERT of a migration that is not the last complete migration
// on its table.
// Expected Outcome: the revert fails its precondition check.
#[tokio::test]
async fn revert_requires_last_complete_migration() {
    let harness = TestHarness::new().await;
    harness.db.add_table("customers");

    let first = harness
        .submit("/*ddl: strategy=online*/ DROP TABLE customers")
        .await;
    harness.ticks(2).await;

    harness.db.add_table("customers");
    let second = harness
        .submit("/*ddl: strategy=online*/ DROP TABLE customers")
        .await;
    harness.ticks(2).await;
    assert_eq!(
        harness.migration(&second).await.status,
        MigrationStatus::Complete
    );

    let revert_uuid = harness
        .submit(&format!(
            "/*ddl: strategy=online*/ REVERT VITESS_MIGRATION '{first}'"
        ))
        .await;
    harness.ticks(2).await;

    let revert = harness.migration(&revert_uuid).await;
    assert_eq!(revert.status, MigrationStatus::Failed);
    assert!(revert.message.contains("last complete migration"));
}

// Scenario: per-migration log files under a configured log directory.
// Expected Outcome: the submitted statement is readable via
// ShowMigrationLogs; the GC pass removes the file with the artifacts.
#[tokio::test]
async fn migration_log_written_and_collected() {
    let log_dir = tempfile::tempdir().expect("temp log dir");
    let mut config = crate::utils::test_config();
    config.log_dir = Some(log_dir.path().to_path_buf());
    let harness = crate::utils::TestHarness::with_config(config).await;
    harness.db.add_table("customers");

    let uuid = harness
        .submit("/*ddl: strategy=online*/ DROP TABLE customers")
        .await;
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert!(migration.log_path.starts_with("zone1-100:"));
    let logs = harness.executor.show_migration_logs(&uuid).await.unwrap();
    assert!(logs.contains("DROP TABLE customers"));

    harness.store.backdate_completed(&uuid, 2 * 24 * 3600);
    harness.tick().await;
    assert!(harness.executor.show_migration_logs(&uuid).await.is_err());
}

// Scenario: user throttling of one migration.
// Expected Outcome: ratio validated, forwarded to the throttler and
// persisted on the row.
#[tokio::test]
async fn throttle_ratio_is_validated_and_persisted() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;

    let err = harness
        .executor
        .throttle_migration(&uuid, 1.5, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("INVALID_ARGUMENT"));

    harness
        .executor
        .throttle_migration(&uuid, 0.5, None)
        .await
        .unwrap();
    assert_eq!(harness.migration(&uuid).await.user_throttle_ratio, 0.5);

    harness.executor.unthrottle_migration(&uuid).await.unwrap();
    assert_eq!(harness.migration(&uuid).await.user_throttle_ratio, 0.0);
}
