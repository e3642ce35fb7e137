use crate::utils::TestHarness;
use model::status::MigrationStatus;
use tracing_test::traced_test;

/// The strict stage order of the production cut-over protocol.
const EXPECTED_STAGES: [&str; 18] = [
    "starting cut-over",
    "sentry table created",
    "waiting for post-sentry pos",
    "post-sentry pos reached",
    "buffering queries",
    "graceful wait for buffering",
    "locking tables",
    "renaming tables",
    "waiting for RENAME to block",
    "RENAME found",
    "reading post-lock pos",
    "waiting for post-lock pos",
    "stopping vreplication",
    "dropping sentry table",
    "unlocking tables",
    "waiting for RENAME to complete",
    "cut-over complete",
    "re-enabling writes",
];

// Scenario: vreplication ALTER happy path.
// Expected Outcome:
// - The stages recorded on the row follow the protocol exactly.
// - The live name carries the shadow's table; the pre-image table survives
//   under an internal name; the sentry is gone.
// - The workflow is stopped (GC deletes it later); buffering is released.
#[traced_test]
#[tokio::test]
async fn vrepl_alter_cut_over_happy_path() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Running
    );

    // The stream catches up; the next tick is eligible to cut over.
    harness.vrepl.set_caught_up(uuid.as_str());
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    assert!(migration.was_ready_to_complete);
    assert_eq!(migration.progress, 100.0);

    let expected: Vec<String> = EXPECTED_STAGES.iter().map(|s| s.to_string()).collect();
    assert_eq!(harness.store.stages(&uuid), expected);

    // Post-image: live name exists; the original table survives under the
    // shadow's internal name; the sentry is gone.
    assert!(harness.db.has_table("customers"));
    let tables = harness.db.tables();
    assert_eq!(
        tables.iter().filter(|t| t.starts_with("_vt_vrp_")).count(),
        1
    );
    assert!(tables.iter().all(|t| !t.starts_with("_vt_HOLD_")));

    assert_eq!(
        harness.vrepl.stream_state(uuid.as_str()).as_deref(),
        Some("Stopped")
    );
    assert!(!harness.buffer.is_buffered("customers"));
    assert_eq!(harness.buffer.windows.lock().unwrap().len(), 1);
}

// Scenario: force cut-over with a long-running SELECT holding the table.
// Expected Outcome: the SELECT's query is KILLed and the cut-over completes.
#[traced_test]
#[tokio::test]
async fn force_cut_over_kills_blocking_query() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess options=\"--force-cut-over-after=0s\"*/ \
             ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;

    harness.db.add_process(999, "SELECT SLEEP(60) FROM customers");
    harness.db.add_process(998, "SELECT 1 FROM orders");
    harness.vrepl.set_caught_up(uuid.as_str());
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Complete);
    let kills = harness.db.kills();
    assert!(kills.contains(&"KILL QUERY 999".to_string()), "{kills:?}");
    // The unrelated query survives.
    assert!(!kills.contains(&"KILL QUERY 998".to_string()), "{kills:?}");
}

// Scenario: the stream is caught up on position and lag but row copy still
// has outstanding ranges.
// Expected Outcome: not ready to complete; no cut-over attempt is made.
#[tokio::test]
async fn outstanding_copy_state_defers_cut_over() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    harness.vrepl.set_caught_up(uuid.as_str());
    harness.vrepl.set_copy_rows_remaining(uuid.as_str(), 3);
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Running);
    assert!(!migration.ready_to_complete);
    assert_eq!(migration.cutover_attempts, 0);
    assert!(harness.store.stages(&uuid).is_empty());
}

// Scenario: --postpone-completion on a caught-up migration, then
// CompleteMigration.
// Expected Outcome: the migration holds at running/ready-to-complete until
// completion is requested, then cuts over.
#[tokio::test]
async fn postpone_completion_holds_cut_over() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess options=\"--postpone-completion\"*/ \
             ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    harness.vrepl.set_caught_up(uuid.as_str());
    harness.ticks(2).await;

    let migration = harness.migration(&uuid).await;
    assert_eq!(migration.status, MigrationStatus::Running);
    assert!(migration.ready_to_complete);
    assert!(migration.was_ready_to_complete);
    assert_eq!(migration.cutover_attempts, 0);

    harness.executor.complete_migration(&uuid).await.unwrap();
    harness.ticks(2).await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Complete
    );
}

// Scenario: REVERT of a completed vreplication ALTER.
// Expected Outcome: a revert workflow starts from the stored position onto
// the preserved pre-image table, and its own cut-over completes.
#[traced_test]
#[tokio::test]
async fn revert_of_vrepl_alter_runs_reverse_workflow() {
    let harness = TestHarness::new().await;
    let uuid = harness
        .run_vrepl_alter(
            "customers",
            "/*ddl: strategy=vitess*/ ALTER TABLE customers ENGINE=InnoDB",
        )
        .await;
    harness.vrepl.set_caught_up(uuid.as_str());
    harness.ticks(2).await;
    assert_eq!(
        harness.migration(&uuid).await.status,
        MigrationStatus::Complete
    );

    // The revert stream starts from the stored position; with no rows to
    // copy it becomes ready almost immediately and cuts over.
    let revert_uuid = harness
        .submit(&format!(
            "/*ddl: strategy=online*/ REVERT VITESS_MIGRATION '{uuid}'"
        ))
        .await;
    harness.ticks(3).await;

    let revert = harness.migration(&revert_uuid).await;
    assert_eq!(revert.status, MigrationStatus::Complete);
    assert!(harness.vrepl.has_stream(revert_uuid.as_str()));
    assert!(harness.db.has_table("customers"));
}
