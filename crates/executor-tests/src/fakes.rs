//! In-memory stand-ins for the executor's collaborators. The fake database
//! interprets just enough DDL (CREATE/DROP/RENAME/ALTER/LOCK) to exercise
//! the real handler and cut-over flows against a table catalog.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use executor_core::collab::{
    BufferGuard, ConnectionPool, DbaConn, ProcessInfo, QueryBuffer, TabletManager, Throttler,
    VReplClient, VReplStream, WorkflowSpec,
};
use executor_core::error::{DbError, ER_NO_SUCH_TABLE};
use executor_core::store::{
    AnalysisUpdate, MetadataStore, MigrationFilter, ProgressUpdate, ReviewUpdate,
};
use model::migration::Migration;
use model::row::SqlRow;
use model::status::MigrationStatus;
use model::uuid::OnlineDdlUuid;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Metadata store
// ---------------------------------------------------------------------------

/// `schema_migrations` over a Vec; insertion order stands in for the id
/// column. Also records the stage history per migration so tests can assert
/// the cut-over sequence.
#[derive(Default)]
pub struct MemoryMetadataStore {
    rows: Mutex<Vec<Migration>>,
    stage_history: Mutex<HashMap<OnlineDdlUuid, Vec<String>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        MemoryMetadataStore::default()
    }

    fn update<F>(&self, uuid: &OnlineDdlUuid, mutate: F) -> u64
    where
        F: FnOnce(&mut Migration),
    {
        let mut rows = self.rows.lock().expect("rows lock");
        match rows.iter_mut().find(|m| &m.uuid == uuid) {
            Some(migration) => {
                mutate(migration);
                1
            }
            None => 0,
        }
    }

    pub fn stages(&self, uuid: &OnlineDdlUuid) -> Vec<String> {
        self.stage_history
            .lock()
            .expect("stage lock")
            .get(uuid)
            .cloned()
            .unwrap_or_default()
    }

    /// Shifts a terminal row's completion into the past so retention
    /// windows elapse without waiting.
    pub fn backdate_completed(&self, uuid: &OnlineDdlUuid, seconds: i64) {
        self.update(uuid, |m| {
            if let Some(ts) = m.completed_timestamp {
                m.completed_timestamp = Some(ts - ChronoDuration::seconds(seconds));
            }
        });
    }

    /// Ages a running row's liveness attestation.
    pub fn backdate_liveness(&self, uuid: &OnlineDdlUuid, seconds: i64) {
        let past = Utc::now() - ChronoDuration::seconds(seconds);
        self.update(uuid, |m| {
            m.liveness_timestamp = Some(past);
            m.started_timestamp = Some(past);
        });
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn init_schema(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn insert_migration(&self, migration: &Migration) -> Result<(), DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        if rows.iter().any(|m| m.uuid == migration.uuid) {
            return Err(DbError::server(1062, "duplicate migration uuid"));
        }
        rows.push(migration.clone());
        Ok(())
    }

    async fn read_migration(&self, uuid: &OnlineDdlUuid) -> Result<Option<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .find(|m| &m.uuid == uuid)
            .cloned())
    }

    async fn pending_migrations(&self) -> Result<Vec<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect())
    }

    async fn migrations_by_status(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| m.status == status)
            .cloned()
            .collect())
    }

    async fn unreviewed_migrations(&self) -> Result<Vec<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| m.status == MigrationStatus::Queued && m.reviewed_timestamp.is_none())
            .cloned()
            .collect())
    }

    async fn show_migrations(&self, filter: &MigrationFilter) -> Result<Vec<Migration>, DbError> {
        let rows = self.rows.lock().expect("rows lock");
        Ok(match filter {
            MigrationFilter::All | MigrationFilter::Recent => rows.clone(),
            MigrationFilter::Status(status) => {
                rows.iter().filter(|m| m.status == *status).cloned().collect()
            }
            MigrationFilter::Uuid(uuid) => {
                rows.iter().filter(|m| &m.uuid == uuid).cloned().collect()
            }
            MigrationFilter::Context(context) => rows
                .iter()
                .filter(|m| &m.migration_context == context)
                .cloned()
                .collect(),
        })
    }

    async fn last_complete_on_table(&self, table: &str) -> Result<Option<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| m.status == MigrationStatus::Complete && m.mysql_table == table)
            .cloned()
            .last())
    }

    async fn terminal_failures_in_context(
        &self,
        context: &str,
    ) -> Result<Vec<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| {
                matches!(
                    m.status,
                    MigrationStatus::Failed | MigrationStatus::Cancelled
                ) && m.migration_context == context
            })
            .cloned()
            .collect())
    }

    async fn tablet_failure_migrations(
        &self,
        own_alias: &str,
    ) -> Result<Vec<Migration>, DbError> {
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| {
                m.status == MigrationStatus::Failed && m.tablet_failed && m.tablet != own_alias
            })
            .cloned()
            .collect())
    }

    async fn artifact_cleanup_candidates(
        &self,
        default_retention_seconds: i64,
    ) -> Result<Vec<Migration>, DbError> {
        let now = Utc::now();
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .filter(|m| {
                if !m.is_terminal() || m.cleanup_timestamp.is_some() {
                    return false;
                }
                let retention = if m.retain_artifacts_seconds > 0 {
                    m.retain_artifacts_seconds
                } else {
                    default_retention_seconds
                };
                m.completed_timestamp
                    .map(|completed| completed <= now - ChronoDuration::seconds(retention))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn set_reviewed(
        &self,
        uuid: &OnlineDdlUuid,
        update: &ReviewUpdate,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.ddl_action = update.ddl_action;
            m.mysql_table = update.mysql_table.clone();
            m.is_view = update.is_view;
            m.is_immediate_operation = update.is_immediate_operation;
            m.reviewed_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_ready(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.status = MigrationStatus::Ready;
            m.ready_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_running(&self, uuid: &OnlineDdlUuid, tablet_alias: &str) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.status = MigrationStatus::Running;
            m.tablet = tablet_alias.to_string();
            if m.started_timestamp.is_none() {
                m.started_timestamp = Some(Utc::now());
            }
            m.liveness_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn mark_terminal(
        &self,
        uuid: &OnlineDdlUuid,
        status: MigrationStatus,
        message: &str,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.status = status;
            m.message = message.to_string();
            if m.started_timestamp.is_none() {
                m.started_timestamp = Some(Utc::now());
            }
            m.completed_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn retry_migration(
        &self,
        uuid: &OnlineDdlUuid,
        tablet_alias: &str,
    ) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        match rows
            .iter_mut()
            .find(|m| &m.uuid == uuid && m.is_terminal())
        {
            Some(m) => {
                m.status = MigrationStatus::Queued;
                m.tablet = tablet_alias.to_string();
                m.retries += 1;
                m.tablet_failed = false;
                m.message.clear();
                m.ready_timestamp = None;
                m.started_timestamp = None;
                m.liveness_timestamp = None;
                m.completed_timestamp = None;
                m.cleanup_timestamp = None;
                m.cancelled_timestamp = None;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_message(&self, uuid: &OnlineDdlUuid, message: &str) -> Result<(), DbError> {
        self.update(uuid, |m| m.message = message.to_string());
        Ok(())
    }

    async fn update_stage(&self, uuid: &OnlineDdlUuid, stage: &str) -> Result<(), DbError> {
        self.update(uuid, |m| m.stage = stage.to_string());
        self.stage_history
            .lock()
            .expect("stage lock")
            .entry(uuid.clone())
            .or_default()
            .push(stage.to_string());
        Ok(())
    }

    async fn touch_liveness(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| m.liveness_timestamp = Some(Utc::now()));
        Ok(())
    }

    async fn update_progress(
        &self,
        uuid: &OnlineDdlUuid,
        update: &ProgressUpdate,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.rows_copied = update.rows_copied;
            m.table_rows = update.table_rows;
            m.progress = update.progress;
            m.eta_seconds = update.eta_seconds;
            m.vreplication_lag_seconds = update.vreplication_lag_seconds;
            m.vitess_liveness_indicator = update.vitess_liveness_indicator;
        });
        Ok(())
    }

    async fn write_analysis(
        &self,
        uuid: &OnlineDdlUuid,
        update: &AnalysisUpdate,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.added_unique_keys = update.added_unique_keys;
            m.removed_unique_keys = update.removed_unique_keys;
            m.removed_unique_key_names = update.removed_unique_key_names.clone();
            m.removed_foreign_key_names = update.removed_foreign_key_names.clone();
            m.dropped_no_default_column_names = update.dropped_no_default_column_names.clone();
            m.expanded_column_names = update.expanded_column_names.clone();
            m.revertible_notes = update.revertible_notes.clone();
        });
        Ok(())
    }

    async fn set_ready_to_complete(
        &self,
        uuid: &OnlineDdlUuid,
        ready: bool,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.ready_to_complete = ready;
            if ready {
                m.was_ready_to_complete = true;
                if m.ready_to_complete_timestamp.is_none() {
                    m.ready_to_complete_timestamp = Some(Utc::now());
                }
            }
        });
        Ok(())
    }

    async fn set_cancelled_timestamp(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| m.cancelled_timestamp = Some(Utc::now()));
        Ok(())
    }

    async fn clear_postpone_completion(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        match rows
            .iter_mut()
            .find(|m| &m.uuid == uuid && m.is_pending() && m.postpone_completion)
        {
            Some(m) => {
                m.postpone_completion = false;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn clear_postpone_launch(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        match rows.iter_mut().find(|m| {
            &m.uuid == uuid && m.status == MigrationStatus::Queued && m.postpone_launch
        }) {
            Some(m) => {
                m.postpone_launch = false;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_force_cutover(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        match rows.iter_mut().find(|m| &m.uuid == uuid && m.is_pending()) {
            Some(m) => {
                m.force_cutover = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn set_cutover_threshold_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| m.cutover_threshold_seconds = seconds);
        Ok(())
    }

    async fn set_retain_artifacts_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| m.retain_artifacts_seconds = seconds);
        Ok(())
    }

    async fn increment_cutover_attempts(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.cutover_attempts += 1;
            m.last_cutover_attempt_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn set_artifacts(&self, uuid: &OnlineDdlUuid, artifacts: &str) -> Result<(), DbError> {
        self.update(uuid, |m| m.artifacts = artifacts.to_string());
        Ok(())
    }

    async fn set_special_plan(&self, uuid: &OnlineDdlUuid, plan: &str) -> Result<(), DbError> {
        self.update(uuid, |m| m.special_plan = plan.to_string());
        Ok(())
    }

    async fn set_shadow_analyzed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| m.shadow_analyzed_timestamp = Some(Utc::now()));
        Ok(())
    }

    async fn set_user_throttle_ratio(
        &self,
        uuid: &OnlineDdlUuid,
        ratio: f64,
    ) -> Result<(), DbError> {
        self.update(uuid, |m| m.user_throttle_ratio = ratio);
        Ok(())
    }

    async fn set_tablet(&self, uuid: &OnlineDdlUuid, tablet_alias: &str) -> Result<(), DbError> {
        self.update(uuid, |m| {
            m.tablet = tablet_alias.to_string();
            m.liveness_timestamp = Some(Utc::now());
        });
        Ok(())
    }

    async fn set_tablet_failed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| m.tablet_failed = true);
        Ok(())
    }

    async fn stamp_cleanup(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.update(uuid, |m| m.cleanup_timestamp = Some(Utc::now()));
        Ok(())
    }

    async fn fix_completed_timestamps(&self) -> Result<u64, DbError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let mut fixed = 0;
        for m in rows.iter_mut() {
            if m.is_terminal() && m.completed_timestamp.is_none() {
                m.completed_timestamp = Some(Utc::now());
                fixed += 1;
            }
        }
        Ok(fixed)
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Shared catalog behind the fake pool and its connections.
#[derive(Default)]
pub struct FakeDbState {
    tables: Mutex<HashSet<String>>,
    executed: Mutex<Vec<String>>,
    process_list: Mutex<Vec<ProcessInfo>>,
    kills: Mutex<Vec<String>>,
    locked: Mutex<bool>,
    unlock_notify: Notify,
    show_create: Mutex<HashMap<String, String>>,
    variables: Mutex<HashMap<String, String>>,
    auto_increments: Mutex<HashMap<String, u64>>,
    estimated_rows: Mutex<HashMap<String, i64>>,
    fk_participation: Mutex<HashMap<String, u64>>,
    lock_holders: Mutex<Vec<u64>>,
    position_counter: AtomicU64,
}

fn strip_quotes(token: &str) -> String {
    token.trim_matches(|c| c == '`' || c == ',' || c == ';').to_string()
}

impl FakeDbState {
    /// Naive DDL interpreter covering the statements the executor emits.
    fn apply(&self, sql: &str) -> Result<(), DbError> {
        self.executed.lock().expect("executed lock").push(sql.to_string());
        let upper = sql.trim().to_ascii_uppercase();
        let tokens: Vec<String> = sql.split_whitespace().map(|t| t.to_string()).collect();

        if upper.starts_with("CREATE TABLE") {
            let mut index = 2;
            if upper.starts_with("CREATE TABLE IF NOT EXISTS") {
                index = 5;
            }
            let name_token = tokens.get(index).map(|t| {
                t.split('(').next().unwrap_or(t).to_string()
            });
            if let Some(name) = name_token {
                let name = strip_quotes(&name);
                let mut tables = self.tables.lock().expect("tables lock");
                if tables.contains(&name) && index == 2 {
                    return Err(DbError::server(1050, format!("Table '{name}' already exists")));
                }
                tables.insert(name);
            }
            return Ok(());
        }
        if upper.starts_with("CREATE OR REPLACE VIEW") || upper.starts_with("CREATE VIEW") {
            let index = if upper.starts_with("CREATE OR REPLACE VIEW") { 4 } else { 2 };
            if let Some(name) = tokens.get(index) {
                self.tables.lock().expect("tables lock").insert(strip_quotes(name));
            }
            return Ok(());
        }
        if upper.starts_with("DROP TABLE") || upper.starts_with("DROP VIEW") {
            let if_exists = upper.contains("IF EXISTS");
            let index = if if_exists { 4 } else { 2 };
            if let Some(name) = tokens.get(index) {
                let name = strip_quotes(name);
                let removed = self.tables.lock().expect("tables lock").remove(&name);
                if !removed && !if_exists {
                    return Err(DbError::server(
                        ER_NO_SUCH_TABLE,
                        format!("Unknown table '{name}'"),
                    ));
                }
            }
            return Ok(());
        }
        if upper.starts_with("RENAME TABLE") {
            return self.apply_rename(sql);
        }
        if upper.starts_with("ALTER TABLE") {
            if let Some(name) = tokens.get(2) {
                let name = strip_quotes(name);
                if !self.tables.lock().expect("tables lock").contains(&name) {
                    return Err(DbError::server(
                        ER_NO_SUCH_TABLE,
                        format!("Table '{name}' doesn't exist"),
                    ));
                }
            }
            return Ok(());
        }
        if upper.starts_with("LOCK TABLES") {
            *self.locked.lock().expect("lock lock") = true;
            return Ok(());
        }
        if upper.starts_with("UNLOCK TABLES") {
            *self.locked.lock().expect("lock lock") = false;
            self.unlock_notify.notify_waiters();
            return Ok(());
        }
        // ANALYZE, SET, KILL and friends are recorded but have no catalog
        // effect.
        Ok(())
    }

    /// `RENAME TABLE a TO b, c TO d, ...` applied pair by pair, left to
    /// right, mirroring the server.
    fn apply_rename(&self, sql: &str) -> Result<(), DbError> {
        let body = sql.trim()["RENAME TABLE".len()..].to_string();
        let mut tables = self.tables.lock().expect("tables lock");
        for pair in body.split(',') {
            let parts: Vec<&str> = pair.split_whitespace().collect();
            let [from, to_kw, to] = parts.as_slice() else {
                return Err(DbError::Other(format!("malformed RENAME pair: {pair}")));
            };
            if !to_kw.eq_ignore_ascii_case("TO") {
                return Err(DbError::Other(format!("malformed RENAME pair: {pair}")));
            }
            let from = strip_quotes(from);
            let to = strip_quotes(to);
            if !tables.remove(&from) {
                return Err(DbError::server(
                    ER_NO_SUCH_TABLE,
                    format!("Table '{from}' doesn't exist"),
                ));
            }
            if !tables.insert(to.clone()) {
                return Err(DbError::server(1050, format!("Table '{to}' already exists")));
            }
        }
        Ok(())
    }
}

/// A fake dedicated connection. A RENAME issued while the catalog is locked
/// parks in the process list until UNLOCK TABLES, like the real thing.
pub struct FakeConn {
    id: u64,
    state: Arc<FakeDbState>,
}

#[async_trait]
impl DbaConn for FakeConn {
    fn connection_id(&self) -> u64 {
        self.id
    }

    async fn exec(&mut self, sql: &str) -> Result<(), DbError> {
        if sql.trim().to_ascii_uppercase().starts_with("RENAME TABLE")
            && *self.state.locked.lock().expect("lock lock")
        {
            self.state
                .process_list
                .lock()
                .expect("process lock")
                .push(ProcessInfo {
                    id: self.id,
                    user: "executor".to_string(),
                    command: "Query".to_string(),
                    state: "Waiting for table metadata lock".to_string(),
                    time: 0,
                    info: Some(sql.to_string()),
                });
            loop {
                let notified = self.state.unlock_notify.notified();
                if !*self.state.locked.lock().expect("lock lock") {
                    break;
                }
                notified.await;
            }
            self.state
                .process_list
                .lock()
                .expect("process lock")
                .retain(|p| p.id != self.id);
        }
        self.state.apply(sql)
    }

    async fn query_rows(&mut self, _sql: &str) -> Result<Vec<SqlRow>, DbError> {
        Ok(Vec::new())
    }
}

/// The fake pool: a shared catalog plus scripted server facts.
pub struct FakePool {
    pub state: Arc<FakeDbState>,
    next_conn_id: AtomicU64,
}

impl Default for FakePool {
    fn default() -> Self {
        let pool = FakePool {
            state: Arc::new(FakeDbState::default()),
            next_conn_id: AtomicU64::new(100),
        };
        pool.set_variable("version", "8.0.36");
        pool
    }
}

impl FakePool {
    pub fn new() -> Self {
        FakePool::default()
    }

    pub fn add_table(&self, name: &str) {
        self.state.tables.lock().expect("tables lock").insert(name.to_string());
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.tables.lock().expect("tables lock").contains(name)
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self
            .state
            .tables
            .lock()
            .expect("tables lock")
            .iter()
            .cloned()
            .collect();
        tables.sort();
        tables
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().expect("executed lock").clone()
    }

    pub fn kills(&self) -> Vec<String> {
        self.state.kills.lock().expect("kills lock").clone()
    }

    pub fn set_variable(&self, name: &str, value: &str) {
        self.state
            .variables
            .lock()
            .expect("variables lock")
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_show_create(&self, table: &str, sql: &str) {
        self.state
            .show_create
            .lock()
            .expect("show create lock")
            .insert(table.to_string(), sql.to_string());
    }

    pub fn set_fk_participation(&self, table: &str, count: u64) {
        self.state
            .fk_participation
            .lock()
            .expect("fk lock")
            .insert(table.to_string(), count);
    }

    pub fn add_process(&self, id: u64, info: &str) {
        self.state
            .process_list
            .lock()
            .expect("process lock")
            .push(ProcessInfo {
                id,
                user: "app".to_string(),
                command: "Query".to_string(),
                state: "executing".to_string(),
                time: 10,
                info: Some(info.to_string()),
            });
    }
}

#[async_trait]
impl ConnectionPool for FakePool {
    async fn exec(&self, sql: &str) -> Result<(), DbError> {
        self.state.apply(sql)
    }

    async fn query_rows(&self, _sql: &str) -> Result<Vec<SqlRow>, DbError> {
        Ok(Vec::new())
    }

    async fn acquire(&self) -> Result<Box<dyn DbaConn>, DbError> {
        Ok(Box::new(FakeConn {
            id: self.next_conn_id.fetch_add(1, Ordering::SeqCst),
            state: self.state.clone(),
        }))
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DbError> {
        Ok(self.has_table(table))
    }

    async fn show_create(&self, table: &str) -> Result<String, DbError> {
        if !self.has_table(table) {
            return Err(DbError::server(
                ER_NO_SUCH_TABLE,
                format!("Table '{table}' doesn't exist"),
            ));
        }
        Ok(self
            .state
            .show_create
            .lock()
            .expect("show create lock")
            .get(table)
            .cloned()
            .unwrap_or_else(|| {
                format!("CREATE TABLE `{table}` (id INT NOT NULL, PRIMARY KEY (id))")
            }))
    }

    async fn primary_position(&self) -> Result<String, DbError> {
        let n = self.state.position_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("00000000-0000-0000-0000-000000000000:1-{}", n + 1))
    }

    async fn global_variable(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .state
            .variables
            .lock()
            .expect("variables lock")
            .get(name)
            .cloned())
    }

    async fn table_auto_increment(&self, table: &str) -> Result<Option<u64>, DbError> {
        Ok(self
            .state
            .auto_increments
            .lock()
            .expect("auto inc lock")
            .get(table)
            .copied())
    }

    async fn table_estimated_rows(&self, table: &str) -> Result<i64, DbError> {
        Ok(self
            .state
            .estimated_rows
            .lock()
            .expect("rows lock")
            .get(table)
            .copied()
            .unwrap_or(0))
    }

    async fn foreign_key_participation(&self, table: &str) -> Result<u64, DbError> {
        Ok(self
            .state
            .fk_participation
            .lock()
            .expect("fk lock")
            .get(table)
            .copied()
            .unwrap_or(0))
    }

    async fn process_list(&self) -> Result<Vec<ProcessInfo>, DbError> {
        Ok(self.state.process_list.lock().expect("process lock").clone())
    }

    async fn kill_query(&self, connection_id: u64) -> Result<(), DbError> {
        self.state
            .kills
            .lock()
            .expect("kills lock")
            .push(format!("KILL QUERY {connection_id}"));
        self.state
            .process_list
            .lock()
            .expect("process lock")
            .retain(|p| p.id != connection_id);
        Ok(())
    }

    async fn kill_connection(&self, connection_id: u64) -> Result<(), DbError> {
        self.state
            .kills
            .lock()
            .expect("kills lock")
            .push(format!("KILL {connection_id}"));
        self.state
            .process_list
            .lock()
            .expect("process lock")
            .retain(|p| p.id != connection_id);
        Ok(())
    }

    async fn lock_holders(&self, _table: &str) -> Result<Vec<u64>, DbError> {
        Ok(self.state.lock_holders.lock().expect("holders lock").clone())
    }
}

// ---------------------------------------------------------------------------
// VReplication
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeVRepl {
    streams: Mutex<HashMap<String, VReplStream>>,
    copy_rows: Mutex<HashMap<i64, u64>>,
    terminal_errors: Mutex<HashMap<i64, String>>,
    next_id: AtomicI64,
}

impl FakeVRepl {
    pub fn new() -> Self {
        FakeVRepl {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn mutate_stream<F>(&self, workflow: &str, mutate: F)
    where
        F: FnOnce(&mut VReplStream),
    {
        if let Some(stream) = self.streams.lock().expect("streams lock").get_mut(workflow) {
            mutate(stream);
        }
    }

    /// Simulates a fully caught-up stream: position set, zero lag, row copy
    /// finished.
    pub fn set_caught_up(&self, workflow: &str) {
        let now = Utc::now().timestamp();
        self.mutate_stream(workflow, |stream| {
            stream.pos = "00000000-0000-0000-0000-000000000000:1-100".to_string();
            stream.transaction_timestamp = now;
            stream.time_updated = now;
            stream.state = "Running".to_string();
        });
    }

    pub fn set_copy_rows_remaining(&self, workflow: &str, remaining: u64) {
        let streams = self.streams.lock().expect("streams lock");
        if let Some(stream) = streams.get(workflow) {
            self.copy_rows
                .lock()
                .expect("copy lock")
                .insert(stream.id, remaining);
        }
    }

    pub fn set_terminal_error(&self, workflow: &str, message: &str) {
        let streams = self.streams.lock().expect("streams lock");
        if let Some(stream) = streams.get(workflow) {
            self.terminal_errors
                .lock()
                .expect("terminal lock")
                .insert(stream.id, message.to_string());
        }
    }

    pub fn stream_state(&self, workflow: &str) -> Option<String> {
        self.streams
            .lock()
            .expect("streams lock")
            .get(workflow)
            .map(|s| s.state.clone())
    }

    pub fn has_stream(&self, workflow: &str) -> bool {
        self.streams.lock().expect("streams lock").contains_key(workflow)
    }
}

#[async_trait]
impl VReplClient for FakeVRepl {
    async fn create_workflow(&self, spec: &WorkflowSpec) -> Result<i64, DbError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now().timestamp();
        self.streams.lock().expect("streams lock").insert(
            spec.workflow.clone(),
            VReplStream {
                id,
                workflow: spec.workflow.clone(),
                source_table: spec.source_table.clone(),
                target_table: spec.target_table.clone(),
                pos: spec.revert_binlog_pos.clone().unwrap_or_default(),
                state: "Init".to_string(),
                message: String::new(),
                rows_copied: 0,
                time_updated: now,
                transaction_timestamp: now,
            },
        );
        Ok(id)
    }

    async fn start_workflow(&self, workflow: &str) -> Result<(), DbError> {
        self.mutate_stream(workflow, |stream| {
            stream.state = "Running".to_string();
            stream.message.clear();
        });
        Ok(())
    }

    async fn stop_workflow(&self, workflow: &str, message: &str) -> Result<(), DbError> {
        let message = message.to_string();
        self.mutate_stream(workflow, move |stream| {
            stream.state = "Stopped".to_string();
            stream.message = message;
        });
        Ok(())
    }

    async fn delete_workflow(&self, workflow: &str) -> Result<(), DbError> {
        self.streams.lock().expect("streams lock").remove(workflow);
        Ok(())
    }

    async fn read_stream(&self, workflow: &str) -> Result<Option<VReplStream>, DbError> {
        Ok(self.streams.lock().expect("streams lock").get(workflow).cloned())
    }

    async fn copy_state_row_count(&self, stream_id: i64) -> Result<u64, DbError> {
        Ok(self
            .copy_rows
            .lock()
            .expect("copy lock")
            .get(&stream_id)
            .copied()
            .unwrap_or(0))
    }

    async fn terminal_log_error(&self, stream_id: i64) -> Result<Option<String>, DbError> {
        Ok(self
            .terminal_errors
            .lock()
            .expect("terminal lock")
            .get(&stream_id)
            .cloned())
    }

    async fn wait_for_pos(
        &self,
        _stream_id: i64,
        _pos: &str,
        _timeout: Duration,
    ) -> Result<(), DbError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Remaining collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTabletManager {
    pub reload_schema_calls: AtomicU64,
    pub gc_check_calls: AtomicU64,
}

#[async_trait]
impl TabletManager for FakeTabletManager {
    async fn reload_schema(&self) -> Result<(), DbError> {
        self.reload_schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_state(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn request_gc_check(&self) -> Result<(), DbError> {
        self.gc_check_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeThrottler {
    ratios: Mutex<HashMap<String, f64>>,
}

impl FakeThrottler {
    pub fn set_ratio(&self, app: &str, ratio: f64) {
        self.ratios.lock().expect("ratios lock").insert(app.to_string(), ratio);
    }
}

#[async_trait]
impl Throttler for FakeThrottler {
    async fn throttle_app(
        &self,
        app: &str,
        ratio: f64,
        _expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), DbError> {
        self.set_ratio(app, ratio);
        Ok(())
    }

    async fn unthrottle_app(&self, app: &str) -> Result<(), DbError> {
        self.ratios.lock().expect("ratios lock").remove(app);
        Ok(())
    }

    async fn ratio_for(&self, app: &str) -> f64 {
        self.ratios
            .lock()
            .expect("ratios lock")
            .get(app)
            .copied()
            .unwrap_or(0.0)
    }
}

struct FakeBufferGuard {
    table: String,
    active: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl BufferGuard for FakeBufferGuard {
    async fn release(&mut self) {
        self.active.lock().expect("buffer lock").remove(&self.table);
    }
}

#[derive(Default)]
pub struct FakeBuffer {
    active: Arc<Mutex<HashSet<String>>>,
    pub windows: Mutex<Vec<(String, Duration)>>,
    pub prepared: Mutex<Vec<String>>,
}

impl FakeBuffer {
    pub fn is_buffered(&self, table: &str) -> bool {
        self.active.lock().expect("buffer lock").contains(table)
    }
}

#[async_trait]
impl QueryBuffer for FakeBuffer {
    async fn buffer_writes(
        &self,
        table: &str,
        timeout: Duration,
    ) -> Result<Box<dyn BufferGuard>, DbError> {
        self.active.lock().expect("buffer lock").insert(table.to_string());
        self.windows
            .lock()
            .expect("windows lock")
            .push((table.to_string(), timeout));
        Ok(Box::new(FakeBufferGuard {
            table: table.to_string(),
            active: self.active.clone(),
        }))
    }

    async fn prepared_transactions_for(&self, _table: &str) -> Result<Vec<String>, DbError> {
        Ok(self.prepared.lock().expect("prepared lock").clone())
    }
}
