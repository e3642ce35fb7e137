use async_trait::async_trait;
use executor_core::collab::{BufferGuard, QueryBuffer};
use executor_core::error::DbError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Standalone stand-in for the query-rule subsystem: tracks buffering
/// windows in-process so the cut-over protocol keeps its acquire/release
/// shape when no external buffering component is wired in. Deployments with
/// a query service plug their own `QueryBuffer` implementation instead.
#[derive(Default)]
pub struct LocalQueryBuffer {
    buffered: Arc<Mutex<HashMap<String, Duration>>>,
}

impl LocalQueryBuffer {
    pub fn new() -> Self {
        LocalQueryBuffer::default()
    }

    pub fn is_buffered(&self, table: &str) -> bool {
        self.buffered.lock().expect("buffer lock").contains_key(table)
    }
}

struct LocalBufferGuard {
    table: String,
    buffered: Arc<Mutex<HashMap<String, Duration>>>,
    released: bool,
}

#[async_trait]
impl BufferGuard for LocalBufferGuard {
    async fn release(&mut self) {
        self.buffered.lock().expect("buffer lock").remove(&self.table);
        self.released = true;
        info!(table = %self.table, "query buffering disabled");
    }
}

impl Drop for LocalBufferGuard {
    fn drop(&mut self) {
        if !self.released {
            self.buffered.lock().expect("buffer lock").remove(&self.table);
            warn!(table = %self.table, "buffering guard dropped without release");
        }
    }
}

#[async_trait]
impl QueryBuffer for LocalQueryBuffer {
    async fn buffer_writes(
        &self,
        table: &str,
        timeout: Duration,
    ) -> Result<Box<dyn BufferGuard>, DbError> {
        self.buffered
            .lock()
            .expect("buffer lock")
            .insert(table.to_string(), timeout);
        info!(table = %table, ?timeout, "query buffering enabled");
        Ok(Box::new(LocalBufferGuard {
            table: table.to_string(),
            buffered: self.buffered.clone(),
            released: false,
        }))
    }

    async fn prepared_transactions_for(&self, _table: &str) -> Result<Vec<String>, DbError> {
        // No two-phase-commit coordinator in the standalone wiring.
        Ok(Vec::new())
    }
}
