use crate::fakes::{
    FakeBuffer, FakePool, FakeTabletManager, FakeThrottler, FakeVRepl, MemoryMetadataStore,
};
use executor_core::config::ExecutorConfig;
use executor_runtime::Executor;
use model::migration::Migration;
use model::status::TabletType;
use model::uuid::OnlineDdlUuid;
use std::sync::Arc;
use std::time::Duration;

/// One executor wired to in-memory fakes, plus handles onto every fake for
/// scripting and assertions.
pub struct TestHarness {
    pub executor: Arc<Executor>,
    pub store: Arc<MemoryMetadataStore>,
    pub db: Arc<FakePool>,
    pub vrepl: Arc<FakeVRepl>,
    pub tablets: Arc<FakeTabletManager>,
    pub throttler: Arc<FakeThrottler>,
    pub buffer: Arc<FakeBuffer>,
}

pub fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        keyspace: "commerce".to_string(),
        shard: "0".to_string(),
        tablet_alias: "zone1-100".to_string(),
        mysql_schema: "vt_commerce".to_string(),
        // Long enough that the periodic timer stays out of the tests' way.
        check_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ExecutorConfig) -> Self {
        let store = Arc::new(MemoryMetadataStore::new());
        let db = Arc::new(FakePool::new());
        let vrepl = Arc::new(FakeVRepl::new());
        let tablets = Arc::new(FakeTabletManager::default());
        let throttler = Arc::new(FakeThrottler::default());
        let buffer = Arc::new(FakeBuffer::default());
        let executor = Executor::new(
            config,
            store.clone(),
            db.clone(),
            vrepl.clone(),
            tablets.clone(),
            throttler.clone(),
            buffer.clone(),
        );
        executor
            .open(TabletType::Primary)
            .await
            .expect("open executor");
        TestHarness {
            executor,
            store,
            db,
            vrepl,
            tablets,
            throttler,
            buffer,
        }
    }

    pub async fn submit(&self, statement: &str) -> OnlineDdlUuid {
        self.executor.submit(statement).await.expect("submit migration")
    }

    /// One explicit tick; background handler tasks get a breath to finish.
    pub async fn tick(&self) {
        self.executor.run_tick().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pub async fn ticks(&self, count: usize) {
        for _ in 0..count {
            self.tick().await;
        }
    }

    pub async fn migration(&self, uuid: &OnlineDdlUuid) -> Migration {
        use executor_core::store::MetadataStore;
        self.store
            .read_migration(uuid)
            .await
            .expect("read migration")
            .expect("migration exists")
    }

    /// Drives a vreplication ALTER to `running` with a live stream: submit,
    /// review/schedule/run, then report the stream as caught up.
    pub async fn run_vrepl_alter(&self, table: &str, statement: &str) -> OnlineDdlUuid {
        self.db.add_table(table);
        let uuid = self.submit(statement).await;
        self.ticks(2).await;
        uuid
    }
}
