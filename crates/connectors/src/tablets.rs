use async_trait::async_trait;
use executor_core::collab::TabletManager;
use executor_core::error::DbError;
use tracing::info;

/// Tablet-manager stand-in for single-node deployments: the RPCs are
/// acknowledged locally. Managed topologies wire the real RPC client.
#[derive(Default)]
pub struct LocalTabletManager;

impl LocalTabletManager {
    pub fn new() -> Self {
        LocalTabletManager
    }
}

#[async_trait]
impl TabletManager for LocalTabletManager {
    async fn reload_schema(&self) -> Result<(), DbError> {
        info!("schema reload requested");
        Ok(())
    }

    async fn refresh_state(&self) -> Result<(), DbError> {
        info!("state refresh requested");
        Ok(())
    }

    async fn request_gc_check(&self) -> Result<(), DbError> {
        info!("table GC check requested");
        Ok(())
    }
}
