use tokio_util::sync::CancellationToken;
use tracing::info;

/// Flips the cancellation token on SIGINT/SIGTERM so the executor can close
/// cleanly.
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel: CancellationToken) -> Self {
        ShutdownCoordinator { cancel }
    }

    pub fn register_handlers(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                )
                .expect("install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                info!("received SIGINT");
            }
            cancel.cancel();
        });
    }
}
