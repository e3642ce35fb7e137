use async_trait::async_trait;
use chrono::{DateTime, Utc};
use executor_core::collab::Throttler;
use executor_core::error::DbError;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// App-scoped throttle registry for the standalone wiring. A deployment with
/// a lag throttler substitutes its own `Throttler` implementation.
#[derive(Default)]
pub struct LocalThrottler {
    ratios: Mutex<HashMap<String, (f64, Option<DateTime<Utc>>)>>,
}

impl LocalThrottler {
    pub fn new() -> Self {
        LocalThrottler::default()
    }
}

#[async_trait]
impl Throttler for LocalThrottler {
    async fn throttle_app(
        &self,
        app: &str,
        ratio: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        info!(app = %app, ratio, "throttling app");
        self.ratios
            .lock()
            .expect("throttler lock")
            .insert(app.to_string(), (ratio.clamp(0.0, 1.0), expires_at));
        Ok(())
    }

    async fn unthrottle_app(&self, app: &str) -> Result<(), DbError> {
        info!(app = %app, "unthrottling app");
        self.ratios.lock().expect("throttler lock").remove(app);
        Ok(())
    }

    async fn ratio_for(&self, app: &str) -> f64 {
        let mut ratios = self.ratios.lock().expect("throttler lock");
        match ratios.get(app) {
            Some((_, Some(expires_at))) if *expires_at <= Utc::now() => {
                ratios.remove(app);
                0.0
            }
            Some((ratio, _)) => *ratio,
            None => 0.0,
        }
    }
}
