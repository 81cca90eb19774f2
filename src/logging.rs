use serde_json::Value;
use std::sync::Once;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::services::capabilities::ServiceLogger;

/// [`ServiceLogger`] that forwards records to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ServiceLogger for TracingLogger {
    fn info(&self, record: Value) {
        info!(target: "paidflow::service", record = %record, "service record");
    }
}

static INIT: Once = Once::new();

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call has an effect, and a
/// subscriber installed elsewhere is left in place.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
