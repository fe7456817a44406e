//! Process-wide tracing setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tabweld=info"));
        // Another subscriber (e.g. a test harness) may already be installed.
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}
