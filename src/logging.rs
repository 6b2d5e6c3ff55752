/*!
 * @file logging.rs
 * @brief Structured logging setup
 */

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber the first time it is called.
/// Safe to call from every test; subsequent calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mongo_mock_server=info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
