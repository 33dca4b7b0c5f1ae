//! Test logging helpers.
//!
//! Installs a `tracing` subscriber writing through the test harness's
//! capture, so kernel logs interleave with assertion output when a test
//! fails. Safe to call from every test; only the first call installs.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes test logging once per process.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}
