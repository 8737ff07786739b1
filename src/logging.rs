//! Log output setup for the binaries and tests

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global fmt subscriber
///
/// `RUST_LOG` takes precedence over `default_directive` (for example
/// `"info"` or `"tls_rendezvous=debug"`). Calling this twice is an error
/// reported by the subscriber, not a panic.
pub fn init(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

static INIT_TEST_LOGGING: Once = Once::new();

/// Route log output through the test harness' captured writer
pub fn init_test_logging() {
    INIT_TEST_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}
