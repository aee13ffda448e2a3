//! Process-wide `tracing` subscriber.

use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the stderr subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; only the first call installs anything.
pub fn init(default_filter: &str) {
    if INIT.get().is_some() {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // try_init: a host application may already own the global subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    let _ = INIT.set(());
}
