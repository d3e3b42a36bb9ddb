//! Tracing subscriber setup.
//!
//! Filter defaults to `info`; override with `RUST_LOG`
//! (e.g. `RUST_LOG=multimodal_rag=debug,tower_http=debug`). Output goes to
//! stderr so `mmrag ask` keeps stdout for the answer.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // Ignore a second initialisation (tests may call this more than once).
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
