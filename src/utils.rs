//! Utility functions for identifiers and logging
use super::config::LogConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid7::uuid7;

// transaction ids are the sha256 of the key followed by a fresh uuid7, hex encoded
pub fn new_tx_id(key: &str) -> String {
    let mut seed = key.as_bytes().to_vec();
    seed.extend_from_slice(uuid7().as_bytes());
    sha256::digest(&seed)
}

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
