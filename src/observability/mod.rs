//! Logging setup
//!
//! Installs the global `tracing` subscriber for the `blob-sink` binary.
//! Library code only emits events; it never installs a subscriber.

pub mod config;

pub use config::{LogConfig, LogFormat};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Returns an error if a subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
}
