//! Shared pieces of the demo producers.
//!
//! - [`settings`]: the TOML settings file and the collaborators it describes
//! - [`generator`]: random sample transactions for the continuous producer

pub mod generator;
pub mod settings;

use tracing_subscriber::EnvFilter;

/// Install the `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
