//! keymux daemon
//!
//! Multiplexes events from the configured capture devices into a single
//! virtual input device, rewriting codes along the way.

mod capability;
mod device;
mod injector;
mod remapper;
mod supervisor;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use keymux_config::LogLevel;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "keymuxd")]
#[command(about = "Input event multiplexing daemon")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/keymux/config.kdl")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The subscriber must be up before the config is parsed, or the
    // parser's warnings about unknown nodes would be dropped.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let rust_log_set = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();

    let config = keymux_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if let Some(configured) = post_config_filter(rust_log_set, config.global.log_level) {
        let _ = filter_handle.reload(configured);
    }

    tracing::info!(
        "Loaded configuration from {} with {} capture device(s)",
        config_path.display(),
        config.captures.len()
    );

    supervisor::run(config).await
}

/// RUST_LOG wins over the configured log level; until the config is
/// loaded the daemon logs at info.
fn post_config_filter(rust_log_set: bool, configured: LogLevel) -> Option<EnvFilter> {
    if rust_log_set {
        None
    } else {
        Some(EnvFilter::new(configured.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_applies_only_without_rust_log() {
        assert!(post_config_filter(true, LogLevel::Debug).is_none());

        let filter = post_config_filter(false, LogLevel::Debug).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
