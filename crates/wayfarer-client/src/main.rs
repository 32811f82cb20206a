//! # Wayfarer
//!
//! Command-line client for the Wayfarer hub.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! wayfarer
//!
//! # Run with custom config
//! wayfarer --config /path/to/wayfarer.toml
//!
//! # Run with environment variables
//! WAYFARER_USER_ID=u1 WAYFARER_LOCATION=r1 wayfarer
//! ```

mod config;
mod metrics;
mod runner;

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the event stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wayfarer=info,wayfarer_core=info,wayfarer_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = parse_args(std::env::args().skip(1))?;
    let config = config::Config::load(config_path.as_deref())?;

    runner::run_client(config).await?;

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            other => bail!("unexpected argument: {}", other),
        }
    }
    Ok(config_path)
}
