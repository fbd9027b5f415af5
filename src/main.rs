//! # flowsync
//!
//! Operator entry point for the reconciler.
//!
//! - `flowsync plan` prints the ordered operation plan that would bring a
//!   device from its observed tree to its desired tree.
//! - `flowsync sync` runs the same trees through the full sync pipeline
//!   against a dry-run device and prints what it pushed.
//!
//! Logging goes to stderr and honours `RUST_LOG`; `--verbose` lowers the
//! default level to `debug`.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    debug!(command = ?cli.command, "flowsync starting");
    commands::execute_command(cli.command).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
