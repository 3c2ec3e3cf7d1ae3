//! cbup - Couchbase cluster rolling upgrade CLI tool.
//!
//! Upgrades cluster nodes one at a time:
//! - Resolves a single target version per run (literal or `latest`)
//! - Checks each node's own version and skips nodes already current
//! - Sequences stop / upgrade / start with optional OS upgrade and reboot
//! - Contains failures to the node that produced them

mod config;
mod error;
mod node;
mod output;
mod ssh;
mod upgrader;
mod version;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use config::{Args, ClusterConfig};
use node::UpgradeFlags;
use ssh::SshExecutor;
use upgrader::{RollingUpgrader, RunOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        build_date = env!("BUILD_DATE"),
        "Starting cbup"
    );

    let hosts = args.node_list();
    if hosts.is_empty() {
        anyhow::bail!("--nodes must contain at least one host");
    }

    let flags = UpgradeFlags {
        upgrade_system: args.upgrade_system,
        reboot: args.reboot,
        force_reboot: args.force_reboot,
    };
    let options = RunOptions {
        verbose: args.verbose,
        dry_run: args.dry_run,
    };
    let timeout = Duration::from_secs(args.command_timeout);
    let config = ClusterConfig::from_args(&args);

    let executor = SshExecutor::new(timeout);
    let upgrader = RollingUpgrader::new(config, flags, options, executor);

    let report = upgrader.run(&hosts).await?;
    output::print_summary(&report);

    if !report.success() {
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize the tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt().with_env_filter(filter).with_target(false).init();

    Ok(())
}
