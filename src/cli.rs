//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// flowsync - keep switches converged on their declared configuration
#[derive(Parser, Debug)]
#[command(name = "flowsync")]
#[command(version)]
#[command(about = "Diff and push flow, group and meter configuration to switches")]
#[command(
    long_about = "flowsync compares the desired resource tree of a device with the tree it reports, orders the difference so no group is referenced before it exists, and pushes it."
)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the ordered operation plan as JSON
    Plan(TreeArgs),

    /// Run the plan through the sync pipeline against a dry-run device
    Sync(TreeArgs),
}

/// Inputs shared by every command.
#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    /// Desired resource tree (JSON)
    #[arg(short, long)]
    pub desired: PathBuf,

    /// Observed resource tree (JSON)
    #[arg(short, long)]
    pub observed: PathBuf,

    /// Reconciler configuration (TOML); FLOWSYNC_* variables otherwise
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Device the trees belong to
    #[arg(long, default_value = "openflow:1")]
    pub device: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from([
            "flowsync", "plan", "--desired", "d.json", "--observed", "o.json",
        ]);
        assert!(matches!(
            cli,
            Ok(Cli { verbose: false, command: Commands::Plan(ref args) })
                if args.device == "openflow:1" && args.config.is_none()
        ));
    }

    #[test]
    fn test_parse_sync_with_config_and_verbose() {
        let cli = Cli::try_parse_from([
            "flowsync", "-v", "sync", "-d", "d.json", "-o", "o.json", "-c", "sync.toml", "--device",
            "openflow:7",
        ]);
        assert!(matches!(
            cli,
            Ok(Cli { verbose: true, command: Commands::Sync(ref args) })
                if args.device == "openflow:7" && args.config.is_some()
        ));
    }

    #[test]
    fn test_trees_are_required() {
        assert!(Cli::try_parse_from(["flowsync", "plan", "--desired", "d.json"]).is_err());
    }
}
