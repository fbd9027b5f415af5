//! CLI command handlers.
//!
//! Handlers load their inputs, run them through the reconciler, and print a
//! JSON report on stdout. Logs go to stderr through `tracing`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use flowsync_core::{DeviceKey, ResourceTree, ResultExt};
use flowsync_reconciler::{
    DeviceOp, DiffOptions, DryRunDevice, ObservedSnapshot, ReconcilerConfig, SyncCrudCounters,
    SyncEngine, diff_trees,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Commands, TreeArgs};

/// Ordered plan for one device.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub device: DeviceKey,
    pub counters: SyncCrudCounters,
    /// Each inner list may go out concurrently; lists run in order.
    pub batches: Vec<Vec<DeviceOp>>,
}

/// What a dry-run sync pushed.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub device: DeviceKey,
    pub synced: bool,
    pub pushed: Vec<DeviceOp>,
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Plan(args) => cmd_plan(&args),
        Commands::Sync(args) => cmd_sync(&args).await,
    }
}

fn cmd_plan(args: &TreeArgs) -> Result<()> {
    let inputs = Inputs::load(args)?;
    let report = build_plan(&inputs)?;
    info!(
        device = %report.device,
        batches = report.batches.len(),
        operations = report.counters.total(),
        "plan computed"
    );
    print_json(&report)
}

async fn cmd_sync(args: &TreeArgs) -> Result<()> {
    let inputs = Inputs::load(args)?;
    let report = run_sync(inputs).await?;
    print_json(&report)?;
    if !report.synced {
        bail!("device {} did not converge", report.device);
    }
    Ok(())
}

/// Everything a command needs, read from disk.
#[derive(Debug)]
pub struct Inputs {
    pub device: DeviceKey,
    pub config: ReconcilerConfig,
    pub desired: Arc<ResourceTree>,
    pub observed: Arc<ResourceTree>,
}

impl Inputs {
    fn load(args: &TreeArgs) -> Result<Self> {
        let device = DeviceKey::parse(&args.device).context("Invalid --device")?;
        Ok(Self {
            device,
            config: load_config(args.config.as_deref())?,
            desired: Arc::new(load_tree(&args.desired)?),
            observed: Arc::new(load_tree(&args.observed)?),
        })
    }
}

/// Config from `path` when given, otherwise defaults plus `FLOWSYNC_*`.
pub fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    match path {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ReconcilerConfig::from_env().context("Invalid FLOWSYNC_* environment"),
    }
}

/// Read a resource tree from a JSON file.
pub fn load_tree(path: &Path) -> Result<ResourceTree> {
    ResourceTree::from_json_file(path)
        .inspect_error(|e| warn!(path = %path.display(), error = %e, "unreadable tree"))
        .with_context(|| format!("Failed to load resource tree from {}", path.display()))
}

/// Diff the desired tree against the observed one.
pub fn build_plan(inputs: &Inputs) -> Result<PlanReport> {
    let diff = diff_trees(
        &inputs.device,
        &inputs.desired,
        &inputs.observed,
        DiffOptions::from(&inputs.config),
    )
    .context("Cannot order the desired tree")?;
    Ok(PlanReport {
        device: inputs.device.clone(),
        counters: diff.counters(),
        batches: diff.batches(),
    })
}

/// Connect a dry-run device, report its observed tree, then apply the intent.
pub async fn run_sync(inputs: Inputs) -> Result<SyncReport> {
    let device = Arc::new(DryRunDevice::new());
    let engine = SyncEngine::new(inputs.config, device.clone(), device.clone())
        .context("Failed to start sync engine")?;

    let key = inputs.device;
    engine.on_device_connected(&key).instantiate();
    let observed_ok = engine
        .observed_changed(&key, Some(ObservedSnapshot::gathered(inputs.observed)))
        .await;
    let desired_ok = engine.desired_changed(&key, None, Some(inputs.desired)).await;

    engine.on_device_disconnected(&key);
    engine.shutdown();

    let pushed = device.journal().await.into_iter().map(|(_, op)| op).collect();
    Ok(SyncReport {
        device: key,
        synced: observed_ok && desired_ok,
        pushed,
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}
