//! CLI command definitions and dispatch.

pub mod check;
pub mod connect;
pub mod disconnect;
pub mod drivers;
pub mod needs_l3;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use vifbind_common::config::{BindingConfig, parse_mapping_list};
use vifbind_common::types::{BindingContext, InstanceInfo, Vif};

/// Binds VIFs into container network namespaces.
#[derive(Parser, Debug)]
#[command(name = vifbind_common::constants::APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, env = "VIFBIND_CONFIG", default_value = vifbind_common::constants::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Physnet to resource class mappings (`physnet:resource,...`),
    /// merged over the configuration file.
    #[arg(long, global = true)]
    pub physnet_resource: Option<String>,

    /// Resource class to driver mappings (`resource:driver,...`),
    /// merged over the configuration file.
    #[arg(long, global = true)]
    pub resource_driver: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plug a VIF and bind it into a namespace.
    Connect(connect::ConnectArgs),
    /// Unbind a VIF and unplug it.
    Disconnect(disconnect::DisconnectArgs),
    /// Verify that a bound interface exists.
    Check(check::CheckArgs),
    /// Report whether L3 would be configured for a VIF.
    NeedsL3(needs_l3::NeedsL3Args),
    /// List the VIF kinds with a binding driver.
    Drivers,
}

/// Arguments locating a VIF binding.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// JSON file describing the VIF.
    #[arg(long)]
    pub vif: PathBuf,

    /// Interface name inside the namespace.
    #[arg(long)]
    pub ifname: String,

    /// Network namespace path; the current namespace when omitted.
    #[arg(long)]
    pub netns: Option<PathBuf>,

    /// Container owning the namespace.
    #[arg(long)]
    pub container_id: Option<String>,
}

impl TargetArgs {
    /// Builds the binding context for these arguments.
    #[must_use]
    pub fn context(&self) -> BindingContext {
        let mut ctx = BindingContext::new(self.ifname.clone());
        ctx.netns.clone_from(&self.netns);
        ctx.container_id.clone_from(&self.container_id);
        ctx
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Connect(args) => connect::execute(&args, config),
        Command::Disconnect(args) => disconnect::execute(&args, config),
        Command::Check(args) => check::execute(&args, config),
        Command::NeedsL3(args) => needs_l3::execute(&args, config),
        Command::Drivers => drivers::execute(),
    }
}

/// Loads the configuration file and applies command-line mapping overrides.
///
/// # Errors
///
/// Returns an error if the file or an override list is malformed.
pub fn load_config(cli: &Cli) -> anyhow::Result<BindingConfig> {
    let mut config = BindingConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    if let Some(list) = &cli.physnet_resource {
        config
            .physnet_resource_mappings
            .extend(parse_mapping_list(list).context("invalid --physnet-resource")?);
    }
    if let Some(list) = &cli.resource_driver {
        config
            .resource_driver_mappings
            .extend(parse_mapping_list(list).context("invalid --resource-driver")?);
    }
    tracing::debug!(
        physnets = config.physnet_resource_mappings.len(),
        resources = config.resource_driver_mappings.len(),
        docker_mode = config.docker_mode,
        "effective configuration"
    );
    Ok(config)
}

/// Reads a VIF description from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_vif(path: &Path) -> anyhow::Result<Vif> {
    read_json(path).with_context(|| format!("invalid VIF file {}", path.display()))
}

/// Reads instance information from a JSON file, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_instance(path: Option<&Path>) -> anyhow::Result<InstanceInfo> {
    path.map_or_else(
        || Ok(InstanceInfo::default()),
        |p| read_json(p).with_context(|| format!("invalid instance file {}", p.display())),
    )
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
