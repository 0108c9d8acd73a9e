//! `vifbind connect`: Plug a VIF and bind it into a namespace.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use vifbind_common::config::BindingConfig;
use vifbind_common::types::BindingContext;
use vifbind_runtime::orchestrator::Binder;

use super::TargetArgs;
use crate::output;

/// Arguments for the `connect` command.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Where to bind the VIF.
    #[command(flatten)]
    pub target: TargetArgs,

    /// Do not install the default route via the subnet gateways.
    #[arg(long)]
    pub no_default_gateway: bool,

    /// JSON file describing the instance the VIF belongs to.
    #[arg(long)]
    pub instance: Option<PathBuf>,
}

impl ConnectArgs {
    /// Builds the binding context for these arguments.
    #[must_use]
    pub fn context(&self) -> BindingContext {
        self.target.context().default_gateway(!self.no_default_gateway)
    }
}

/// Executes the `connect` command.
///
/// # Errors
///
/// Returns an error if the inputs are invalid or any binding step fails.
pub fn execute(args: &ConnectArgs, config: BindingConfig) -> anyhow::Result<()> {
    let vif = super::read_vif(&args.target.vif)?;
    let instance = super::read_instance(args.instance.as_deref())?;
    let ctx = args.context();
    let binder = Binder::new(config).context("failed to start binder")?;
    binder
        .connect(&vif, &instance, &ctx)
        .with_context(|| format!("failed to connect {}", output::binding_summary(&vif, &ctx)))?;
    println!("connected {}", output::binding_summary(&vif, &ctx));
    Ok(())
}
