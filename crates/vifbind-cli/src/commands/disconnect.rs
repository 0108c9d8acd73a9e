//! `vifbind disconnect`: Unbind a VIF and unplug it.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use vifbind_common::config::BindingConfig;
use vifbind_runtime::orchestrator::Binder;

use super::TargetArgs;
use crate::output;

/// Arguments for the `disconnect` command.
#[derive(Args, Debug)]
pub struct DisconnectArgs {
    /// Where the VIF is bound.
    #[command(flatten)]
    pub target: TargetArgs,

    /// JSON file describing the instance the VIF belongs to.
    #[arg(long)]
    pub instance: Option<PathBuf>,
}

/// Executes the `disconnect` command.
///
/// # Errors
///
/// Returns an error if the inputs are invalid or any unbinding step fails.
pub fn execute(args: &DisconnectArgs, config: BindingConfig) -> anyhow::Result<()> {
    let vif = super::read_vif(&args.target.vif)?;
    let instance = super::read_instance(args.instance.as_deref())?;
    let ctx = args.target.context();
    let binder = Binder::new(config).context("failed to start binder")?;
    binder
        .disconnect(&vif, &instance, &ctx)
        .with_context(|| format!("failed to disconnect {}", output::binding_summary(&vif, &ctx)))?;
    println!("disconnected {}", output::binding_summary(&vif, &ctx));
    Ok(())
}
