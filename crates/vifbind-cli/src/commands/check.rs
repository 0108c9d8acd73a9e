//! `vifbind check`: Verify that a bound interface exists.

use anyhow::Context;
use clap::Args;
use vifbind_common::config::BindingConfig;
use vifbind_runtime::orchestrator::Binder;

use super::TargetArgs;
use crate::output;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Where the VIF is bound.
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns an error if no driver serves the VIF or the interface is absent.
pub fn execute(args: &CheckArgs, config: BindingConfig) -> anyhow::Result<()> {
    let vif = super::read_vif(&args.target.vif)?;
    let ctx = args.target.context();
    let binder = Binder::new(config).context("failed to start binder")?;
    binder
        .check(&vif, &ctx)
        .with_context(|| format!("check failed for {}", output::binding_summary(&vif, &ctx)))?;
    println!("ok {}", output::binding_summary(&vif, &ctx));
    Ok(())
}
