//! `vifbind needs-l3`: Report whether L3 would be configured for a VIF.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use vifbind_common::config::BindingConfig;
use vifbind_runtime::policy::L3Policy;

/// Arguments for the `needs-l3` command.
#[derive(Args, Debug)]
pub struct NeedsL3Args {
    /// JSON file describing the VIF.
    #[arg(long)]
    pub vif: PathBuf,
}

/// Executes the `needs-l3` command, printing `true` or `false`.
///
/// # Errors
///
/// Returns an error if the VIF's physnet is not mapped to a driver.
pub fn execute(args: &NeedsL3Args, config: BindingConfig) -> anyhow::Result<()> {
    let vif = super::read_vif(&args.vif)?;
    let needed = L3Policy::new(Arc::new(config)).needs_l3(&vif)?;
    println!("{needed}");
    Ok(())
}
