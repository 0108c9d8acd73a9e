//! `vifbind drivers`: List the VIF kinds with a binding driver.

use vifbind_runtime::registry::DriverRegistry;

use crate::output;

/// Executes the `drivers` command.
///
/// # Errors
///
/// This command does not currently fail.
pub fn execute() -> anyhow::Result<()> {
    let registry = DriverRegistry::with_builtin_drivers();
    print!("{}", output::kind_table(registry.kinds()));
    Ok(())
}
