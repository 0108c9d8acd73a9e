//! Host-side VIF plugging.

use vifbind_common::error::Result;
use vifbind_common::types::{InstanceInfo, Vif};

/// Creates and removes the host-side attachment of a VIF.
///
/// Plugging happens before any binding driver runs; unplugging after the
/// driver has disconnected.
pub trait VifPlugger: Send + Sync {
    /// Plugs `vif` for `instance` on the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host side cannot be prepared.
    fn plug(&self, vif: &Vif, instance: &InstanceInfo) -> Result<()>;

    /// Unplugs `vif` for `instance` from the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host side cannot be removed.
    fn unplug(&self, vif: &Vif, instance: &InstanceInfo) -> Result<()>;
}

/// Plugger for deployments where the network agent plugs host ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlugger;

impl VifPlugger for NoopPlugger {
    fn plug(&self, vif: &Vif, instance: &InstanceInfo) -> Result<()> {
        tracing::debug!(
            vif_id = %vif.id,
            instance = instance.uuid.as_deref().unwrap_or("-"),
            "host plugging left to the network agent"
        );
        Ok(())
    }

    fn unplug(&self, vif: &Vif, instance: &InstanceInfo) -> Result<()> {
        tracing::debug!(
            vif_id = %vif.id,
            instance = instance.uuid.as_deref().unwrap_or("-"),
            "host unplugging left to the network agent"
        );
        Ok(())
    }
}
