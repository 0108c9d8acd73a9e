//! Binding driver abstraction and registry.
//!
//! Drivers are registered per VIF kind at start-up. Resolution is an exact
//! match on the kind; there is no fallback driver.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use vifbind_common::error::{BindingError, Result};
use vifbind_common::types::{Vif, VifKind};

use crate::driver::veth::VethDriver;

/// Attaches a plugged VIF to a capsule's or container's namespace.
///
/// Implementors handle the variant-specific wiring between the host-side
/// device and the interface seen inside the namespace.
pub trait BindingDriver: Send + Sync {
    /// Wires `vif` into `netns` as `ifname`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface cannot be created or moved.
    fn connect(&self, vif: &Vif, ifname: &str, netns: Option<&Path>, container_id: Option<&str>) -> Result<()>;

    /// Removes the wiring created by [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns an error if the wiring cannot be removed.
    fn disconnect(&self, vif: &Vif, ifname: &str, netns: Option<&Path>, container_id: Option<&str>) -> Result<()>;
}

/// Map from VIF kind to its binding driver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<VifKind, Arc<dyn BindingDriver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in veth driver serving
    /// `VIFBridge` and `VIFOpenVSwitch`.
    #[must_use]
    pub fn with_builtin_drivers() -> Self {
        let veth: Arc<dyn BindingDriver> = Arc::new(VethDriver::new());
        let mut registry = Self::new();
        registry.register(VifKind::Bridge, Arc::clone(&veth));
        registry.register(VifKind::OpenVSwitch, veth);
        registry
    }

    /// Registers `driver` for `kind`, replacing any previous driver.
    pub fn register(&mut self, kind: VifKind, driver: Arc<dyn BindingDriver>) {
        tracing::debug!(%kind, "binding driver registered");
        let _ = self.drivers.insert(kind, driver);
    }

    /// Returns the driver registered for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DriverNotFound` if no driver serves `kind`.
    pub fn resolve(&self, kind: &VifKind) -> Result<Arc<dyn BindingDriver>> {
        self.drivers
            .get(kind)
            .cloned()
            .ok_or_else(|| BindingError::DriverNotFound {
                kind: kind.to_string(),
            })
    }

    /// Returns the registered kinds in a stable order.
    pub fn kinds(&self) -> impl Iterator<Item = &VifKind> {
        self.drivers.keys()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}
