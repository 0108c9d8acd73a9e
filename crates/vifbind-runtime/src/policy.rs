//! Decides whether the binder programs L3 for a VIF.
//!
//! A VIF on a physical network served by a userspace (DPDK-style) driver
//! owns its dataplane, so the kernel namespace gets no addresses or routes.

use std::sync::Arc;

use vifbind_common::config::BindingConfig;
use vifbind_common::error::{BindingError, Result};
use vifbind_common::types::Vif;

/// L3 requirement policy backed by the physnet and resource mappings.
#[derive(Debug, Clone)]
pub struct L3Policy {
    config: Arc<BindingConfig>,
}

impl L3Policy {
    /// Creates a policy reading `config`.
    #[must_use]
    pub const fn new(config: Arc<BindingConfig>) -> Self {
        Self { config }
    }

    /// Returns whether L3 must be configured for `vif`.
    ///
    /// A VIF without a physnet always needs L3. Otherwise the physnet is
    /// mapped to a resource class, the resource class to a driver, and L3
    /// is skipped only when that driver is a userspace driver.
    ///
    /// # Errors
    ///
    /// Returns `ResourceMappingNotFound` if the physnet or its resource
    /// class has no mapping.
    pub fn needs_l3(&self, vif: &Vif) -> Result<bool> {
        let Some(physnet) = vif.physnet.as_deref() else {
            return Ok(true);
        };
        let resource = lookup(
            "physnet_resource_mappings",
            &self.config.physnet_resource_mappings,
            physnet,
            &vif.id,
        )?;
        let driver = lookup(
            "resource_driver_mappings",
            &self.config.resource_driver_mappings,
            resource,
            &vif.id,
        )?;
        if self.config.is_userspace_driver(driver) {
            tracing::info!(
                vif_id = %vif.id,
                physnet,
                resource,
                driver,
                "userspace driver owns the dataplane, skipping L3"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

fn lookup<'a>(
    table: &'static str,
    map: &'a std::collections::BTreeMap<String, String>,
    key: &str,
    vif_id: &str,
) -> Result<&'a str> {
    map.get(key).map(String::as_str).ok_or_else(|| {
        tracing::error!(vif_id, table, key, "no mapping configured");
        BindingError::ResourceMappingNotFound {
            table,
            key: key.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> L3Policy {
        let config = BindingConfig::from_toml_str(
            r#"
            [physnet_resource_mappings]
            physnet-dpdk = "intel_dpdk"
            physnet-sriov = "intel_sriov"
            physnet-orphan = "unmapped_resource"

            [resource_driver_mappings]
            intel_dpdk = "vfio-pci"
            intel_sriov = "iavf"
            "#,
        )
        .unwrap();
        L3Policy::new(Arc::new(config))
    }

    fn vif(physnet: Option<&str>) -> Vif {
        let mut vif: Vif = serde_json::from_value(serde_json::json!({
            "kind": "VIFHostDevice",
            "id": "port-1"
        }))
        .unwrap();
        vif.physnet = physnet.map(str::to_string);
        vif
    }

    #[test]
    fn no_physnet_needs_l3() {
        assert!(policy().needs_l3(&vif(None)).unwrap());
    }

    #[test]
    fn userspace_driver_skips_l3() {
        assert!(!policy().needs_l3(&vif(Some("physnet-dpdk"))).unwrap());
    }

    #[test]
    fn kernel_driver_needs_l3() {
        assert!(policy().needs_l3(&vif(Some("physnet-sriov"))).unwrap());
    }

    #[test]
    fn unmapped_physnet_fails() {
        match policy().needs_l3(&vif(Some("physnet-unknown"))) {
            Err(BindingError::ResourceMappingNotFound { table, key }) => {
                assert_eq!(table, "physnet_resource_mappings");
                assert_eq!(key, "physnet-unknown");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unmapped_resource_fails() {
        match policy().needs_l3(&vif(Some("physnet-orphan"))) {
            Err(BindingError::ResourceMappingNotFound { table, key }) => {
                assert_eq!(table, "resource_driver_mappings");
                assert_eq!(key, "unmapped_resource");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn decision_is_stable_across_calls() {
        let policy = policy();
        let v = vif(Some("physnet-dpdk"));
        assert_eq!(policy.needs_l3(&v).unwrap(), policy.needs_l3(&v).unwrap());
    }
}
