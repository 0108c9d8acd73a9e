//! Layer-3 configuration of a bound VIF inside its namespace.
//!
//! Addresses are assigned first, then explicit routes, then the default
//! route. IPv6 is enabled in the namespace, at most once per call, right
//! before the first IPv6 address is assigned. The default route is
//! attempted at most once per call, via the first subnet gateway. Only an
//! already-present default route is tolerated; every other failure aborts
//! the call.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vifbind_common::error::Result;
use vifbind_common::types::VifData;

use crate::netconf::{NamespaceOps, RouteTarget};

/// Plain-data request for L3 configuration of one VIF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L3Request {
    /// Snapshot of the VIF's network.
    pub vif: VifData,
    /// Interface name inside the namespace.
    pub ifname: String,
    /// Target namespace; `None` is the current namespace.
    pub netns: Option<PathBuf>,
    /// Whether to install the default route via each subnet's gateway.
    pub is_default_gateway: bool,
}

/// Programs addresses, routes and the default route for `request`.
///
/// The namespace handle is held for the duration of the call and released
/// on return, whether or not configuration succeeded.
///
/// # Errors
///
/// Returns the first failure other than an already-present default route.
pub fn configure_l3<O: NamespaceOps + ?Sized>(ops: &O, request: &L3Request) -> Result<()> {
    ops.preflight()?;
    let ns = ops.open(request.netns.as_deref())?;
    let ifname = request.ifname.as_str();
    ops.ensure_link(&ns, ifname)?;

    tracing::info!(
        vif_id = %request.vif.id,
        ifname,
        netns = %ns,
        subnets = request.vif.subnets.len(),
        "configuring L3"
    );

    let mut ipv6_enabled = false;
    for subnet in &request.vif.subnets {
        if subnet.is_ipv6() && !ipv6_enabled {
            ops.enable_ipv6(&ns)?;
            ipv6_enabled = true;
        }
        for ip in &subnet.ips {
            ops.add_address(&ns, ifname, *ip, subnet.prefix_len())?;
            tracing::debug!(address = %ip, prefix_len = subnet.prefix_len(), ifname, "address added");
        }
    }

    let mut default_attempted = false;
    for subnet in &request.vif.subnets {
        for route in &subnet.routes {
            ops.add_route(&ns, RouteTarget::Net(route.cidr), route.gateway)?;
            tracing::debug!(destination = %route.cidr, gateway = %route.gateway, "route added");
        }
        let Some(gateway) = subnet.gateway else {
            continue;
        };
        if !request.is_default_gateway || default_attempted {
            continue;
        }
        default_attempted = true;
        match ops.add_route(&ns, RouteTarget::Default, gateway) {
            Ok(()) => tracing::debug!(%gateway, "default route added"),
            Err(e) if e.is_default_route_conflict() => tracing::debug!(
                vif_id = %request.vif.id,
                %gateway,
                "default route already exists in namespace, not overwriting with requested gateway"
            ),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
