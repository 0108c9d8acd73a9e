//! veth-pair binding for bridge and Open vSwitch VIFs.
//!
//! The pair is created inside the target namespace with the peer pushed out
//! to the host namespace, so an `ifname` that also exists on the host never
//! collides. The host end is then attached to the VIF's bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vifbind_common::error::{BindingError, Result};
use vifbind_common::types::{Vif, VifKind};
use vifbind_core::command::{CommandFailure, CommandRunner, FailureKind, Invocation, SystemRunner};
use vifbind_core::namespace::NetnsHandle;

use crate::registry::BindingDriver;

/// Integration bridge used when an OVS VIF names none.
pub const DEFAULT_OVS_BRIDGE: &str = "br-int";

/// Binding driver wiring a VIF through a veth pair.
pub struct VethDriver {
    runner: Arc<dyn CommandRunner>,
    host_netns: PathBuf,
}

impl VethDriver {
    /// Creates a driver that runs real commands.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }

    /// Creates a driver that runs commands through `runner`.
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            host_netns: PathBuf::from(format!("/proc/{}/ns/net", std::process::id())),
        }
    }

    /// Returns the commands that bind `vif` as `ifname` in `ns`.
    ///
    /// # Errors
    ///
    /// Returns a driver error if the VIF kind is not served by this driver
    /// or a bridge VIF names no bridge.
    pub fn connect_plan(&self, vif: &Vif, ifname: &str, ns: &NetnsHandle) -> Result<Vec<Invocation>> {
        let host = vif.host_ifname();
        let attach = attach_invocation(vif, &host)?;
        let mtu = vif.network.mtu.map(|m| m.to_string());

        let mut plan = Vec::with_capacity(4);
        let mut create = vec!["link", "add", ifname, "type", "veth", "peer", "name", host.as_str()];
        let host_netns = self.host_netns.to_string_lossy();
        if !ns.is_current() {
            create.extend(["netns", &*host_netns]);
        }
        plan.push(Invocation::ip(create).in_netns(ns));

        let mut peer = vec!["link", "set", "dev", ifname];
        if let Some(mac) = vif.address.as_deref() {
            peer.extend(["address", mac]);
        }
        if let Some(mtu) = mtu.as_deref() {
            peer.extend(["mtu", mtu]);
        }
        peer.push("up");
        plan.push(Invocation::ip(peer).in_netns(ns));

        let mut host_up = vec!["link", "set", "dev", host.as_str()];
        if let Some(mtu) = mtu.as_deref() {
            host_up.extend(["mtu", mtu]);
        }
        host_up.push("up");
        plan.push(Invocation::ip(host_up));

        plan.push(attach);
        Ok(plan)
    }

    /// Returns the commands that undo [`connect_plan`](Self::connect_plan).
    #[must_use]
    pub fn disconnect_plan(&self, vif: &Vif) -> Vec<Invocation> {
        let host = vif.host_ifname();
        let mut plan = Vec::with_capacity(2);
        if vif.kind == VifKind::OpenVSwitch {
            let bridge = vif.bridge_name.as_deref().unwrap_or(DEFAULT_OVS_BRIDGE);
            plan.push(Invocation::new(
                "ovs-vsctl",
                ["--if-exists", "del-port", bridge, host.as_str()],
            ));
        }
        plan.push(Invocation::ip(["link", "del", "dev", host.as_str()]));
        plan
    }

    fn driver_error(vif: &Vif, failure: CommandFailure) -> BindingError {
        match failure.kind {
            FailureKind::NotPermitted => failure.into(),
            _ => BindingError::Driver {
                kind: vif.kind.to_string(),
                message: failure.to_string(),
            },
        }
    }
}

impl Default for VethDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn attach_invocation(vif: &Vif, host: &str) -> Result<Invocation> {
    match vif.kind {
        VifKind::Bridge => {
            let bridge = vif.bridge_name.as_deref().ok_or_else(|| BindingError::Driver {
                kind: vif.kind.to_string(),
                message: format!("VIF {} names no bridge", vif.id),
            })?;
            Ok(Invocation::ip(["link", "set", "dev", host, "master", bridge]))
        }
        VifKind::OpenVSwitch => {
            let bridge = vif.bridge_name.as_deref().unwrap_or(DEFAULT_OVS_BRIDGE);
            let mut args = vec![
                "--".to_string(),
                "--may-exist".into(),
                "add-port".into(),
                bridge.into(),
                host.into(),
                "--".into(),
                "set".into(),
                "Interface".into(),
                host.into(),
                format!("external-ids:iface-id={}", vif.id),
                "external-ids:iface-status=active".into(),
            ];
            if let Some(mac) = &vif.address {
                args.push(format!("external-ids:attached-mac={mac}"));
            }
            Ok(Invocation::new("ovs-vsctl", args))
        }
        _ => Err(BindingError::Driver {
            kind: vif.kind.to_string(),
            message: "veth driver serves only VIFBridge and VIFOpenVSwitch".into(),
        }),
    }
}

impl BindingDriver for VethDriver {
    fn connect(&self, vif: &Vif, ifname: &str, netns: Option<&Path>, container_id: Option<&str>) -> Result<()> {
        let ns = NetnsHandle::open(netns)?;
        let plan = self.connect_plan(vif, ifname, &ns)?;
        for invocation in &plan {
            let _ = self
                .runner
                .run(invocation)
                .map_err(|f| Self::driver_error(vif, f))?;
        }
        tracing::info!(
            vif_id = %vif.id,
            kind = %vif.kind,
            host_ifname = %vif.host_ifname(),
            ifname,
            netns = %ns,
            container_id = container_id.unwrap_or("-"),
            "veth pair bound"
        );
        Ok(())
    }

    fn disconnect(&self, vif: &Vif, ifname: &str, _netns: Option<&Path>, container_id: Option<&str>) -> Result<()> {
        for invocation in &self.disconnect_plan(vif) {
            match self.runner.run(invocation) {
                Ok(_) => {}
                Err(f) if f.kind == FailureKind::NoDevice => {
                    tracing::debug!(vif_id = %vif.id, command = %invocation, "host end already gone");
                }
                Err(f) => return Err(Self::driver_error(vif, f)),
            }
        }
        tracing::info!(
            vif_id = %vif.id,
            kind = %vif.kind,
            ifname,
            container_id = container_id.unwrap_or("-"),
            "veth pair unbound"
        );
        Ok(())
    }
}
