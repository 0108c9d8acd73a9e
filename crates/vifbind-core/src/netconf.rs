//! Namespace-scoped network configuration.
//!
//! [`NamespaceOps`] is the seam between the L3 algorithm and the kernel.
//! [`LinuxNamespaceOps`] implements it with `ip(8)` run through `nsenter`
//! for interface, address and route changes, and with a thread-level
//! namespace switch for the IPv6 sysctl.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ipnet::IpNet;
use vifbind_common::constants::{DEFAULT_ROUTE, DISABLE_IPV6_SYSCTL};
use vifbind_common::error::{BindingError, Result};

use crate::capability::{self, Capability};
use crate::command::{CommandFailure, CommandRunner, FailureKind, Invocation, SystemRunner};
use crate::namespace::NetnsHandle;
use crate::namespace::network::{LinuxNamespaceSwitch, NamespaceSwitch, with_netns};

/// Destination of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// The default route.
    Default,
    /// A specific network.
    Net(IpNet),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str(DEFAULT_ROUTE),
            Self::Net(net) => write!(f, "{net}"),
        }
    }
}

/// Network mutations performed inside a namespace.
pub trait NamespaceOps {
    /// Verifies the caller may mutate foreign namespaces.
    ///
    /// # Errors
    ///
    /// Returns `PrivilegeDenied` if required privileges are missing.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Opens the namespace at `netns`; `None` is the current namespace.
    ///
    /// # Errors
    ///
    /// Returns `NamespaceUnavailable` if the namespace cannot be opened.
    fn open(&self, netns: Option<&Path>) -> Result<NetnsHandle> {
        NetnsHandle::open(netns)
    }

    /// Checks that `ifname` exists in the namespace.
    ///
    /// # Errors
    ///
    /// Returns `InterfaceNotFound` if it does not.
    fn ensure_link(&self, ns: &NetnsHandle, ifname: &str) -> Result<()>;

    /// Clears the IPv6-disabled flag for all interfaces of the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be entered or the flag
    /// cannot be written.
    fn enable_ipv6(&self, ns: &NetnsHandle) -> Result<()>;

    /// Assigns `address/prefix_len` to `ifname`.
    ///
    /// # Errors
    ///
    /// Returns `AddressConflict` if the address is already assigned, or
    /// `InterfaceNotFound` if the interface vanished.
    fn add_address(&self, ns: &NetnsHandle, ifname: &str, address: IpAddr, prefix_len: u8) -> Result<()>;

    /// Installs a route to `target` via `gateway`.
    ///
    /// # Errors
    ///
    /// Returns `RouteConflict` if an equivalent route already exists.
    fn add_route(&self, ns: &NetnsHandle, target: RouteTarget, gateway: IpAddr) -> Result<()>;
}

/// `ip(8)`-backed implementation of [`NamespaceOps`].
pub struct LinuxNamespaceOps<R = SystemRunner, S = LinuxNamespaceSwitch> {
    runner: R,
    switch: S,
    switch_lock: Mutex<()>,
    ipv6_sysctl: PathBuf,
    required_caps: &'static [Capability],
}

impl LinuxNamespaceOps {
    /// Creates ops that run real commands and switch the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(SystemRunner, LinuxNamespaceSwitch)
    }
}

impl Default for LinuxNamespaceOps {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner, S: NamespaceSwitch> LinuxNamespaceOps<R, S> {
    /// Creates ops from an explicit command runner and namespace switch.
    pub fn with_parts(runner: R, switch: S) -> Self {
        Self {
            runner,
            switch,
            switch_lock: Mutex::new(()),
            ipv6_sysctl: PathBuf::from(DISABLE_IPV6_SYSCTL),
            required_caps: Capability::NAMESPACE_CONFIG,
        }
    }

    /// Overrides the sysctl file written to enable IPv6.
    #[must_use]
    pub fn ipv6_sysctl(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipv6_sysctl = path.into();
        self
    }

    /// Overrides the capabilities checked by [`NamespaceOps::preflight`].
    #[must_use]
    pub const fn required_capabilities(mut self, caps: &'static [Capability]) -> Self {
        self.required_caps = caps;
        self
    }

    fn run(&self, ns: &NetnsHandle, invocation: Invocation) -> std::result::Result<String, CommandFailure> {
        self.runner.run(&invocation.in_netns(ns))
    }
}

fn namespace_failure(ns: &NetnsHandle, failure: &CommandFailure) -> BindingError {
    BindingError::NamespaceUnavailable {
        netns: ns.path().map(Path::to_path_buf).unwrap_or_default(),
        reason: failure.stderr.clone(),
    }
}

fn ip_family(address: IpAddr) -> &'static str {
    if address.is_ipv6() { "-6" } else { "-4" }
}

impl<R: CommandRunner, S: NamespaceSwitch> NamespaceOps for LinuxNamespaceOps<R, S> {
    fn preflight(&self) -> Result<()> {
        capability::require(self.required_caps)
    }

    fn ensure_link(&self, ns: &NetnsHandle, ifname: &str) -> Result<()> {
        match self.run(ns, Invocation::ip(["link", "show", "dev", ifname])) {
            Ok(_) => Ok(()),
            Err(f) if f.kind == FailureKind::NoDevice => Err(BindingError::InterfaceNotFound {
                ifname: ifname.to_string(),
                netns: ns.to_string(),
            }),
            Err(f) if f.kind == FailureKind::NoNamespace => Err(namespace_failure(ns, &f)),
            Err(f) => Err(f.into()),
        }
    }

    fn enable_ipv6(&self, ns: &NetnsHandle) -> Result<()> {
        let _serialized = self.switch_lock.lock().map_err(|_| BindingError::WorkerUnavailable {
            message: "namespace switch lock poisoned".into(),
        })?;
        let sysctl = self.ipv6_sysctl.as_path();
        with_netns(&self.switch, ns, || {
            std::fs::write(sysctl, "0").map_err(|e| BindingError::Io {
                path: sysctl.to_path_buf(),
                source: e,
            })
        })?;
        tracing::debug!(netns = %ns, "IPv6 enabled");
        Ok(())
    }

    fn add_address(&self, ns: &NetnsHandle, ifname: &str, address: IpAddr, prefix_len: u8) -> Result<()> {
        let cidr = format!("{address}/{prefix_len}");
        let invocation = Invocation::ip(["addr", "add", cidr.as_str(), "dev", ifname]);
        match self.run(ns, invocation) {
            Ok(_) => Ok(()),
            Err(f) => Err(match f.kind {
                FailureKind::Exists => BindingError::AddressConflict {
                    address: cidr,
                    ifname: ifname.to_string(),
                },
                FailureKind::NoDevice => BindingError::InterfaceNotFound {
                    ifname: ifname.to_string(),
                    netns: ns.to_string(),
                },
                FailureKind::NoNamespace => namespace_failure(ns, &f),
                _ => f.into(),
            }),
        }
    }

    fn add_route(&self, ns: &NetnsHandle, target: RouteTarget, gateway: IpAddr) -> Result<()> {
        let destination = target.to_string();
        let gw = gateway.to_string();
        let invocation = Invocation::ip([ip_family(gateway), "route", "add", destination.as_str(), "via", gw.as_str()]);
        match self.run(ns, invocation) {
            Ok(_) => Ok(()),
            Err(f) => Err(match f.kind {
                FailureKind::Exists => BindingError::RouteConflict {
                    destination,
                    gateway: gw,
                },
                FailureKind::NoNamespace => namespace_failure(ns, &f),
                _ => f.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::ScriptedRunner;
    use crate::namespace::network::tests::FakeSwitch;

    fn ops(runner: ScriptedRunner) -> LinuxNamespaceOps<ScriptedRunner, FakeSwitch> {
        LinuxNamespaceOps::with_parts(runner, FakeSwitch::new())
    }

    #[test]
    fn add_address_renders_prefix() {
        let ops = ops(ScriptedRunner::default());
        ops.add_address(&NetnsHandle::current(), "eth0", "10.0.0.5".parse().unwrap(), 24)
            .unwrap();
        assert_eq!(ops.runner.rendered(), ["ip addr add 10.0.0.5/24 dev eth0"]);
    }

    #[test]
    fn add_address_targets_namespace() {
        let file = tempfile::NamedTempFile::new().expect("failed to create tempfile");
        let ns = NetnsHandle::open(Some(file.path())).unwrap();
        let ops = ops(ScriptedRunner::default());
        ops.add_address(&ns, "eth0", "fd00::5".parse().unwrap(), 64).unwrap();
        let rendered = ops.runner.rendered();
        assert_eq!(
            rendered[0],
            format!("nsenter --net={} -- ip addr add fd00::5/64 dev eth0", file.path().display())
        );
    }

    #[test]
    fn duplicate_address_is_a_conflict() {
        let ops = ops(ScriptedRunner::default().respond(Err("RTNETLINK answers: File exists")));
        let err = ops
            .add_address(&NetnsHandle::current(), "eth0", "10.0.0.5".parse().unwrap(), 24)
            .unwrap_err();
        assert!(matches!(err, BindingError::AddressConflict { .. }));
    }

    #[test]
    fn missing_link_is_interface_not_found() {
        let ops = ops(ScriptedRunner::default().respond(Err("Device \"eth7\" does not exist.")));
        let err = ops.ensure_link(&NetnsHandle::current(), "eth7").unwrap_err();
        match err {
            BindingError::InterfaceNotFound { ifname, netns } => {
                assert_eq!(ifname, "eth7");
                assert_eq!(netns, "current");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_route_uses_family_of_gateway() {
        let ops = ops(ScriptedRunner::default());
        let ns = NetnsHandle::current();
        ops.add_route(&ns, RouteTarget::Default, "10.0.0.1".parse().unwrap()).unwrap();
        ops.add_route(&ns, RouteTarget::Default, "fd00::1".parse().unwrap()).unwrap();
        assert_eq!(
            ops.runner.rendered(),
            ["ip -4 route add default via 10.0.0.1", "ip -6 route add default via fd00::1"]
        );
    }

    #[test]
    fn existing_route_is_route_conflict() {
        let ops = ops(ScriptedRunner::default().respond(Err("RTNETLINK answers: File exists")));
        let target = RouteTarget::Net("192.168.0.0/16".parse().unwrap());
        let err = ops
            .add_route(&NetnsHandle::current(), target, "10.0.0.254".parse().unwrap())
            .unwrap_err();
        match &err {
            BindingError::RouteConflict { destination, gateway } => {
                assert_eq!(destination, "192.168.0.0/16");
                assert_eq!(gateway, "10.0.0.254");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_default_route_conflict());
    }

    #[test]
    fn enable_ipv6_writes_sysctl_inside_namespace_and_restores() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let sysctl = dir.path().join("disable_ipv6");
        std::fs::write(&sysctl, "1").unwrap();
        let netns = tempfile::NamedTempFile::new().expect("failed to create tempfile");
        let ns = NetnsHandle::open(Some(netns.path())).unwrap();

        let ops = ops(ScriptedRunner::default()).ipv6_sysctl(&sysctl);
        ops.enable_ipv6(&ns).unwrap();

        assert_eq!(std::fs::read_to_string(&sysctl).unwrap(), "0");
        assert_eq!(*ops.switch.enters.borrow(), 1);
        assert_eq!(*ops.switch.active.borrow(), "host");
    }

    #[test]
    fn enable_ipv6_failure_still_restores_namespace() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let netns = tempfile::NamedTempFile::new().expect("failed to create tempfile");
        let ns = NetnsHandle::open(Some(netns.path())).unwrap();

        let ops = ops(ScriptedRunner::default()).ipv6_sysctl(dir.path().join("missing/disable_ipv6"));
        let err = ops.enable_ipv6(&ns).unwrap_err();

        assert!(matches!(err, BindingError::Io { .. }));
        assert_eq!(*ops.switch.active.borrow(), "host");
    }

    #[test]
    fn preflight_without_requirements_passes() {
        let ops = ops(ScriptedRunner::default()).required_capabilities(&[]);
        // CapEff is readable on any Linux host; elsewhere there is nothing to check.
        if std::path::Path::new(vifbind_common::constants::PROC_SELF_STATUS).exists() {
            ops.preflight().unwrap();
        }
    }
}
