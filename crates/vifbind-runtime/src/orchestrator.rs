//! Connect/disconnect sequencing of a VIF binding.
//!
//! Steps run strictly in order and the first failure aborts the call. No
//! step is rolled back: a VIF plugged before a later failure stays plugged
//! until the caller disconnects it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vifbind_common::config::BindingConfig;
use vifbind_common::constants::DISABLE_IPV6_SYSCTL;
use vifbind_common::error::{BindingError, Result};
use vifbind_common::types::{BindingContext, InstanceInfo, Vif, VifData};
use vifbind_core::l3::L3Request;
use vifbind_core::namespace::normalize_netns;
use vifbind_core::netconf::LinuxNamespaceOps;

use crate::plug::{NoopPlugger, VifPlugger};
use crate::policy::L3Policy;
use crate::privileged::{L3Executor, PrivilegedWorker};
use crate::registry::DriverRegistry;

/// Orchestration step, reported when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStep {
    /// Driver lookup by VIF kind.
    DriverResolve,
    /// Host-side plugging.
    Plug,
    /// Driver wiring into the namespace.
    DriverConnect,
    /// L3 requirement policy.
    L3Policy,
    /// Privileged L3 configuration.
    L3Configure,
    /// Interface presence check.
    LinkCheck,
    /// Driver unwiring.
    DriverDisconnect,
    /// Host-side unplugging.
    Unplug,
}

impl BindingStep {
    /// Returns the step name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DriverResolve => "driver_resolve",
            Self::Plug => "plug",
            Self::DriverConnect => "driver_connect",
            Self::L3Policy => "l3_policy",
            Self::L3Configure => "l3_configure",
            Self::LinkCheck => "link_check",
            Self::DriverDisconnect => "driver_disconnect",
            Self::Unplug => "unplug",
        }
    }
}

impl fmt::Display for BindingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binds VIFs into network namespaces.
///
/// Holds only read-only configuration and the collaborators it dispatches
/// to; nothing is retained between calls.
pub struct Binder {
    config: Arc<BindingConfig>,
    registry: DriverRegistry,
    policy: L3Policy,
    plugger: Arc<dyn VifPlugger>,
    l3: Arc<dyn L3Executor>,
}

impl Binder {
    /// Creates a binder with the built-in drivers, no host plugging, and a
    /// privileged worker configuring namespaces through `ip(8)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the privileged
    /// worker cannot be started.
    pub fn new(config: BindingConfig) -> Result<Self> {
        config.validate()?;
        let ops = LinuxNamespaceOps::new().ipv6_sysctl(ipv6_sysctl_path(&config));
        let worker = PrivilegedWorker::spawn(ops)?;
        Ok(Self::with_parts(
            Arc::new(config),
            DriverRegistry::with_builtin_drivers(),
            Arc::new(NoopPlugger),
            Arc::new(worker),
        ))
    }

    /// Creates a binder from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: Arc<BindingConfig>,
        registry: DriverRegistry,
        plugger: Arc<dyn VifPlugger>,
        l3: Arc<dyn L3Executor>,
    ) -> Self {
        Self {
            policy: L3Policy::new(Arc::clone(&config)),
            config,
            registry,
            plugger,
            l3,
        }
    }

    /// Plugs `vif`, wires it into the namespace of `ctx` and, when the L3
    /// policy requires it, programs its addresses and routes.
    ///
    /// The host side is plugged even when no driver serves the VIF kind;
    /// the `DriverNotFound` error is reported once plugging has run.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, unchanged.
    pub fn connect(&self, vif: &Vif, instance: &InstanceInfo, ctx: &BindingContext) -> Result<()> {
        let netns = normalize_netns(ctx.netns.as_deref(), &self.config);
        let trace = StepTrace::new(vif, netns.as_deref());
        tracing::info!(
            vif_id = %vif.id,
            kind = %vif.kind,
            ifname = %ctx.ifname,
            netns = %trace.netns,
            "connecting VIF"
        );

        let resolved = self.registry.resolve(&vif.kind);
        trace.step(BindingStep::Plug, self.plugger.plug(vif, instance))?;
        let driver = trace.step(BindingStep::DriverResolve, resolved)?;
        trace.step(
            BindingStep::DriverConnect,
            driver.connect(vif, &ctx.ifname, netns.as_deref(), ctx.container_id.as_deref()),
        )?;

        if trace.step(BindingStep::L3Policy, self.policy.needs_l3(vif))? {
            let request = L3Request {
                vif: VifData::from(vif),
                ifname: ctx.ifname.clone(),
                netns,
                is_default_gateway: ctx.is_default_gateway,
            };
            trace.step(BindingStep::L3Configure, self.l3.configure_l3(request))?;
        }

        tracing::info!(vif_id = %vif.id, ifname = %ctx.ifname, "VIF connected");
        Ok(())
    }

    /// Unwires `vif` and unplugs it from the host.
    ///
    /// L3 state is not torn down; it goes away with the namespace.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, unchanged.
    pub fn disconnect(&self, vif: &Vif, instance: &InstanceInfo, ctx: &BindingContext) -> Result<()> {
        let netns = normalize_netns(ctx.netns.as_deref(), &self.config);
        let trace = StepTrace::new(vif, netns.as_deref());
        tracing::info!(
            vif_id = %vif.id,
            kind = %vif.kind,
            ifname = %ctx.ifname,
            netns = %trace.netns,
            "disconnecting VIF"
        );

        let driver = trace.step(BindingStep::DriverResolve, self.registry.resolve(&vif.kind))?;
        trace.step(
            BindingStep::DriverDisconnect,
            driver.disconnect(vif, &ctx.ifname, netns.as_deref(), ctx.container_id.as_deref()),
        )?;
        trace.step(BindingStep::Unplug, self.plugger.unplug(vif, instance))?;

        tracing::info!(vif_id = %vif.id, ifname = %ctx.ifname, "VIF disconnected");
        Ok(())
    }

    /// Verifies that a driver serves `vif` and that `ctx.ifname` exists in
    /// the namespace. Changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `DriverNotFound`, `NamespaceUnavailable` or
    /// `InterfaceNotFound`.
    pub fn check(&self, vif: &Vif, ctx: &BindingContext) -> Result<()> {
        let netns = normalize_netns(ctx.netns.as_deref(), &self.config);
        let trace = StepTrace::new(vif, netns.as_deref());
        let _ = trace.step(BindingStep::DriverResolve, self.registry.resolve(&vif.kind))?;
        trace.step(BindingStep::LinkCheck, self.l3.check_link(ctx.ifname.clone(), netns))
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Returns the IPv6 sysctl file as reachable from this process. In
/// container mode it lives under the host `/proc` mount.
fn ipv6_sysctl_path(config: &BindingConfig) -> PathBuf {
    let sysctl = Path::new(DISABLE_IPV6_SYSCTL);
    normalize_netns(Some(sysctl), config).unwrap_or_else(|| sysctl.to_path_buf())
}

/// Identifiers attached to the log of a failing step.
struct StepTrace<'a> {
    vif: &'a Vif,
    netns: String,
}

impl<'a> StepTrace<'a> {
    fn new(vif: &'a Vif, netns: Option<&Path>) -> Self {
        Self {
            vif,
            netns: netns.map_or_else(|| "current".to_string(), |p| p.display().to_string()),
        }
    }

    fn step<T>(&self, step: BindingStep, result: Result<T>) -> Result<T> {
        result.inspect_err(|e: &BindingError| {
            tracing::error!(
                step = %step,
                vif_id = %self.vif.id,
                kind = %self.vif.kind,
                physnet = self.vif.physnet.as_deref().unwrap_or("-"),
                netns = %self.netns,
                error = %e,
                "binding step failed"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::registry::BindingDriver;

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Calls {
        fn push(&self, call: impl Into<String>) {
            self.0.lock().unwrap().push(call.into());
        }
    }

    struct Fake(Arc<Calls>);

    impl VifPlugger for Fake {
        fn plug(&self, _: &Vif, _: &InstanceInfo) -> Result<()> {
            self.0.push("plug");
            Ok(())
        }

        fn unplug(&self, _: &Vif, _: &InstanceInfo) -> Result<()> {
            self.0.push("unplug");
            Ok(())
        }
    }

    impl BindingDriver for Fake {
        fn connect(&self, _: &Vif, _: &str, netns: Option<&Path>, _: Option<&str>) -> Result<()> {
            self.0.push(format!("connect {}", netns.map_or("-".into(), |p| p.display().to_string())));
            Ok(())
        }

        fn disconnect(&self, _: &Vif, _: &str, _: Option<&Path>, _: Option<&str>) -> Result<()> {
            self.0.push("disconnect");
            Ok(())
        }
    }

    impl L3Executor for Fake {
        fn configure_l3(&self, request: L3Request) -> Result<()> {
            self.0.push(format!("l3 {}", request.ifname));
            Ok(())
        }

        fn check_link(&self, ifname: String, _: Option<PathBuf>) -> Result<()> {
            self.0.push(format!("check {ifname}"));
            Ok(())
        }
    }

    fn binder(config: BindingConfig) -> (Binder, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let mut registry = DriverRegistry::new();
        registry.register(vifbind_common::types::VifKind::Bridge, Arc::new(Fake(Arc::clone(&calls))));
        let binder = Binder::with_parts(
            Arc::new(config),
            registry,
            Arc::new(Fake(Arc::clone(&calls))),
            Arc::new(Fake(Arc::clone(&calls))),
        );
        (binder, calls)
    }

    fn vif() -> Vif {
        serde_json::from_value(serde_json::json!({"kind": "VIFBridge", "id": "port-1"})).unwrap()
    }

    #[test]
    fn step_names_match_log_fields() {
        assert_eq!(BindingStep::DriverConnect.to_string(), "driver_connect");
        assert_eq!(BindingStep::L3Configure.as_str(), "l3_configure");
    }

    #[test]
    fn connect_normalizes_netns_in_container_mode() {
        let config = BindingConfig {
            docker_mode: true,
            netns_proc_dir: Some(PathBuf::from("/host/proc")),
            ..BindingConfig::default()
        };
        let (binder, calls) = binder(config);
        let ctx = BindingContext::new("eth0").netns("/proc/4242/ns/net");
        binder.connect(&vif(), &InstanceInfo::default(), &ctx).unwrap();
        assert_eq!(
            *calls.0.lock().unwrap(),
            ["plug", "connect /host/proc/4242/ns/net", "l3 eth0"]
        );
    }

    #[test]
    fn ipv6_sysctl_uses_host_proc_in_container_mode() {
        let config = BindingConfig {
            docker_mode: true,
            netns_proc_dir: Some(PathBuf::from("/host/proc")),
            ..BindingConfig::default()
        };
        assert_eq!(
            ipv6_sysctl_path(&config),
            PathBuf::from("/host/proc/sys/net/ipv6/conf/all/disable_ipv6")
        );
    }

    #[test]
    fn ipv6_sysctl_is_local_outside_container_mode() {
        assert_eq!(
            ipv6_sysctl_path(&BindingConfig::default()),
            PathBuf::from(DISABLE_IPV6_SYSCTL)
        );
    }

    #[test]
    fn check_does_not_mutate() {
        let (binder, calls) = binder(BindingConfig::default());
        binder.check(&vif(), &BindingContext::new("eth0")).unwrap();
        assert_eq!(*calls.0.lock().unwrap(), ["check eth0"]);
    }

    #[test]
    fn check_fails_for_unserved_kind() {
        let (binder, calls) = binder(BindingConfig::default());
        let mut v = vif();
        v.kind = vifbind_common::types::VifKind::Direct;
        let err = binder.check(&v, &BindingContext::new("eth0")).unwrap_err();
        assert!(matches!(err, BindingError::DriverNotFound { .. }));
        assert!(calls.0.lock().unwrap().is_empty());
    }
}
