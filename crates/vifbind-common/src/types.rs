//! VIF data model shared across the vifbind workspace.
//!
//! A [`Vif`] is produced by the orchestrator that allocated the port and is
//! only borrowed by the binding core for the duration of one call.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::constants::{HOST_IFNAME_MAX_LEN, HOST_IFNAME_PREFIX};

/// Variant discriminant of a VIF, used to select its binding driver.
///
/// Serialized as the bare variant name (`"VIFBridge"`). Names that match
/// no known variant are preserved in [`VifKind::Other`] so that they can
/// still be reported when driver resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VifKind {
    /// Tap device attached to a Linux bridge.
    Bridge,
    /// Port on an Open vSwitch bridge.
    OpenVSwitch,
    /// vhost-user socket served by a userspace switch.
    VHostUser,
    /// Passthrough host device (SR-IOV VF).
    HostDevice,
    /// macvtap directly on a physical device.
    Direct,
    /// macvlan nested on the capsule's parent port.
    MacvlanNested,
    /// VLAN sub-interface nested on the capsule's parent port.
    VlanNested,
    /// Any other variant name.
    Other(String),
}

impl VifKind {
    /// Returns the variant name drivers are registered under.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bridge => "VIFBridge",
            Self::OpenVSwitch => "VIFOpenVSwitch",
            Self::VHostUser => "VIFVHostUser",
            Self::HostDevice => "VIFHostDevice",
            Self::Direct => "VIFDirect",
            Self::MacvlanNested => "VIFMacvlanNested",
            Self::VlanNested => "VIFVlanNested",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for VifKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "VIFBridge" => Self::Bridge,
            "VIFOpenVSwitch" => Self::OpenVSwitch,
            "VIFVHostUser" => Self::VHostUser,
            "VIFHostDevice" => Self::HostDevice,
            "VIFDirect" => Self::Direct,
            "VIFMacvlanNested" => Self::MacvlanNested,
            "VIFVlanNested" => Self::VlanNested,
            _ => Self::Other(name),
        }
    }
}

impl From<VifKind> for String {
    fn from(kind: VifKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for VifKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit route carried by a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination network.
    pub cidr: IpNet,
    /// Next hop.
    pub gateway: IpAddr,
}

/// Subnet of a VIF's network with the addresses assigned on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Subnet network and prefix length.
    pub cidr: IpNet,
    /// Addresses assigned to the VIF on this subnet.
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    /// Explicit routes to install, in order.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Gateway used for the default route, if any.
    #[serde(default)]
    pub gateway: Option<IpAddr>,
}

impl Subnet {
    /// Returns whether this subnet is an IPv6 subnet.
    #[must_use]
    pub const fn is_ipv6(&self) -> bool {
        matches!(self.cidr, IpNet::V6(_))
    }

    /// Returns the prefix length applied to every address of the subnet.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.cidr.prefix_len()
    }
}

/// Network a VIF is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Link MTU, when the network defines one.
    #[serde(default)]
    pub mtu: Option<u32>,
    /// Subnets in declaration order.
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

/// Virtual network interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vif {
    /// Variant discriminant.
    pub kind: VifKind,
    /// Port identifier.
    pub id: String,
    /// MAC address of the interface.
    #[serde(default)]
    pub address: Option<String>,
    /// Host-side device name.
    #[serde(default)]
    pub vif_name: Option<String>,
    /// Bridge the host side is attached to.
    #[serde(default)]
    pub bridge_name: Option<String>,
    /// Physical network segment, for hardware-offloaded bindings.
    #[serde(default)]
    pub physnet: Option<String>,
    /// Network and its subnets.
    #[serde(default)]
    pub network: Network,
}

impl Vif {
    /// Returns the host-side device name, deriving `tap<id>` when the
    /// VIF does not carry one.
    #[must_use]
    pub fn host_ifname(&self) -> String {
        self.vif_name.clone().unwrap_or_else(|| {
            format!("{HOST_IFNAME_PREFIX}{}", self.id)
                .chars()
                .take(HOST_IFNAME_MAX_LEN)
                .collect()
        })
    }
}

/// Context of the capsule or container the VIF is plugged for.
///
/// Opaque to the binding core; handed unchanged to the plugging
/// collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance UUID.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Instance name.
    #[serde(default)]
    pub name: Option<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Where and how a VIF is bound inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingContext {
    /// Interface name inside the namespace.
    pub ifname: String,
    /// Namespace path; `None` binds in the current namespace.
    pub netns: Option<PathBuf>,
    /// Container the namespace belongs to.
    pub container_id: Option<String>,
    /// Whether the VIF provides the namespace's default route.
    pub is_default_gateway: bool,
}

impl BindingContext {
    /// Creates a context for `ifname` in the current namespace that
    /// installs the default route.
    #[must_use]
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            netns: None,
            container_id: None,
            is_default_gateway: true,
        }
    }

    /// Sets the target namespace path.
    #[must_use]
    pub fn netns(mut self, netns: impl Into<PathBuf>) -> Self {
        self.netns = Some(netns.into());
        self
    }

    /// Sets the container identifier.
    #[must_use]
    pub fn container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = Some(id.into());
        self
    }

    /// Sets whether the default route is installed.
    #[must_use]
    pub const fn default_gateway(mut self, enabled: bool) -> Self {
        self.is_default_gateway = enabled;
        self
    }
}

/// Plain-data snapshot of the VIF fields L3 configuration needs.
///
/// This is what crosses the privileged boundary; it holds no reference to
/// the caller's [`Vif`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VifData {
    /// Port identifier.
    pub id: String,
    /// Variant name.
    pub kind: String,
    /// Subnets with addresses, routes and gateways.
    pub subnets: Vec<Subnet>,
}

impl From<&Vif> for VifData {
    fn from(vif: &Vif) -> Self {
        Self {
            id: vif.id.clone(),
            kind: vif.kind.to_string(),
            subnets: vif.network.subnets.clone(),
        }
    }
}
