//! Linux capability inspection for the privileged boundary.
//!
//! Namespace entry and interface mutation need `CAP_SYS_ADMIN` and
//! `CAP_NET_ADMIN`. The effective set is read from `/proc/self/status`
//! so a missing capability is reported as `PrivilegeDenied` up front
//! rather than as an opaque command failure halfway through a binding.

use std::path::Path;

use vifbind_common::constants::PROC_SELF_STATUS;
use vifbind_common::error::{BindingError, Result};

/// Linux capability identifiers relevant to namespace configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Allow interface, address and route configuration.
    NetAdmin,
    /// Allow `setns(2)` into another network namespace.
    SysAdmin,
}

impl Capability {
    /// Capabilities required to configure L3 inside a foreign namespace.
    pub const NAMESPACE_CONFIG: &[Self] = &[Self::NetAdmin, Self::SysAdmin];

    /// Bit number of the capability in the kernel's capability mask.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::NetAdmin => 12,
            Self::SysAdmin => 21,
        }
    }

    /// Kernel name of the capability.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NetAdmin => "CAP_NET_ADMIN",
            Self::SysAdmin => "CAP_SYS_ADMIN",
        }
    }
}

/// Extracts the `CapEff` mask from the contents of a `status` file.
///
/// # Errors
///
/// Returns an error if the line is missing or not hexadecimal.
pub fn parse_effective(status: &str) -> Result<u64> {
    let hex = status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .map(str::trim)
        .ok_or_else(|| BindingError::Config {
            message: "CapEff missing from process status".into(),
        })?;
    u64::from_str_radix(hex, 16).map_err(|e| BindingError::Config {
        message: format!("invalid CapEff mask '{hex}': {e}"),
    })
}

/// Reads the effective capability mask of the calling process.
///
/// # Errors
///
/// Returns an error if the status file cannot be read or parsed.
pub fn effective_capabilities() -> Result<u64> {
    let path = Path::new(PROC_SELF_STATUS);
    let status = std::fs::read_to_string(path).map_err(|e| BindingError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_effective(&status)
}

/// Fails with `PrivilegeDenied` unless every capability in `required` is
/// present in `mask`.
///
/// # Errors
///
/// Returns `PrivilegeDenied` naming the first missing capability.
pub fn require_in(mask: u64, required: &[Capability]) -> Result<()> {
    if let Some(missing) = required.iter().find(|c| mask & (1 << c.bit()) == 0) {
        return Err(BindingError::PrivilegeDenied {
            message: format!("{} is not in the effective capability set", missing.name()),
        });
    }
    Ok(())
}

/// Checks the calling process holds every capability in `required`.
///
/// # Errors
///
/// Returns `PrivilegeDenied` if a capability is missing, or an error if
/// the capability mask cannot be read.
pub fn require(required: &[Capability]) -> Result<()> {
    let mask = effective_capabilities()?;
    require_in(mask, required)?;
    tracing::debug!(mask = format_args!("{mask:#x}"), "capability preflight passed");
    Ok(())
}
