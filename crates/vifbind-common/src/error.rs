//! Unified error type for the vifbind workspace.
//!
//! Every variant carries the identifiers an operator needs to locate the
//! failure (VIF kind, physnet, namespace, interface). Errors travel to the
//! caller unchanged; the only condition the binding core ever swallows is
//! the duplicate default route, see
//! [`BindingError::is_default_route_conflict`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BindingError {
    /// No binding driver is registered for the VIF's kind.
    #[error("no binding driver registered for VIF kind {kind}")]
    DriverNotFound {
        /// Name of the VIF variant that could not be resolved.
        kind: String,
    },

    /// A physnet or resource class is missing from the mapping tables.
    #[error("no {table} entry for {key}")]
    ResourceMappingNotFound {
        /// Mapping table that was consulted.
        table: &'static str,
        /// Key that was looked up.
        key: String,
    },

    /// The target network namespace cannot be opened or entered.
    #[error("network namespace {netns} unavailable: {reason}")]
    NamespaceUnavailable {
        /// Namespace path as given by the caller.
        netns: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The interface to configure does not exist in the namespace.
    #[error("interface {ifname} not found in namespace {netns}")]
    InterfaceNotFound {
        /// Interface name inside the namespace.
        ifname: String,
        /// Namespace that was searched.
        netns: String,
    },

    /// An equivalent route is already installed.
    #[error("route to {destination} via {gateway} conflicts with an existing route")]
    RouteConflict {
        /// Route destination (`default` for the default route).
        destination: String,
        /// Next hop of the rejected route.
        gateway: String,
    },

    /// The address is already assigned to the interface.
    #[error("address {address} already assigned to {ifname}")]
    AddressConflict {
        /// Address with prefix length.
        address: String,
        /// Interface carrying the address.
        ifname: String,
    },

    /// The process lacks the privilege required for the operation.
    #[error("permission denied: {message}")]
    PrivilegeDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The VIF plugging collaborator failed.
    #[error("plugging VIF {vif_id} failed: {message}")]
    Plug {
        /// Identifier of the VIF being plugged or unplugged.
        vif_id: String,
        /// Description of the failure.
        message: String,
    },

    /// A binding driver failed to connect or disconnect the VIF.
    #[error("{kind} binding driver failed: {message}")]
    Driver {
        /// VIF kind served by the failing driver.
        kind: String,
        /// Description of the failure.
        message: String,
    },

    /// An external networking command exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// Rendered command line.
        command: String,
        /// Trimmed standard error of the command.
        stderr: String,
    },

    /// The privileged worker is gone or dropped the request.
    #[error("privileged worker unavailable: {message}")]
    WorkerUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BindingError {
    /// Returns `true` for the one conflict the binding core tolerates:
    /// a default route that already exists.
    #[must_use]
    pub fn is_default_route_conflict(&self) -> bool {
        matches!(self, Self::RouteConflict { destination, .. } if destination == "default")
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BindingError>;
