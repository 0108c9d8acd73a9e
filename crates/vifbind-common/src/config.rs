//! Process-wide binder configuration.
//!
//! Loaded once at start-up and treated as read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::USERSPACE_DRIVERS;
use crate::error::{BindingError, Result};

/// Root configuration for the binder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Physnet name to device resource class.
    pub physnet_resource_mappings: BTreeMap<String, String>,
    /// Device resource class to kernel driver name.
    pub resource_driver_mappings: BTreeMap<String, String>,
    /// Driver names that manage their own L3 dataplane.
    pub userspace_drivers: BTreeSet<String>,
    /// Whether the binder runs in a container with the host `/proc`
    /// mounted at [`netns_proc_dir`](Self::netns_proc_dir).
    pub docker_mode: bool,
    /// Mount point of the host `/proc` in container mode.
    pub netns_proc_dir: Option<PathBuf>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            physnet_resource_mappings: BTreeMap::new(),
            resource_driver_mappings: BTreeMap::new(),
            userspace_drivers: USERSPACE_DRIVERS.iter().map(|d| (*d).to_string()).collect(),
            docker_mode: false,
            netns_proc_dir: None,
        }
    }
}

impl BindingConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| BindingError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            physnets = config.physnet_resource_mappings.len(),
            resources = config.resource_driver_mappings.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| BindingError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if container mode is enabled without a host
    /// `/proc` mount point.
    pub fn validate(&self) -> Result<()> {
        if self.docker_mode && self.netns_proc_dir.is_none() {
            return Err(BindingError::Config {
                message: "docker_mode requires netns_proc_dir".into(),
            });
        }
        Ok(())
    }

    /// Returns whether `driver` manages its own L3 dataplane.
    #[must_use]
    pub fn is_userspace_driver(&self, driver: &str) -> bool {
        self.userspace_drivers.contains(driver)
    }
}

/// Parses a `key:value,key:value` mapping list.
///
/// Whitespace around keys and values is ignored, as are empty entries.
///
/// # Errors
///
/// Returns an error if an entry lacks a `:` separator or has an empty
/// key or value.
pub fn parse_mapping_list(input: &str) -> Result<BTreeMap<String, String>> {
    let mut mappings = BTreeMap::new();
    for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, value)) = entry.split_once(':') else {
            return Err(BindingError::Config {
                message: format!("mapping entry '{entry}' is not key:value"),
            });
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(BindingError::Config {
                message: format!("mapping entry '{entry}' has an empty side"),
            });
        }
        let _ = mappings.insert(key.to_string(), value.to_string());
    }
    Ok(mappings)
}
