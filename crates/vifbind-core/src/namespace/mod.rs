//! Network namespace handles.
//!
//! A [`NetnsHandle`] is the scoped resource every namespace-bound operation
//! works through: it is opened at the start of a configuration call and the
//! underlying descriptor is closed when the handle drops, on every exit path.

pub mod network;

use std::fmt;
use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use vifbind_common::config::BindingConfig;
use vifbind_common::constants::PROC_PREFIX;
use vifbind_common::error::{BindingError, Result};

/// Normalizes a namespace path to the form usable from this process.
///
/// In container mode the host `/proc` is reachable under
/// `netns_proc_dir`, so a leading `/proc` component is rewritten to it.
/// `None` means the current namespace and is returned unchanged.
#[must_use]
pub fn normalize_netns(netns: Option<&Path>, config: &BindingConfig) -> Option<PathBuf> {
    let netns = netns?;
    match (&config.netns_proc_dir, config.docker_mode) {
        (Some(proc_dir), true) => netns.strip_prefix(PROC_PREFIX).map_or_else(
            |_| Some(netns.to_path_buf()),
            |rest| Some(proc_dir.join(rest)),
        ),
        _ => Some(netns.to_path_buf()),
    }
}

/// Open handle on a network namespace.
///
/// A handle without a path refers to the namespace the caller already runs
/// in; operations through it never switch namespaces.
#[derive(Debug)]
pub struct NetnsHandle {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl NetnsHandle {
    /// Opens the namespace at `path`, or returns the current-namespace
    /// handle for `None`.
    ///
    /// # Errors
    ///
    /// Returns `NamespaceUnavailable` if the namespace file cannot be opened.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::current());
        };
        let file = File::open(path).map_err(|e| BindingError::NamespaceUnavailable {
            netns: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(netns = %path.display(), "namespace handle opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
        })
    }

    /// Returns the handle for the caller's own namespace.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    /// Returns the namespace path, `None` for the current namespace.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns whether this handle refers to the caller's own namespace.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.file.is_none()
    }

    /// Borrows the open namespace descriptor.
    #[must_use]
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file.as_ref().map(AsFd::as_fd)
    }
}

impl fmt::Display for NetnsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display()),
            None => f.write_str("current"),
        }
    }
}

impl Drop for NetnsHandle {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            tracing::debug!(netns = %path.display(), "namespace handle released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker_config() -> BindingConfig {
        BindingConfig {
            docker_mode: true,
            netns_proc_dir: Some(PathBuf::from("/host_proc")),
            ..BindingConfig::default()
        }
    }

    #[test]
    fn normalize_keeps_path_outside_container_mode() {
        let netns = Path::new("/proc/42/ns/net");
        let normalized = normalize_netns(Some(netns), &BindingConfig::default());
        assert_eq!(normalized.as_deref(), Some(netns));
    }

    #[test]
    fn normalize_rewrites_proc_in_container_mode() {
        let normalized = normalize_netns(Some(Path::new("/proc/42/ns/net")), &docker_config());
        assert_eq!(normalized.as_deref(), Some(Path::new("/host_proc/42/ns/net")));
    }

    #[test]
    fn normalize_leaves_non_proc_paths_alone() {
        let netns = Path::new("/var/run/netns/capsule-1");
        let normalized = normalize_netns(Some(netns), &docker_config());
        assert_eq!(normalized.as_deref(), Some(netns));
    }

    #[test]
    fn normalize_none_is_current_namespace() {
        assert!(normalize_netns(None, &docker_config()).is_none());
    }

    #[test]
    fn open_none_is_current() {
        let handle = NetnsHandle::open(None).unwrap();
        assert!(handle.is_current());
        assert!(handle.fd().is_none());
        assert_eq!(handle.to_string(), "current");
    }

    #[test]
    fn open_existing_file_holds_descriptor() {
        let file = tempfile::NamedTempFile::new().expect("failed to create tempfile");
        let handle = NetnsHandle::open(Some(file.path())).unwrap();
        assert!(!handle.is_current());
        assert!(handle.fd().is_some());
        assert_eq!(handle.path(), Some(file.path()));
    }

    #[test]
    fn open_missing_namespace_is_unavailable() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let missing = dir.path().join("gone");
        let err = NetnsHandle::open(Some(&missing)).unwrap_err();
        match err {
            BindingError::NamespaceUnavailable { netns, .. } => assert_eq!(netns, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
