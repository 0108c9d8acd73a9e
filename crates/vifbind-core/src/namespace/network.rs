//! Temporary network namespace switching.
//!
//! `setns(2)` with `CLONE_NEWNET` changes the namespace of the calling
//! thread, so a switch sequence must stay on one thread and must never
//! interleave with another sequence on that thread. The privileged worker
//! guarantees both by owning the only thread that calls [`with_netns`].

use std::fs::File;
use std::path::Path;

use vifbind_common::constants::THREAD_NETNS_PATH;
use vifbind_common::error::{BindingError, Result};

use super::NetnsHandle;

/// Save, enter and restore primitives of a namespace switch.
pub trait NamespaceSwitch {
    /// Token that allows returning to the saved namespace.
    type Saved;

    /// Captures the namespace the caller currently runs in.
    ///
    /// # Errors
    ///
    /// Returns an error if the current namespace cannot be captured.
    fn save(&self) -> Result<Self::Saved>;

    /// Moves the caller into `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be entered. The caller is
    /// still in its original namespace in that case.
    fn enter(&self, target: &NetnsHandle) -> Result<()>;

    /// Moves the caller back into a saved namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be re-entered.
    fn restore(&self, saved: Self::Saved) -> Result<()>;
}

/// Restores the saved namespace when dropped without [`finish`](Self::finish),
/// which covers unwinding out of the switched closure.
struct SwitchGuard<'a, S: NamespaceSwitch> {
    switch: &'a S,
    saved: Option<S::Saved>,
}

impl<S: NamespaceSwitch> SwitchGuard<'_, S> {
    fn finish(mut self) -> Result<()> {
        match self.saved.take() {
            Some(saved) => self.switch.restore(saved),
            None => Ok(()),
        }
    }
}

impl<S: NamespaceSwitch> Drop for SwitchGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(e) = self.switch.restore(saved) {
                tracing::error!(error = %e, "failed to restore network namespace");
            }
        }
    }
}

/// Runs `f` inside `target`, then returns to the original namespace.
///
/// Restoration happens whether `f` succeeds, fails or panics. A failed
/// restoration takes precedence over the result of `f`, since the caller
/// would otherwise keep running inside a foreign namespace. For the
/// current-namespace handle `f` runs directly.
///
/// # Errors
///
/// Returns the error of the save, enter or restore step, or of `f`.
pub fn with_netns<S, T, F>(switch: &S, target: &NetnsHandle, f: F) -> Result<T>
where
    S: NamespaceSwitch,
    F: FnOnce() -> Result<T>,
{
    if target.is_current() {
        return f();
    }
    let saved = switch.save()?;
    switch.enter(target)?;
    tracing::debug!(netns = %target, "entered network namespace");

    let guard = SwitchGuard {
        switch,
        saved: Some(saved),
    };
    let result = f();
    match guard.finish() {
        Ok(()) => {
            tracing::debug!(netns = %target, "restored original network namespace");
            result
        }
        Err(restore_err) => {
            if let Err(e) = &result {
                tracing::error!(netns = %target, error = %e, "switched operation failed before restore failure");
            }
            Err(restore_err)
        }
    }
}

/// `setns(2)`-based switch for the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxNamespaceSwitch;

impl NamespaceSwitch for LinuxNamespaceSwitch {
    type Saved = File;

    fn save(&self) -> Result<File> {
        let path = Path::new(THREAD_NETNS_PATH);
        File::open(path).map_err(|e| BindingError::NamespaceUnavailable {
            netns: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    #[cfg(target_os = "linux")]
    fn enter(&self, target: &NetnsHandle) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        let Some(fd) = target.fd() else {
            return Ok(());
        };
        setns(fd, CloneFlags::CLONE_NEWNET).map_err(|e| match e {
            nix::errno::Errno::EPERM => BindingError::PrivilegeDenied {
                message: format!("setns into {target} failed: {e}"),
            },
            _ => BindingError::NamespaceUnavailable {
                netns: target.path().map(Path::to_path_buf).unwrap_or_default(),
                reason: format!("setns failed: {e}"),
            },
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn enter(&self, _target: &NetnsHandle) -> Result<()> {
        Err(BindingError::Config {
            message: "Linux required for network namespace operations".into(),
        })
    }

    #[cfg(target_os = "linux")]
    fn restore(&self, saved: File) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        setns(&saved, CloneFlags::CLONE_NEWNET).map_err(|e| BindingError::NamespaceUnavailable {
            netns: THREAD_NETNS_PATH.into(),
            reason: format!("restoring original namespace failed: {e}"),
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn restore(&self, _saved: File) -> Result<()> {
        Err(BindingError::Config {
            message: "Linux required for network namespace operations".into(),
        })
    }
}
