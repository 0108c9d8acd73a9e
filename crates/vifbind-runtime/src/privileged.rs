//! Privileged L3 worker.
//!
//! Namespace configuration runs on one dedicated thread. Jobs are plain
//! data ([`L3Request`]) sent over a channel, so nothing the caller owns is
//! shared with the privileged side, and namespace switches of concurrent
//! callers are serialized by the worker's queue.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use vifbind_common::error::{BindingError, Result};
use vifbind_core::l3::{self, L3Request};
use vifbind_core::netconf::NamespaceOps;

/// Thread name of the privileged worker.
pub const WORKER_THREAD_NAME: &str = "vifbind-privileged";

/// Executes L3 configuration with namespace privileges.
pub trait L3Executor: Send + Sync {
    /// Programs addresses and routes for `request`.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, or `WorkerUnavailable` if the
    /// privileged side cannot be reached.
    fn configure_l3(&self, request: L3Request) -> Result<()>;

    /// Checks that `ifname` exists in `netns`.
    ///
    /// # Errors
    ///
    /// Returns `InterfaceNotFound` or `NamespaceUnavailable`, or
    /// `WorkerUnavailable` if the privileged side cannot be reached.
    fn check_link(&self, ifname: String, netns: Option<PathBuf>) -> Result<()>;
}

enum Job {
    Configure(L3Request, Sender<Result<()>>),
    CheckLink(String, Option<PathBuf>, Sender<Result<()>>),
}

/// Handle on the privileged worker thread.
///
/// Dropping the handle closes the queue and joins the thread.
pub struct PrivilegedWorker {
    jobs: Mutex<Option<Sender<Job>>>,
    thread: Option<JoinHandle<()>>,
}

impl PrivilegedWorker {
    /// Spawns the worker thread around `ops`.
    ///
    /// # Errors
    ///
    /// Returns `WorkerUnavailable` if the thread cannot be spawned.
    pub fn spawn<O>(ops: O) -> Result<Self>
    where
        O: NamespaceOps + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || serve(&ops, &rx))
            .map_err(|e| BindingError::WorkerUnavailable {
                message: format!("failed to spawn worker: {e}"),
            })?;
        tracing::debug!(thread = WORKER_THREAD_NAME, "privileged worker started");
        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            thread: Some(thread),
        })
    }

    fn submit(&self, make: impl FnOnce(Sender<Result<()>>) -> Job) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let guard = self.jobs.lock().map_err(|_| unavailable("job queue poisoned"))?;
            let sender = guard.as_ref().ok_or_else(|| unavailable("worker stopped"))?;
            sender
                .send(make(reply_tx))
                .map_err(|_| unavailable("worker stopped"))?;
        }
        reply_rx
            .recv()
            .map_err(|_| unavailable("worker exited before replying"))?
    }
}

fn unavailable(message: &str) -> BindingError {
    BindingError::WorkerUnavailable {
        message: message.into(),
    }
}

fn serve<O: NamespaceOps>(ops: &O, jobs: &Receiver<Job>) {
    for job in jobs {
        match job {
            Job::Configure(request, reply) => {
                let _ = reply.send(l3::configure_l3(ops, &request));
            }
            Job::CheckLink(ifname, netns, reply) => {
                let result = ops
                    .open(netns.as_deref())
                    .and_then(|ns| ops.ensure_link(&ns, &ifname));
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!(thread = WORKER_THREAD_NAME, "privileged worker stopped");
}

impl L3Executor for PrivilegedWorker {
    fn configure_l3(&self, request: L3Request) -> Result<()> {
        self.submit(|reply| Job::Configure(request, reply))
    }

    fn check_link(&self, ifname: String, netns: Option<PathBuf>) -> Result<()> {
        self.submit(|reply| Job::CheckLink(ifname, netns, reply))
    }
}

impl Drop for PrivilegedWorker {
    fn drop(&mut self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            drop(jobs.take());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(thread = WORKER_THREAD_NAME, "privileged worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for PrivilegedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegedWorker")
            .field("thread", &WORKER_THREAD_NAME)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;

    use vifbind_common::types::VifData;
    use vifbind_core::namespace::NetnsHandle;
    use vifbind_core::netconf::RouteTarget;

    use super::*;

    /// Records which thread each operation ran on.
    #[derive(Default)]
    struct ThreadRecorder {
        threads: Arc<Mutex<Vec<String>>>,
        missing_link: bool,
    }

    impl ThreadRecorder {
        fn note(&self) {
            let name = std::thread::current().name().unwrap_or("").to_string();
            self.threads.lock().unwrap().push(name);
        }
    }

    impl NamespaceOps for ThreadRecorder {
        fn open(&self, _netns: Option<&std::path::Path>) -> Result<NetnsHandle> {
            Ok(NetnsHandle::current())
        }

        fn ensure_link(&self, ns: &NetnsHandle, ifname: &str) -> Result<()> {
            self.note();
            if self.missing_link {
                return Err(BindingError::InterfaceNotFound {
                    ifname: ifname.into(),
                    netns: ns.to_string(),
                });
            }
            Ok(())
        }

        fn enable_ipv6(&self, _ns: &NetnsHandle) -> Result<()> {
            self.note();
            Ok(())
        }

        fn add_address(&self, _ns: &NetnsHandle, _ifname: &str, _address: IpAddr, _prefix_len: u8) -> Result<()> {
            self.note();
            Ok(())
        }

        fn add_route(&self, _ns: &NetnsHandle, _target: RouteTarget, _gateway: IpAddr) -> Result<()> {
            self.note();
            Ok(())
        }
    }

    fn request() -> L3Request {
        L3Request {
            vif: VifData {
                id: "port-1".into(),
                kind: "VIFBridge".into(),
                subnets: vec![vifbind_common::types::Subnet {
                    cidr: "10.0.0.0/24".parse().unwrap(),
                    ips: vec!["10.0.0.5".parse().unwrap()],
                    routes: Vec::new(),
                    gateway: Some("10.0.0.1".parse().unwrap()),
                }],
            },
            ifname: "eth0".into(),
            netns: None,
            is_default_gateway: true,
        }
    }

    #[test]
    fn operations_run_on_worker_thread() {
        let ops = ThreadRecorder::default();
        let threads = Arc::clone(&ops.threads);
        let worker = PrivilegedWorker::spawn(ops).unwrap();
        worker.configure_l3(request()).unwrap();
        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|t| t == WORKER_THREAD_NAME));
    }

    #[test]
    fn errors_cross_back_to_caller() {
        let worker = PrivilegedWorker::spawn(ThreadRecorder {
            missing_link: true,
            ..ThreadRecorder::default()
        })
        .unwrap();
        let err = worker.check_link("eth0".into(), None).unwrap_err();
        assert!(matches!(err, BindingError::InterfaceNotFound { .. }));
    }

    #[test]
    fn concurrent_callers_are_served() {
        let worker = Arc::new(PrivilegedWorker::spawn(ThreadRecorder::default()).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let worker = Arc::clone(&worker);
                std::thread::spawn(move || worker.configure_l3(request()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn drop_joins_worker() {
        let worker = PrivilegedWorker::spawn(ThreadRecorder::default()).unwrap();
        worker.check_link("eth0".into(), None).unwrap();
        drop(worker);
    }
}
