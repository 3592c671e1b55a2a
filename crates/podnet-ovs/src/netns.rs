//! Running work inside another network namespace.

use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use nix::sched::{CloneFlags, setns};
use podnet::ProvisionError;
use podnet::host::{Netlink, NetnsJob, NetnsRunner};
use tokio::sync::oneshot;
use tracing::trace;

use crate::command::Privilege;
use crate::ip::IpLinks;

/// Runs each job on a fresh OS thread that joins the target namespace and
/// drives its own single-threaded runtime. The thread exits with the job, so
/// it is never reused for other namespace work.
///
/// Requires `CAP_SYS_ADMIN` for `setns`.
#[derive(Debug, Clone, Copy)]
pub struct ThreadNetnsRunner {
    privilege: Privilege,
}

impl ThreadNetnsRunner {
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }
}

fn namespace_error(path: &Path, detail: String) -> ProvisionError {
    ProvisionError::Namespace {
        path: path.display().to_string(),
        detail,
    }
}

/// Body of the worker thread.
fn run_in_netns(path: &Path, links: IpLinks, job: NetnsJob) -> Result<(), ProvisionError> {
    let handle = File::open(path).map_err(|e| namespace_error(path, format!("open: {e}")))?;
    setns(&handle, CloneFlags::CLONE_NEWNET)
        .map_err(|e| namespace_error(path, format!("setns: {e}")))?;
    drop(handle);
    trace!(netns = %path.display(), "worker joined netns");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .map_err(|e| namespace_error(path, format!("build runtime: {e}")))?;
    runtime.block_on(job(&links as &dyn Netlink))
}

#[async_trait]
impl NetnsRunner for ThreadNetnsRunner {
    async fn run(&self, netns: &Path, job: NetnsJob) -> Result<(), ProvisionError> {
        let path = netns.to_path_buf();
        let links = IpLinks::new(self.privilege);
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("podnet-netns".to_string())
            .spawn(move || {
                let result = run_in_netns(&path, links, job);
                // The receiver only goes away if the caller was dropped.
                let _ = tx.send(result);
            })
            .map_err(|e| namespace_error(netns, format!("spawn worker: {e}")))?;

        rx.await.map_err(|_| {
            namespace_error(netns, "worker exited without a result (panicked)".to_string())
        })?
    }
}
