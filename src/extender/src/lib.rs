// Copyright 2025 The SR-IOV Scheduler Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A scheduler extender that filters and ranks candidate nodes by SR-IOV
//! virtual-function availability. The hard part is that a placement decision
//! is made before the binding is observable, so each decision provisionally
//! reserves one VF (a promise) until the binding shows up in the pod watch
//! stream or the promise ages out.

mod allocation;
mod error;
mod extender;
mod pod_watcher;
mod promises;
pub mod protocol;
mod selector;
pub mod server;
#[cfg(test)]
pub(crate) mod test_utils;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
pub use error::{Error, Result};
pub use extender::{Extender, ExtenderRef, NO_AVAILABLE_VFS_ERROR};
pub use pod_watcher::PodWatcher;
pub use promises::{PromiseLedger, DEFAULT_PROMISE_EXPIRY, DEFAULT_SWEEP_INTERVAL};
pub use selector::{network_selector, Selector};

#[derive(Debug, Clone, Parser)]
pub struct ExtenderOpts {
    /// Socket to listen on.
    #[clap(long, short = 'l', env = "SRIOV_LISTEN", default_value = ":8989")]
    pub listen: String,

    /// Kubernetes config file. The ambient environment (in-cluster service
    /// account or `~/.kube/config`) is used when unset.
    #[clap(long, env = "SRIOV_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// How often stale VF promises are swept, in seconds. Falls back to the
    /// built-in cadence when unset.
    #[clap(
        long = "promises-interval",
        short = 'p',
        env = "SRIOV_PROMISES_INTERVAL_SECS"
    )]
    pub promises_interval_secs: Option<u64>,
}

/// Start the scheduler extender: the pod watcher, the promise sweeper and
/// the HTTP server, shut down together on ctrl-c.
pub fn start(opts: ExtenderOpts) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        tracing::info!(?opts, "starting sriov scheduler extender");
        let client =
            sriov_common::client::client_from_kubeconfig(opts.kubeconfig.as_deref()).await?;

        let extender: ExtenderRef = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let (watcher_handle, watcher_shutdown) = PodWatcher::start(extender.clone(), client);
        let sweep_interval = opts
            .promises_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        let (sweeper_handle, sweeper_shutdown) =
            Extender::start_promise_sweeper(extender.clone(), sweep_interval);

        let result = tokio::select! {
            result = server::serve(extender, &opts.listen) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, shutting down");
                Ok(())
            }
        };

        let _ = watcher_shutdown.send(());
        let _ = sweeper_shutdown.send(());
        let _ = watcher_handle.await;
        let _ = sweeper_handle.await;
        result
    })
}
