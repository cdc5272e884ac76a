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

//! Discovers how many virtual functions a node's NIC exposes and publishes
//! the number as the node's `totalvfs` capacity, where the extender reads it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use sriov_common::resource::TOTAL_VFS_RESOURCE;

/// Where the kernel exposes per-device VF counts.
pub const DEFAULT_SYSFS_NET_ROOT: &str = "/sys/class/net";

const NODE_UPDATE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Parser)]
pub struct DiscoveryOpts {
    /// Device to use for VFs.
    #[clap(long, env = "SRIOV_DEVICE", default_value = "eth0")]
    pub device: String,

    /// Kubernetes config file. The ambient environment (in-cluster service
    /// account or `~/.kube/config`) is used when unset.
    #[clap(long, env = "SRIOV_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Re-run discovery every given number of seconds. Runs once when zero.
    #[clap(
        long = "interval",
        short = 'i',
        env = "SRIOV_DISCOVERY_INTERVAL_SECS",
        default_value_t = 0
    )]
    pub interval_secs: u64,

    /// Name of the node to update. Defaults to this host's hostname.
    #[clap(long, env = "SRIOV_NODENAME")]
    pub nodename: Option<String>,
}

/// Reads the total VF count for `device` from the sysfs tree rooted at
/// `sysfs_root`.
pub async fn read_total_vfs(sysfs_root: &Path, device: &str) -> Result<i64> {
    let path = sysfs_root.join(device).join("device/sriov_totalvfs");
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("discovering totalvfs from {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("totalvfs in {} is not a decimal integer", path.display()))
}

/// Writes the discovered count into the node's capacity and allocatable
/// maps, retrying the update a few times since the node object is contended.
pub async fn publish_total_vfs(client: &Client, nodename: &str, total_vfs: i64) -> Result<()> {
    let nodes: Api<Node> = Api::all(client.clone());
    let patch = serde_json::json!({
        "status": {
            "capacity": { TOTAL_VFS_RESOURCE: total_vfs.to_string() },
            "allocatable": { TOTAL_VFS_RESOURCE: total_vfs.to_string() },
        }
    });
    let mut last_err = None;
    for attempt in 1..=NODE_UPDATE_RETRIES {
        match nodes
            .patch_status(nodename, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                tracing::info!(node = nodename, total_vfs, "updated node with totalvfs");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(node = nodename, attempt, error = %err, "updating node failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
        .with_context(|| format!("updating totalvfs for node {nodename}"))
}

async fn run(opts: DiscoveryOpts, sysfs_root: &Path) -> Result<()> {
    let nodename = match opts.nodename.clone() {
        Some(nodename) => nodename,
        None => hostname::get()
            .context("getting node hostname")?
            .to_string_lossy()
            .into_owned(),
    };
    let client = sriov_common::client::client_from_kubeconfig(opts.kubeconfig.as_deref())
        .await
        .context("building kubernetes client")?;

    loop {
        let total_vfs = read_total_vfs(sysfs_root, &opts.device).await?;
        tracing::info!(device = %opts.device, total_vfs, "discovered total VFs");
        publish_total_vfs(&client, &nodename, total_vfs).await?;
        if opts.interval_secs == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(opts.interval_secs)).await;
    }
}

/// Start the discovery agent against the real sysfs tree.
pub fn start(opts: DiscoveryOpts) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        tracing::info!(?opts, "starting sriov discovery");
        run(opts, Path::new(DEFAULT_SYSFS_NET_ROOT)).await
    })
}
