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

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use itertools::Itertools;
use k8s_openapi::api::core::v1::Pod;
use sriov_common::resource::total_vfs_allocatable;
use tokio::sync::oneshot::Sender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::allocation::AllocationMap;
use crate::promises::PromiseLedger;
use crate::protocol::{ExtenderArgs, ExtenderFilterResult, HostPriority, NodeList};
use crate::selector::{network_selector, Selector};

/// In-band error reported when every candidate node is out of VFs.
pub const NO_AVAILABLE_VFS_ERROR: &str = "No nodes have available VFs.";

pub type ExtenderRef = Arc<Extender>;

/// The placement-promise accounting engine.
///
/// Reconciles three views of VF usage: per-query node capacity supplied by
/// the scheduler, per-node allocations observed through the pod watch stream,
/// and the global count of outstanding promises. A filter decision must be
/// made before the eventual binding is observable, so a successful decision
/// reserves one VF globally (a promise) until the binding shows up or the
/// promise ages out.
pub struct Extender {
    promise_expiry: Duration,
    selector: Selector,
    pub(crate) core: Mutex<ExtenderCore>,
}

/// The only shared mutable state, guarded by the single core lock. The lock
/// is never held across a waiter wait.
pub(crate) struct ExtenderCore {
    pub(crate) allocated_vfs: AllocationMap,
    pub(crate) promises: PromiseLedger,
}

impl Extender {
    pub fn new(promise_expiry: Duration) -> Self {
        Self::with_selector(promise_expiry, network_selector)
    }

    pub fn with_selector(promise_expiry: Duration, selector: Selector) -> Self {
        Self {
            promise_expiry,
            selector,
            core: Mutex::new(ExtenderCore {
                allocated_vfs: AllocationMap::default(),
                promises: PromiseLedger::new(promise_expiry),
            }),
        }
    }

    pub fn promise_expiry(&self) -> Duration {
        self.promise_expiry
    }

    /// Whether this pod takes part in VF accounting at all.
    pub fn selects(&self, pod: &Pod) -> bool {
        (self.selector)(pod)
    }

    /// Computes which candidate nodes have a free VF for the pod and, when at
    /// least one does, reserves one VF globally. Returns `None` when the pod
    /// does not require a VF.
    ///
    /// When every node is exhausted only because of promises held by other
    /// pending decisions, the call subscribes to the ledger and waits for a
    /// release before re-evaluating, bounded by the promise expiry.
    pub async fn filter(&self, args: &ExtenderArgs) -> Option<ExtenderFilterResult> {
        if !self.selects(&args.pod) {
            return None;
        }
        let uid = args.pod_uid().to_owned();
        let pod_name = args.pod.metadata.name.as_deref().unwrap_or_default().to_owned();
        tracing::debug!(pod = %pod_name, uid = %uid, "filter called");

        let deadline = Instant::now() + self.promise_expiry;
        loop {
            let (result, waiter) = {
                let mut core = self.core.lock().await;
                let promised = core.promises.count();
                // Subscribe before evaluating. A purge happening between our
                // evaluation and our wait must not be lost.
                let waiter = (promised > 0).then(|| core.promises.subscribe());

                let mut eligible = Vec::new();
                let mut failed_nodes = BTreeMap::new();
                for node in args.candidate_nodes() {
                    let Some(name) = node.metadata.name.as_deref() else {
                        continue;
                    };
                    let allocated = core.allocated_vfs.ensure(name);
                    let Some(total) = total_vfs_allocatable(node) else {
                        tracing::debug!(node = name, "no allocatable VFs on node");
                        continue;
                    };
                    let free = total - allocated - promised as i64;
                    if free >= 1 {
                        tracing::debug!(
                            node = name,
                            pod = %pod_name,
                            "node has an available VF, it will be promised to the pod"
                        );
                        eligible.push(node.clone());
                    } else {
                        failed_nodes.insert(
                            name.to_owned(),
                            format!(
                                "Not sufficient number of VFs. Allocated: {allocated}. \
                                 Promised: {promised}. Total: {total}"
                            ),
                        );
                    }
                }

                if eligible.is_empty() {
                    let result = ExtenderFilterResult {
                        nodes: Some(NodeList { items: eligible }),
                        node_names: args.node_names.as_ref().map(|_| Vec::new()),
                        failed_nodes,
                        error: NO_AVAILABLE_VFS_ERROR.to_owned(),
                    };
                    (result, waiter)
                } else {
                    // One promise per decision, not per recommended node: the
                    // scheduler binds the pod to a single node of its choice.
                    core.promises.make(&uid);
                    let node_names = args.node_names.as_ref().map(|_| {
                        eligible
                            .iter()
                            .filter_map(|node| node.metadata.name.clone())
                            .collect()
                    });
                    let result = ExtenderFilterResult {
                        nodes: Some(NodeList { items: eligible }),
                        node_names,
                        failed_nodes,
                        error: String::new(),
                    };
                    (result, None)
                }
            };

            if result.error.is_empty() {
                return Some(result);
            }
            // Waiting only helps if some promise can still be released.
            let Some(waiter) = waiter else {
                return Some(result);
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Some(result);
            }
            tracing::debug!(
                pod = %pod_name,
                "all VFs are promised to other pods, waiting for a release"
            );
            if tokio::time::timeout(remaining, waiter).await.is_err() {
                return Some(result);
            }
        }
    }

    /// Ranks candidate nodes by real VF headroom, `capacity - allocated`,
    /// higher first. Promises are not subtracted: priority is about headroom,
    /// not reservations. Pods outside VF accounting get a neutral all-zero
    /// ranking.
    pub async fn prioritize(&self, args: &ExtenderArgs) -> Vec<HostPriority> {
        if !self.selects(&args.pod) {
            return args
                .candidate_nodes()
                .iter()
                .filter_map(|node| node.metadata.name.clone())
                .map(|host| HostPriority { host, score: 0 })
                .collect();
        }
        let core = self.core.lock().await;
        args.candidate_nodes()
            .iter()
            .filter_map(|node| {
                let host = node.metadata.name.clone()?;
                let total = total_vfs_allocatable(node).unwrap_or(0);
                let score = (total - core.allocated_vfs.get(&host)).max(0);
                Some(HostPriority { host, score })
            })
            .sorted_by_key(|priority| Reverse(priority.score))
            .collect()
    }

    /// A binding was observed for `uid` on `node`: the allocation becomes
    /// node-local and any outstanding global promise is dropped, atomically.
    pub async fn sync_allocated(&self, uid: &str, node: &str) {
        let mut core = self.core.lock().await;
        core.allocated_vfs.add(node);
        core.promises.purge(uid);
    }

    /// `uid` went away: release its VF on `node` when it held one, and drop
    /// any outstanding promise.
    pub async fn sync_purged(&self, uid: &str, node: Option<&str>) {
        let mut core = self.core.lock().await;
        if let Some(node) = node {
            core.allocated_vfs.sub(node);
        }
        core.promises.purge(uid);
    }

    /// VFs currently allocated on a node, for inspection.
    pub async fn allocated_on(&self, node: &str) -> i64 {
        self.core.lock().await.allocated_vfs.get(node)
    }

    /// Outstanding promises, for inspection.
    pub async fn promise_count(&self) -> usize {
        self.core.lock().await.promises.count()
    }

    /// Periodically ages out stale promises until told to shut down.
    pub fn start_promise_sweeper(
        extender: ExtenderRef,
        check_interval: Duration,
    ) -> (JoinHandle<()>, Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let mut min_interval = tokio::time::interval(check_interval);
            min_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = min_interval.tick() => {},
                    _ = &mut shutdown_rx => {
                        tracing::info!("promise sweeper is stopped");
                        return;
                    }
                }
                let purged = {
                    let mut core = extender.core.lock().await;
                    core.promises.sweep(Instant::now())
                };
                if purged > 0 {
                    tracing::info!(purged, "swept expired VF promises");
                }
            }
        });
        (join_handle, shutdown_tx)
    }
}
