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

//! Watches pod events and keeps the accounting in step with the cluster.
//! Once the scheduler binds a pod, its global promise converts into a
//! node-local allocation; once the pod goes away, the allocation is released.

use std::collections::{HashMap, HashSet};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use kube::{Api, Client};
use tokio::sync::oneshot;
use tokio::sync::oneshot::Sender;
use tokio::task::JoinHandle;

use crate::extender::ExtenderRef;

/// Last-observed accounting-relevant state of a pod. `counted` means the pod
/// holds one VF on `node_name` in the allocation map.
#[derive(Clone, Debug)]
struct TrackedPod {
    node_name: String,
    counted: bool,
}

/// Consumes the pod watch stream and diffs each event against the last-seen
/// state, so redelivered events are no-ops and selector flips translate into
/// the equivalent add or delete. The stream is restricted to pods that
/// already have a node assigned; pending pods must not touch the accounting.
pub struct PodWatcher {
    extender: ExtenderRef,
    known: HashMap<String, TrackedPod>,
}

impl PodWatcher {
    pub fn new(extender: ExtenderRef) -> Self {
        Self {
            extender,
            known: HashMap::new(),
        }
    }

    /// Spawns the watcher on the given client until shut down.
    pub fn start(extender: ExtenderRef, client: Client) -> (JoinHandle<()>, Sender<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let watcher = Self::new(extender);
        let join_handle = tokio::spawn(watcher.run(client, shutdown_rx));
        (join_handle, shutdown_tx)
    }

    async fn apply(&mut self, pod: &Pod) {
        let Some(uid) = pod.metadata.uid.clone() else {
            return;
        };
        let node_name = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.clone())
            .unwrap_or_default();
        let counted = !node_name.is_empty() && self.extender.selects(pod);
        let tracked = TrackedPod { node_name, counted };
        let previous = self.known.insert(uid.clone(), tracked.clone());

        match (previous, counted) {
            // Lost its VF requirement: equivalent to a delete of the old pod.
            (Some(prev), false) if prev.counted => {
                self.extender.sync_purged(&uid, Some(&prev.node_name)).await;
            }
            // Already counted; node changes are not expected for bound pods.
            (Some(prev), true) if prev.counted => {}
            (_, true) => {
                self.extender
                    .sync_allocated(&uid, &tracked.node_name)
                    .await;
            }
            _ => {}
        }
    }

    async fn delete(&mut self, pod: &Pod) {
        let Some(uid) = pod.metadata.uid.clone() else {
            return;
        };
        let previous = self.known.remove(&uid);
        let counted_node = previous
            .as_ref()
            .filter(|tracked| tracked.counted)
            .map(|tracked| tracked.node_name.clone());
        if counted_node.is_some() || self.extender.selects(pod) {
            self.extender
                .sync_purged(&uid, counted_node.as_deref())
                .await;
        }
    }

    /// A relist replaces the whole world: apply everything it contains and
    /// release pods that vanished while the watch was down.
    async fn resync(&mut self, pods: Vec<Pod>) {
        let mut seen = HashSet::new();
        for pod in &pods {
            if let Some(uid) = pod.metadata.uid.clone() {
                seen.insert(uid);
            }
            self.apply(pod).await;
        }
        let vanished = self
            .known
            .iter()
            .filter(|(uid, _)| !seen.contains(*uid))
            .map(|(uid, tracked)| (uid.clone(), tracked.clone()))
            .collect::<Vec<_>>();
        for (uid, tracked) in vanished {
            self.known.remove(&uid);
            if tracked.counted {
                self.extender
                    .sync_purged(&uid, Some(&tracked.node_name))
                    .await;
            }
        }
    }

    async fn run(mut self, client: Client, mut stop: oneshot::Receiver<()>) {
        let pods: Api<Pod> = Api::all(client);
        let config = watcher::Config::default().fields("spec.nodeName!=");
        let stream = watcher(pods, config);
        tokio::pin!(stream);
        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("pod watcher is stopped");
                    return;
                }
                event = stream.next() => match event {
                    Some(Ok(Event::Applied(pod))) => self.apply(&pod).await,
                    Some(Ok(Event::Deleted(pod))) => self.delete(&pod).await,
                    Some(Ok(Event::Restarted(pods))) => {
                        tracing::info!(pods = pods.len(), "pod watch restarted, resyncing");
                        self.resync(pods).await;
                    }
                    // The watcher re-establishes itself after errors; a bad
                    // event must not take the accounting down with it.
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "pod watch stream error");
                    }
                    None => {
                        tracing::warn!("pod watch stream ended");
                        return;
                    }
                }
            }
        }
    }
}
