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

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::{Node, NodeStatus, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use sriov_common::resource::{NETWORKS_ANNOTATION, TOTAL_VFS_RESOURCE};

use crate::protocol::{ExtenderArgs, NodeList};

pub fn pod(uid: &str, networks: &str, node_name: &str) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.uid = Some(uid.to_owned());
    pod.metadata.name = Some(uid.to_owned());
    pod.metadata.annotations = Some(BTreeMap::from([(
        NETWORKS_ANNOTATION.to_owned(),
        networks.to_owned(),
    )]));
    if !node_name.is_empty() {
        pod.spec = Some(PodSpec {
            node_name: Some(node_name.to_owned()),
            ..Default::default()
        });
    }
    pod
}

pub fn vf_node(name: &str, total_vfs: i64) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(name.to_owned());
    node.status = Some(NodeStatus {
        allocatable: Some(BTreeMap::from([(
            TOTAL_VFS_RESOURCE.to_owned(),
            Quantity(total_vfs.to_string()),
        )])),
        ..Default::default()
    });
    node
}

pub fn filter_args(pod: Pod, nodes: Vec<Node>) -> ExtenderArgs {
    ExtenderArgs {
        pod,
        nodes: Some(NodeList { items: nodes }),
        node_names: None,
    }
}

/// Polls `condition` every `interval` until it passes or `timeout` elapses.
pub async fn eventually<F, Fut>(mut condition: F, timeout: Duration, interval: Duration)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_err;
    loop {
        match condition().await {
            Ok(()) => return,
            Err(err) => last_err = err,
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}: {last_err}");
        }
        tokio::time::sleep(interval).await;
    }
}
