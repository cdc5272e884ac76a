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

use k8s_openapi::api::core::v1::Pod;
use sriov_common::resource::{NETWORKS_ANNOTATION, SRIOV_NETWORK};

/// Predicate deciding whether a pod takes part in VF accounting. Swappable so
/// deployments with differently-tagged networks can plug their own in.
pub type Selector = fn(pod: &Pod) -> bool;

/// Decides if a pod requires a virtual function: the `networks` annotation,
/// split on commas, must contain the exact `sriov` token. No whitespace
/// trimming, matching what the CNI side expects.
pub fn network_selector(pod: &Pod) -> bool {
    let Some(networks) = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(NETWORKS_ANNOTATION))
    else {
        return false;
    };
    networks.split(',').any(|network| network == SRIOV_NETWORK)
}
