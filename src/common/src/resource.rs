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

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Extended resource key carrying the number of virtual functions on a node.
/// Written by the discovery agent, read by the extender.
pub const TOTAL_VFS_RESOURCE: &str = "totalvfs";

/// Pod annotation listing the networks a pod attaches to, comma-separated.
pub const NETWORKS_ANNOTATION: &str = "networks";

/// The network token that marks a pod as requiring a virtual function.
pub const SRIOV_NETWORK: &str = "sriov";

/// Parses a `totalvfs` quantity. The discovery agent only ever writes plain
/// decimal integers, so suffixed quantities are treated as absent.
pub fn parse_vfs_quantity(quantity: &Quantity) -> Option<i64> {
    quantity.0.trim().parse().ok()
}

/// Total VFs a node advertises as allocatable, or `None` if discovery has not
/// run on it.
pub fn total_vfs_allocatable(node: &Node) -> Option<i64> {
    node.status
        .as_ref()?
        .allocatable
        .as_ref()?
        .get(TOTAL_VFS_RESOURCE)
        .and_then(parse_vfs_quantity)
}
